use crate::models::{Dependency, Locator};

/// Fetchers the metadata service tracks under a different name.
///
/// Go modules have their license history stored under the `git` fetcher.
/// Targets must never appear as keys, so normalizing twice is a no-op.
pub const FETCHER_ALIASES: &[(&str, &str)] = &[("go", "git")];

/// Build the service-facing locator for a resolved dependency.
pub fn normalize(dep: &Dependency) -> Locator {
    normalize_locator(&Locator::new(&dep.fetcher, &dep.name, &dep.revision))
}

/// Re-apply the alias table to an existing locator.
pub fn normalize_locator(locator: &Locator) -> Locator {
    Locator {
        fetcher: canonical_fetcher(&locator.fetcher).to_string(),
        ..locator.clone()
    }
}

fn canonical_fetcher(fetcher: &str) -> &str {
    FETCHER_ALIASES
        .iter()
        .find(|(from, _)| *from == fetcher)
        .map(|(_, to)| *to)
        .unwrap_or(fetcher)
}
