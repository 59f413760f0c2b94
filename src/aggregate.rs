use std::collections::btree_map::{self, BTreeMap};

use crate::models::Revision;

/// Revisions grouped by license id, deduplicated by locator string.
///
/// Both levels are ordered maps, so iteration is sorted by license id and then
/// by locator regardless of the order revisions arrived in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResult {
    groups: BTreeMap<String, BTreeMap<String, Revision>>,
}

impl AggregationResult {
    /// File `revision` under every license it carries. A later revision with
    /// the same locator replaces the earlier one.
    pub fn insert(&mut self, revision: &Revision) {
        let key = revision.locator.to_string();
        for license in &revision.licenses {
            self.groups
                .entry(license.id.clone())
                .or_default()
                .insert(key.clone(), revision.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, btree_map::Values<'_, String, Revision>)> + '_ {
        self.groups
            .iter()
            .map(|(license, revs)| (license.as_str(), revs.values()))
    }
}

#[cfg(test)]
impl AggregationResult {
    /// Locator strings filed under `license`, in iteration order.
    pub fn locators(&self, license: &str) -> Vec<String> {
        self.groups
            .get(license)
            .map(|revs| revs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Fold fetched revisions into a license → revisions grouping.
pub fn aggregate(revisions: &[Revision]) -> AggregationResult {
    let mut result = AggregationResult::default();
    for revision in revisions {
        result.insert(revision);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::stub::revision;

    fn rev(locator: &str, title: &str, licenses: &[&str]) -> Revision {
        revision(&locator.parse().unwrap(), title, licenses)
    }

    #[test]
    fn test_multi_license_fans_out() {
        let result = aggregate(&[rev("npm+dual$1.0.0", "dual", &["MIT", "Apache-2.0"])]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.locators("MIT"), vec!["npm+dual$1.0.0"]);
        assert_eq!(result.locators("Apache-2.0"), vec!["npm+dual$1.0.0"]);
    }

    #[test]
    fn test_same_locator_deduplicated() {
        let result = aggregate(&[
            rev("npm+chalk$2.4.1", "chalk", &["MIT"]),
            rev("npm+chalk$2.4.1", "chalk", &["MIT"]),
        ]);

        assert_eq!(result.locators("MIT"), vec!["npm+chalk$2.4.1"]);
    }

    #[test]
    fn test_repeated_license_on_one_revision() {
        let result = aggregate(&[rev("npm+odd$1.0.0", "odd", &["MIT", "MIT"])]);
        assert_eq!(result.locators("MIT").len(), 1);
    }

    #[test]
    fn test_revision_without_licenses_contributes_nothing() {
        let result = aggregate(&[rev("npm+bare$1.0.0", "bare", &[])]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_iteration_is_sorted_regardless_of_input_order() {
        let forward = aggregate(&[
            rev("npm+zeta$1.0.0", "zeta", &["MIT"]),
            rev("npm+alpha$1.0.0", "alpha", &["MIT", "ISC"]),
            rev("gem+rails$7.0.0", "rails", &["Apache-2.0"]),
        ]);
        let backward = aggregate(&[
            rev("gem+rails$7.0.0", "rails", &["Apache-2.0"]),
            rev("npm+alpha$1.0.0", "alpha", &["MIT", "ISC"]),
            rev("npm+zeta$1.0.0", "zeta", &["MIT"]),
        ]);

        assert_eq!(forward, backward);
        assert_eq!(
            forward.iter().map(|(license, _)| license).collect::<Vec<_>>(),
            vec!["Apache-2.0", "ISC", "MIT"]
        );
        assert_eq!(
            forward.locators("MIT"),
            vec!["npm+alpha$1.0.0", "npm+zeta$1.0.0"]
        );
    }
}
