use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{Dependency, Locator, Module, ParseLocatorError};

/// Reads `[{"name": …, "dependencies": [...]}]`. A dependency is either a
/// `{"fetcher", "name", "revision"}` object or a `fetcher+package$revision`
/// locator string.
pub struct ManifestSource;

#[derive(Deserialize)]
struct ModuleEntry {
    name: String,
    #[serde(default)]
    dependencies: Vec<DependencyEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyEntry {
    Locator(String),
    Fields(Dependency),
}

impl DependencyEntry {
    fn into_dependency(self) -> Result<Dependency, ParseLocatorError> {
        match self {
            DependencyEntry::Fields(dep) => Ok(dep),
            DependencyEntry::Locator(raw) => {
                let loc: Locator = raw.parse()?;
                Ok(Dependency::new(&loc.fetcher, &loc.package, &loc.revision))
            }
        }
    }
}

impl super::DependencySource for ManifestSource {
    fn load(&self, path: &Path) -> Result<Vec<Module>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let entries: Vec<ModuleEntry> = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a valid module list", path.display()))?;

        entries
            .into_iter()
            .map(|entry| {
                let dependencies = entry
                    .dependencies
                    .into_iter()
                    .map(DependencyEntry::into_dependency)
                    .collect::<Result<Vec<_>, _>>()
                    .with_context(|| format!("module {} in {}", entry.name, path.display()))?;
                Ok(Module {
                    name: entry.name,
                    dependencies,
                })
            })
            .collect()
    }
}
