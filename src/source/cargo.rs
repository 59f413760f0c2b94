use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use crate::models::{Dependency, Module};

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoLockPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoLockPackage {
    name: String,
    version: String,
    /// Packages without a `source` field are local workspace members.
    source: Option<String>,
}

/// Treats a lockfile directory as a single module of `cargo` dependencies.
pub struct CargoLockSource;

impl super::DependencySource for CargoLockSource {
    fn load(&self, path: &Path) -> Result<Vec<Module>> {
        let content = std::fs::read_to_string(path.join("Cargo.lock"))?;
        let lock: CargoLock = toml::from_str(&content)?;

        let dependencies = lock
            .package
            .into_iter()
            .filter(|p| p.source.as_deref().is_some_and(is_registry))
            .map(|p| Dependency::new("cargo", &p.name, &p.version))
            .collect();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(vec![Module { name, dependencies }])
    }
}

/// Git and path sources have no registry revision to look up.
fn is_registry(source: &str) -> bool {
    source.starts_with("registry+") || source.starts_with("sparse+")
}
