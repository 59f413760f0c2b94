//! Readers for the analyzed-module lists produced by dependency resolution.
//!
//! - [`manifest`]: a JSON document of modules and their resolved dependencies.
//! - [`cargo`]: a project directory with a `Cargo.lock`.

pub mod cargo;
pub mod manifest;

use std::path::Path;

use anyhow::{bail, Result};

use crate::models::Module;

pub trait DependencySource {
    fn load(&self, path: &Path) -> Result<Vec<Module>>;
}

/// Pick a reader for `path`: a file is read as a JSON module list, a directory
/// is searched for a lockfile.
pub fn load_modules(path: &Path) -> Result<Vec<Module>> {
    if path.is_file() {
        return manifest::ManifestSource.load(path);
    }

    if path.join("Cargo.lock").exists() {
        return cargo::CargoLockSource.load(path);
    }

    bail!(
        "no dependency list found at {}: pass a modules JSON file or a directory containing Cargo.lock",
        path.display()
    )
}
