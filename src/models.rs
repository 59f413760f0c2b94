use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resolved package as handed over by dependency analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Ecosystem / fetcher tag, e.g. `npm`, `go`, `cargo`.
    pub fetcher: String,
    pub name: String,
    pub revision: String,
}

impl Dependency {
    pub fn new(fetcher: &str, name: &str, revision: &str) -> Self {
        Self {
            fetcher: fetcher.to_string(),
            name: name.to_string(),
            revision: revision.to_string(),
        }
    }
}

/// An analyzed module and its resolved dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// Canonical `{fetcher, package, revision}` key understood by the metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locator {
    pub fetcher: String,
    pub package: String,
    #[serde(default)]
    pub revision: String,
}

impl Locator {
    pub fn new(fetcher: &str, package: &str, revision: &str) -> Self {
        Self {
            fetcher: fetcher.to_string(),
            package: package.to_string(),
            revision: revision.to_string(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}${}", self.fetcher, self.package, self.revision)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid locator `{0}` (expected fetcher+package$revision)")]
pub struct ParseLocatorError(pub String);

impl FromStr for Locator {
    type Err = ParseLocatorError;

    /// Splits on the first `+` and the last `$`; the revision part is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fetcher, rest) = s
            .split_once('+')
            .ok_or_else(|| ParseLocatorError(s.to_string()))?;
        let (package, revision) = rest.rsplit_once('$').unwrap_or((rest, ""));

        if fetcher.is_empty() || package.is_empty() {
            return Err(ParseLocatorError(s.to_string()));
        }

        Ok(Locator::new(fetcher, package, revision))
    }
}

/// One license entry attached to a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    #[serde(rename = "licenseId")]
    pub id: String,
    #[serde(rename = "title", default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// Metadata service answer for one locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(rename = "loc")]
    pub locator: Locator,
    #[serde(default, deserialize_with = "null_as_default")]
    pub licenses: Vec<License>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub project: Project,
}

impl Revision {
    pub fn title(&self) -> &str {
        &self.project.title
    }

    pub fn url(&self) -> &str {
        &self.project.url
    }
}

/// The service sends `null` instead of omitting empty collections.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        let loc = Locator::new("npm", "left-pad", "1.3.0");
        assert_eq!(loc.to_string(), "npm+left-pad$1.3.0");
    }

    #[test]
    fn test_locator_parse() {
        let loc: Locator = "git+github.com/pkg/errors$v0.9.1".parse().unwrap();
        assert_eq!(loc, Locator::new("git", "github.com/pkg/errors", "v0.9.1"));

        let scoped: Locator = "npm+@types/node$20.1.0".parse().unwrap();
        assert_eq!(scoped.package, "@types/node");

        let bare: Locator = "mvn+org.slf4j:slf4j-api".parse().unwrap();
        assert_eq!(bare.revision, "");
    }

    #[test]
    fn test_locator_parse_rejects_missing_fetcher() {
        assert!("left-pad$1.0.0".parse::<Locator>().is_err());
        assert!("+left-pad$1.0.0".parse::<Locator>().is_err());
    }

    #[test]
    fn test_revision_decodes_null_collections() {
        let json = r#"{
            "loc": {"fetcher": "go", "package": "golang.org/x/text", "revision": "v0.3.0"},
            "licenses": null,
            "project": null
        }"#;
        let rev: Revision = serde_json::from_str(json).unwrap();
        assert!(rev.licenses.is_empty());
        assert_eq!(rev.title(), "");
    }

    #[test]
    fn test_revision_decodes_service_payload() {
        let json = r#"{
            "loc": {"fetcher": "npm", "package": "chalk", "revision": "2.4.1"},
            "licenses": [{"licenseId": "MIT", "title": "MIT License", "ignored": false}],
            "project": {"title": "chalk", "url": "https://github.com/chalk/chalk", "public": true}
        }"#;
        let rev: Revision = serde_json::from_str(json).unwrap();
        assert_eq!(rev.licenses[0].id, "MIT");
        assert_eq!(rev.licenses[0].name, "MIT License");
        assert_eq!(rev.url(), "https://github.com/chalk/chalk");
    }
}
