//! License notice rendering.
//!
//! - [`template`]: the text template language used for notices.
//!
//! The template runs against a map of license id → list of revisions. Both
//! levels are sorted (license id, then locator) so the same input always
//! renders the same text.

pub mod template;

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use crate::aggregate::AggregationResult;
use crate::models::Revision;
use template::{Template, TemplateError};

pub const DEFAULT_TEMPLATE: &str = r#"# 3rd-Party Software License Notice
Generated by license-notice.
This software includes the following software and licenses:
{{range $license, $deps := .}}
========================================================================
{{$license}}
========================================================================
The following software have components provided under the terms of this license:
{{range $i, $dep := $deps}}
- {{$dep.Project.Title}} (from {{$dep.Project.URL}})
{{- end}}
{{end}}
"#;

/// Where the notice template comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TemplateSource {
    #[default]
    Default,
    File(PathBuf),
}

impl TemplateSource {
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => TemplateSource::File(path.to_path_buf()),
            None => TemplateSource::Default,
        }
    }

    /// Read and parse the template. User files are read as raw text first.
    pub fn load(&self) -> Result<Template, TemplateError> {
        match self {
            TemplateSource::Default => Template::parse("default", DEFAULT_TEMPLATE),
            TemplateSource::File(path) => {
                let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
                    path: path.clone(),
                    source,
                })?;
                Template::parse(&path.display().to_string(), &source)
            }
        }
    }
}

/// Render `result` through a loaded template. Nothing is returned on failure.
pub fn render(result: &AggregationResult, template: &Template) -> Result<String, TemplateError> {
    template.render(&context(result))
}

/// Template data: license id → revisions in locator order.
pub fn context(result: &AggregationResult) -> Value {
    let mut root = Map::new();
    for (license, revisions) in result.iter() {
        root.insert(
            license.to_string(),
            Value::Array(revisions.map(revision_view).collect()),
        );
    }
    Value::Object(root)
}

fn revision_view(rev: &Revision) -> Value {
    json!({
        "Title": rev.title(),
        "URL": rev.url(),
        "title": rev.title(),
        "url": rev.url(),
        "Locator": rev.locator.to_string(),
        "Fetcher": rev.locator.fetcher,
        "Package": rev.locator.package,
        "Revision": rev.locator.revision,
        "Project": {
            "Title": rev.title(),
            "URL": rev.url(),
        },
        "Licenses": rev
            .licenses
            .iter()
            .map(|l| json!({"ID": l.id, "Name": l.name}))
            .collect::<Vec<_>>(),
    })
}
