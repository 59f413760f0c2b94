use thiserror::Error;

use crate::aggregate::{aggregate, AggregationResult};
use crate::fetch::{FetchError, Fetcher, LocatorGroup};
use crate::locator::normalize;
use crate::models::Module;
use crate::report::template::TemplateError;
use crate::report::{render, TemplateSource};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("could not fetch revisions: {0}")]
    Fetch(#[from] FetchError),

    #[error("could not render report: {0}")]
    Render(#[from] TemplateError),
}

#[derive(Debug)]
pub struct Report {
    pub text: String,
    pub aggregation: AggregationResult,
    /// Per-item lookups that failed; their dependencies are absent from `text`.
    pub skipped: Vec<FetchError>,
}

/// Normalize every module's dependencies into service locators.
pub fn locator_groups(modules: &[Module]) -> Vec<LocatorGroup> {
    modules
        .iter()
        .map(|module| LocatorGroup {
            module: module.name.clone(),
            locators: module.dependencies.iter().map(normalize).collect(),
        })
        .collect()
}

/// Fetch, aggregate and render. The template is parsed before any lookup so
/// a broken template fails without network traffic.
pub async fn run(modules: &[Module], fetcher: &Fetcher<'_>, source: &TemplateSource) -> Result<Report, ReportError> {
    let template = source.load()?;

    let groups = locator_groups(modules);
    let fetched = fetcher.fetch(&groups).await?;
    log::info!(
        "fetched {} revisions ({} lookups failed)",
        fetched.revisions.len(),
        fetched.failures.len()
    );

    let aggregation = aggregate(&fetched.revisions);
    let text = render(&aggregation, &template)?;

    Ok(Report {
        text,
        aggregation,
        skipped: fetched.failures,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::fetch::{FetchMode, FetchOptions};
    use crate::models::Dependency;
    use crate::progress::recorder::Recorder;
    use crate::service::stub::StubService;

    fn module(name: &str, deps: &[(&str, &str, &str)]) -> Module {
        Module {
            name: name.to_string(),
            dependencies: deps
                .iter()
                .map(|(fetcher, name, rev)| Dependency::new(fetcher, name, rev))
                .collect(),
        }
    }

    fn options(mode: FetchMode) -> FetchOptions {
        FetchOptions {
            mode,
            ..FetchOptions::default()
        }
    }

    #[test]
    fn test_locator_groups_apply_fetcher_aliases() {
        let groups = locator_groups(&[module(
            "api",
            &[("go", "github.com/pkg/errors", "v0.9.1"), ("npm", "chalk", "2.4.1")],
        )]);

        let locs: Vec<String> = groups[0].locators.iter().map(|l| l.to_string()).collect();
        assert_eq!(locs, vec!["git+github.com/pkg/errors$v0.9.1", "npm+chalk$2.4.1"]);
    }

    #[tokio::test]
    async fn test_per_item_queries_normalized_locator() {
        let svc = StubService::new().with("git+github.com/pkg/errors$v0.9.1", "errors", &["BSD-2-Clause"]);
        let progress = Recorder::default();
        let fetcher = Fetcher::new(&svc, &progress, options(FetchMode::PerItem));
        let modules = vec![module("api", &[("go", "github.com/pkg/errors", "v0.9.1")])];

        let report = run(&modules, &fetcher, &TemplateSource::Default).await.unwrap();

        assert_eq!(svc.calls(), vec!["one:git+github.com/pkg/errors$v0.9.1"]);
        assert!(report.skipped.is_empty());
        assert!(report.text.contains("\nBSD-2-Clause\n"));
    }

    #[tokio::test]
    async fn test_duplicate_dependencies_render_once() {
        let svc = StubService::new().with("npm+chalk$2.4.1", "chalk", &["MIT"]);
        let progress = Recorder::default();
        let fetcher = Fetcher::new(&svc, &progress, options(FetchMode::Batch));
        let modules = vec![
            module("web", &[("npm", "chalk", "2.4.1")]),
            module("admin", &[("npm", "chalk", "2.4.1")]),
        ];

        let report = run(&modules, &fetcher, &TemplateSource::Default).await.unwrap();

        assert_eq!(report.aggregation.locators("MIT"), vec!["npm+chalk$2.4.1"]);
        assert_eq!(report.text.matches("- chalk (from").count(), 1);
    }

    #[tokio::test]
    async fn test_batch_failure_produces_no_report() {
        let svc = StubService::new()
            .with("npm+chalk$2.4.1", "chalk", &["MIT"])
            .failing_batches();
        let progress = Recorder::default();
        let fetcher = Fetcher::new(&svc, &progress, options(FetchMode::Batch));
        let modules = vec![module("web", &[("npm", "chalk", "2.4.1")])];

        let err = run(&modules, &fetcher, &TemplateSource::Default)
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Fetch(_)));
        assert!(err.to_string().starts_with("could not fetch revisions:"));
    }

    #[tokio::test]
    async fn test_per_item_failure_is_partial_not_fatal() {
        let svc = StubService::new()
            .with("npm+chalk$2.4.1", "chalk", &["MIT"])
            .with("npm+debug$4.1.0", "debug", &["MIT", "ISC"]);
        let progress = Recorder::default();
        let fetcher = Fetcher::new(&svc, &progress, options(FetchMode::PerItem));
        let modules = vec![module(
            "web",
            &[("npm", "chalk", "2.4.1"), ("npm", "gone", "0.0.1"), ("npm", "debug", "4.1.0")],
        )];

        let report = run(&modules, &fetcher, &TemplateSource::Default).await.unwrap();

        assert_eq!(
            report.aggregation.locators("MIT"),
            vec!["npm+chalk$2.4.1", "npm+debug$4.1.0"]
        );
        assert_eq!(report.aggregation.locators("ISC"), vec!["npm+debug$4.1.0"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(progress.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_template_fails_before_fetching() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{{range .}}never closed").unwrap();

        let svc = StubService::new().with("npm+chalk$2.4.1", "chalk", &["MIT"]);
        let progress = Recorder::default();
        let fetcher = Fetcher::new(&svc, &progress, options(FetchMode::Batch));
        let modules = vec![module("web", &[("npm", "chalk", "2.4.1")])];

        let err = run(&modules, &fetcher, &TemplateSource::File(file.path().to_path_buf()))
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Render(TemplateError::Parse { .. })));
        assert!(svc.calls().is_empty());
    }
}
