use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Cli;
use crate::fetch::{FetchMode, FetchOptions};
use crate::report::TemplateSource;
use crate::service::fossa::DEFAULT_ENDPOINT;

/// Root configuration structure, deserialized from `.license-notice/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Where license metadata is fetched from.
#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// How the report is fetched and rendered.
#[derive(Debug, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub mode: FetchMode,
    /// Template file replacing the built-in notice.
    pub template: Option<PathBuf>,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    pub timeout_secs: Option<u64>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::default(),
            template: None,
            jobs: default_jobs(),
            timeout_secs: None,
        }
    }
}

fn default_jobs() -> usize {
    1
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `<project_path>/.license-notice/config.toml`
/// 3. `~/.config/license-notice/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let project_config = project_path.join(".license-notice").join("config.toml");
    if project_config.exists() {
        return read_config(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("license-notice")
            .join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("invalid config {}", path.display()))?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

/// Effective settings once command-line flags are applied over the config file.
#[derive(Debug)]
pub struct Settings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub fetch: FetchOptions,
    pub template: TemplateSource,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: Config) -> Self {
        let mode = if cli.unknown {
            FetchMode::PerItem
        } else {
            cli.mode.as_ref().map(Into::into).unwrap_or(config.report.mode)
        };

        let timeout = cli.timeout.or(config.report.timeout_secs);
        let template = cli.template.clone().or(config.report.template);

        Settings {
            endpoint: cli.endpoint.clone().unwrap_or(config.service.endpoint),
            api_key: cli.api_key.clone().or(config.service.api_key),
            fetch: FetchOptions {
                mode,
                jobs: cli.jobs.unwrap_or(config.report.jobs).max(1),
                deadline: timeout.map(Duration::from_secs),
            },
            template: TemplateSource::from_path(template.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("license-notice").chain(args.iter().copied())).unwrap()
    }

    fn config(toml_src: &str) -> Config {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = config("");
        assert_eq!(cfg.service.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.report.mode, FetchMode::Batch);
        assert_eq!(cfg.report.jobs, 1);
        assert!(cfg.report.template.is_none());
    }

    #[test]
    fn test_config_file_values() {
        let settings = Settings::resolve(
            &cli(&["--api-key", "from-flag"]),
            config(
                r#"
[service]
endpoint = "https://fossa.internal"
api_key = "from-file"

[report]
mode = "per-item"
template = "notice.tmpl"
jobs = 4
timeout_secs = 30
"#,
            ),
        );

        assert_eq!(settings.endpoint, "https://fossa.internal");
        assert_eq!(settings.api_key.as_deref(), Some("from-flag"));
        assert_eq!(settings.fetch.mode, FetchMode::PerItem);
        assert_eq!(settings.fetch.jobs, 4);
        assert_eq!(settings.fetch.deadline, Some(Duration::from_secs(30)));
        assert_eq!(settings.template, TemplateSource::File(PathBuf::from("notice.tmpl")));
    }

    #[test]
    fn test_flags_override_config() {
        let settings = Settings::resolve(
            &cli(&["--mode", "batch", "--template", "other.tmpl", "--jobs", "0"]),
            config("[report]\nmode = \"per-item\"\ntemplate = \"notice.tmpl\"\n"),
        );

        assert_eq!(settings.fetch.mode, FetchMode::Batch);
        assert_eq!(settings.fetch.jobs, 1);
        assert_eq!(settings.template, TemplateSource::File(PathBuf::from("other.tmpl")));
    }

    #[test]
    fn test_unknown_flag_selects_per_item() {
        let settings = Settings::resolve(&cli(&["--unknown"]), Config::default());
        assert_eq!(settings.fetch.mode, FetchMode::PerItem);
        assert_eq!(settings.template, TemplateSource::Default);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(toml::from_str::<Config>("[report]\nmode = \"parallel\"\n").is_err());
    }

    #[test]
    fn test_load_project_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".license-notice");
        std::fs::create_dir(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[report]\nmode = \"per-item\"\n").unwrap();

        let cfg = load_config(dir.path(), None).unwrap();
        assert_eq!(cfg.report.mode, FetchMode::PerItem);
    }

    #[test]
    fn test_override_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(load_config(dir.path(), Some(&missing)).is_err());
    }
}
