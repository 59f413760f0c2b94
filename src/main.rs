//! `license-notice`: fetch license data for resolved dependencies and render
//! a third-party license notice.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and load config ([`config::load_config`]).
//! 2. Read the analyzed modules ([`source`]).
//! 3. Normalize each dependency into a service locator ([`locator`]).
//! 4. Fetch revisions in batch or per-item mode ([`fetch`], [`service`]).
//! 5. Group revisions by license ([`aggregate`]).
//! 6. Render the notice template ([`report`]) to stdout or `--output`.

mod aggregate;
mod cli;
mod config;
mod fetch;
mod locator;
mod models;
mod pipeline;
mod progress;
mod report;
mod service;
mod source;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use cli::Cli;
use config::{load_config, Settings};
use fetch::{FetchMode, Fetcher};
use progress::Spinner;
use service::fossa::FossaClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let path = cli
        .path
        .canonicalize()
        .unwrap_or_else(|_| cli.path.clone());
    let project_dir = if path.is_file() {
        path.parent().map(|p| p.to_path_buf()).unwrap_or_default()
    } else {
        path.clone()
    };

    let config = load_config(&project_dir, cli.config.as_deref())?;
    let settings = Settings::resolve(&cli, config);

    let modules = source::load_modules(&path)?;
    if !cli.quiet {
        for module in &modules {
            eprintln!(
                "  {} {} {} dependencies",
                "→".cyan(),
                module.name,
                module.dependencies.len()
            );
        }
    }

    if settings.api_key.is_none() {
        log::warn!("no API key configured; set FOSSA_API_KEY or pass --api-key");
    }

    let service = FossaClient::new(&settings.endpoint, settings.api_key.clone())
        .with_context(|| format!("invalid endpoint {}", settings.endpoint))?;
    let spinner = Spinner::new(cli.quiet);
    let fetcher = Fetcher::new(&service, &spinner, settings.fetch);

    let report = pipeline::run(&modules, &fetcher, &settings.template).await?;

    if report.aggregation.is_empty() {
        log::warn!("no license data returned; the notice lists no licenses");
    } else if !cli.quiet {
        eprintln!(
            "  {} {} licenses in notice",
            "→".cyan(),
            report.aggregation.len()
        );
    }

    if !report.skipped.is_empty() {
        eprintln!(
            "{} {} dependencies have no license data and are missing from the notice:",
            "warning:".yellow().bold(),
            report.skipped.len()
        );
        for failure in &report.skipped {
            eprintln!("    {}", failure);
        }
    } else if settings.fetch.mode == FetchMode::PerItem && !cli.quiet {
        eprintln!("  {} every dependency returned license data", "✓".green());
    }

    match &cli.output {
        Some(file) => std::fs::write(file, &report.text)
            .with_context(|| format!("could not write {}", file.display()))?,
        None => print!("{}", report.text),
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
