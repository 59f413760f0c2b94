use std::path::PathBuf;

use clap::Parser;

use crate::fetch::FetchMode;

#[derive(Parser, Debug)]
#[command(
    name = "license-notice",
    about = "Generate a third-party license notice for resolved dependencies",
    version
)]
pub struct Cli {
    /// Modules JSON file, or a project directory containing Cargo.lock
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Fetch strategy [default: batch]
    #[arg(long, value_name = "MODE")]
    pub mode: Option<ModeArg>,

    /// Look up dependencies one at a time and report the ones without license data (same as --mode per-item)
    #[arg(long)]
    pub unknown: bool,

    /// Template file replacing the built-in notice
    #[arg(long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Write the notice to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Config file [default: ./.license-notice/config.toml, fallback ~/.config/license-notice/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Metadata service base URL
    #[arg(short, long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Metadata service API key
    #[arg(long, env = "FOSSA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Concurrent lookups in per-item mode
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Give up fetching after SECONDS
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// No progress output, warnings and errors only
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ModeArg {
    Batch,
    PerItem,
}

impl From<&ModeArg> for FetchMode {
    fn from(arg: &ModeArg) -> Self {
        match arg {
            ModeArg::Batch => FetchMode::Batch,
            ModeArg::PerItem => FetchMode::PerItem,
        }
    }
}
