//! Command-line surface: argument parsing and the stdout/exit-code contract.

use clap::Parser;

use crate::config::ExtractorConfig;
use crate::extractor::StrainExtractor;
use crate::renderer::Launcher;
use crate::types::{ExtractResult, DEFAULT_SLUG};

/// Levels accepted by `--log-level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Parser, Debug)]
#[command(
    name = "strain-extractor",
    about = "Extract strain details by intercepting the strain page's API response",
    version,
    after_help = "Environment: STRAIN_BASE_URL, STRAIN_API_PATTERN, STRAIN_WAIT_UNTIL, STRAIN_SETTLE_MS,\nSTRAIN_SETTLE_MODE, STRAIN_NAV_TIMEOUT_MS, STRAIN_CHROMIUM_PATH, STRAIN_HEADFUL."
)]
pub struct Cli {
    /// Strain slug, as it appears in the page URL.
    #[arg(default_value = DEFAULT_SLUG)]
    pub slug: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", value_parser = LOG_LEVELS)]
    pub log_level: String,
}

/// What the binary prints and how it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Written to stdout: the pretty-printed record, or `null`.
    pub stdout: String,
    /// Written to stderr when the run failed.
    pub diagnostic: Option<String>,
    pub exit_code: i32,
}

impl Outcome {
    fn failure(diagnostic: impl ToString) -> Self {
        Self {
            stdout: "null".to_string(),
            diagnostic: Some(diagnostic.to_string()),
            exit_code: 1,
        }
    }
}

/// Run one extraction and map every result, configuration errors included,
/// onto the output contract.
pub async fn run<L, F>(slug: &str, config: ExtractResult<ExtractorConfig>, launcher: F) -> Outcome
where
    L: Launcher,
    F: FnOnce(&ExtractorConfig) -> L,
{
    let config = match config {
        Ok(config) => config,
        Err(e) => return Outcome::failure(e),
    };
    let extractor = StrainExtractor::new(launcher(&config), config);

    match extractor.extract(slug).await {
        Ok(record) => match serde_json::to_string_pretty(&record) {
            Ok(stdout) => Outcome {
                stdout,
                diagnostic: None,
                exit_code: 0,
            },
            Err(e) => Outcome::failure(e),
        },
        Err(e) => Outcome::failure(e),
    }
}
