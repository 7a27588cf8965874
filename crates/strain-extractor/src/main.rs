//! strain-extractor — print the normalized record for one strain.

use clap::Parser;

use strain_extractor::cli::{self, Cli};
use strain_extractor::{ChromiumLauncher, ExtractorConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = cli::run(&cli.slug, ExtractorConfig::from_env(), ChromiumLauncher::new).await;

    if let Some(diagnostic) = &outcome.diagnostic {
        eprintln!("Error: {diagnostic}");
    }
    println!("{}", outcome.stdout);
    std::process::exit(outcome.exit_code);
}
