use clap::Parser;
use tracing_subscriber::EnvFilter;

use docmirror::app::{self, RunOptions};
use docmirror::config::AppPaths;

/// Mirror Google Drive folders to local Markdown files.
#[derive(Debug, Parser)]
#[command(name = "docmirror", version, about)]
struct Cli {
    /// Show what would be converted without exporting or writing anything
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Remove the saved OAuth token and exit
    #[arg(long)]
    logout: bool,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,docmirror=debug,docmirror_core=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = AppPaths::from_env()?;
    if cli.logout {
        return app::logout(&paths);
    }

    let options = RunOptions::from_env(cli.dry_run);
    if let Err(err) = app::run(&paths, options, std::io::stdout()).await {
        tracing::error!("{err:#}");
        return Err(err);
    }
    Ok(())
}
