//! CLI entry point for the piwigo-dl tool.

use anyhow::Result;
use clap::Parser;
use piwigo_dl_core::album::download_album;
use piwigo_dl_core::fetch::Fetcher;
use piwigo_dl_core::piwigo::Client;
use tracing::{debug, error, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!(url = %args.url, user = %args.user, "piwigo-dl starting");

    let client = Client::new(args.url, args.user, args.password);
    let fetcher = Fetcher::new();

    // One failing album does not stop the rest; failures are reported per
    // album and reflected in the exit code at the end.
    let mut failed = 0usize;
    for album_id in &args.albums {
        match download_album(&client, &fetcher, &args.output, album_id).await {
            Ok(stats) => info!(
                album = %album_id,
                images = stats.images,
                downloaded = stats.downloaded,
                resumed = stats.resumed,
                unchanged = stats.unchanged,
                "album complete"
            ),
            Err(err) => {
                failed += 1;
                error!(album = %album_id, error = %err, "album failed");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} album(s) failed");
    }
    Ok(())
}
