//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Download Piwigo albums to the local filesystem.
///
/// Fetches every image of the given albums into one directory per album,
/// resuming interrupted downloads and skipping files that are already
/// current.
#[derive(Parser, Debug)]
#[command(name = "piwigo-dl")]
#[command(author, version, about)]
pub struct Args {
    /// Album ids to download
    #[arg(required = true, value_name = "ALBUM_ID")]
    pub albums: Vec<String>,

    /// Piwigo web-service url (e.g. https://gallery.example/ws.php)
    #[arg(short = 'U', long, value_parser = parse_ws_url)]
    pub url: Url,

    /// Username for the server (empty for anonymous access)
    #[arg(short = 'u', long, default_value = "")]
    pub user: String,

    /// Password of the username
    #[arg(short = 'p', long, default_value = "")]
    pub password: String,

    /// Folder the downloaded albums are saved in
    #[arg(short, long, default_value = "piwigo")]
    pub output: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_ws_url(value: &str) -> Result<Url, String> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err("url must start with http:// or https://".to_string());
    }
    Url::parse(value).map_err(|e| e.to_string())
}
