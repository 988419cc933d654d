#![warn(clippy::all, clippy::pedantic)]

mod classify;
mod config;
mod fetch;
mod normalize;
mod output;
mod pipeline;
mod separate;
mod source;

use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};
use num_format::{Locale, ToFormattedString};

use crate::fetch::Client as FetchClient;
use crate::normalize::ListKind;
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[clap(author,version,about,long_about=None)]
struct Cli {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,

    /// Blocklist config file path (default: ./adlists.json)
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// Allowlist config file path (default: ./allowlists.json)
    #[clap(short, long, value_parser)]
    allow_config: Option<PathBuf>,

    /// Output path for the aggregated blocklist
    #[clap(long, value_parser, default_value = "adlist.txt")]
    adlist: PathBuf,

    /// Output path for the aggregated allowlist
    #[clap(long, value_parser, default_value = "allowlist.txt")]
    allowlist: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = &Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let default_config_path = PathBuf::from("adlists.json");
    let config_path = match &cli.config {
        Some(value) => value,
        None => &default_config_path,
    };
    let default_allow_config_path = PathBuf::from("allowlists.json");
    let allow_config_path = match &cli.allow_config {
        Some(value) => value,
        None => &default_allow_config_path,
    };

    let block_sources = config::load_sources(config_path)?;
    let allow_sources = match config::load_sources(allow_config_path) {
        Ok(sources) => sources,
        Err(error) if error.is_missing_file() => {
            info!(
                "No allowlist config found at `{}`.",
                allow_config_path.display()
            );
            Vec::new()
        }
        Err(error) => return Err(error.into()),
    };

    let blocklist = Pipeline {
        kind: ListKind::Block,
        title: "Blocklist".to_owned(),
        sources: block_sources,
        output: cli.adlist.clone(),
    };
    let allowlist = Pipeline {
        kind: ListKind::Allow,
        title: "Allowlist".to_owned(),
        sources: allow_sources,
        output: cli.allowlist.clone(),
    };

    let client = FetchClient::default();
    let summary = pipeline::run(&client, &blocklist, &allowlist).await?;

    for source in &summary.failed_sources {
        warn!("Source failed and was skipped: {source}");
    }
    println!(
        "{} blocklist entries, {} allowlist entries ({} sources failed)",
        summary.blocklist_entries.to_formatted_string(&Locale::en),
        summary.allowlist_entries.to_formatted_string(&Locale::en),
        summary.failed_sources.len().to_formatted_string(&Locale::en)
    );
    Ok(())
}
