//! course-cache maintenance CLI.
//!
//! Inspects and maintains the cache database that the data-loading layer
//! writes to. Logging goes to stderr so command output on stdout stays
//! machine-readable.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use coursecache_client::CacheManager;
use coursecache_core::{AppConfig, Params};

#[derive(Parser, Debug)]
#[command(name = "course-cache")]
#[command(about = "Inspect and maintain the course platform response/image cache")]
#[command(version)]
struct Cli {
    /// TOML config file (default: $COURSE_CACHE_CONFIG_FILE)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Print entry counts
    Stats,
    /// Delete expired API entries
    Sweep,
    /// Delete API entries whose endpoint contains PATTERN
    Invalidate { pattern: String },
    /// Delete every cached response and image
    Clear,
    /// Fetch and cache images
    Preload {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print a fresh cached response
    Show {
        endpoint: String,
        /// Request parameter as key=value (repeatable); values are parsed as JSON when possible
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw.split_once('=').ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing(json_logs: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(Some(path)),
        None => AppConfig::load(),
    }
    .context("loading configuration")?;

    tracing::debug!(db_path = %config.db_path.display(), "using cache database");

    let manager = CacheManager::from_config(&config).context("building cache manager")?;
    if !manager.is_available().await {
        bail!("cache database at {} could not be opened", config.db_path.display());
    }

    let output = run(&manager, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn run(manager: &CacheManager, command: Command) -> Result<Value> {
    let output = match command {
        Command::Stats => serde_json::to_value(manager.get_stats().await)?,
        Command::Sweep => json!({ "deleted": manager.clear_expired().await }),
        Command::Invalidate { pattern } => json!({ "deleted": manager.clear_api_by_endpoint(&pattern).await }),
        Command::Clear => json!({ "cleared": manager.clear_all().await }),
        Command::Preload { urls } => {
            let attempted = urls.iter().filter(|u| !u.is_empty()).count();
            let cached = manager.preload_image_urls(&urls).await;
            json!({ "cached": cached, "attempted": attempted })
        }
        Command::Show { endpoint, params } => {
            let params: Params = params.into_iter().collect();
            match manager.get_api(&endpoint, &params).await {
                Some(data) => data,
                None => bail!("no fresh cache entry for {}", manager.generate_key(&endpoint, &params)),
            }
        }
    };
    Ok(output)
}
