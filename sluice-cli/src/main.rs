//! Sluice command line fetcher
//!
//! Fetches every URL given on the command line through one scheduling
//! [`Client`], so the global and per-destination limits and the per-URL
//! priorities decide the order in which requests go out.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use sluice_client::{verbs, Client, ClientConfig, Priority, Request, DEFAULT_PRIORITY};
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(version, about = "Fetch URLs through a priority-scheduling HTTP client", long_about = None)]
struct Cli {
    /// URLs to fetch. Append `@N` to give one a priority (lower goes first).
    #[arg(required = true, value_name = "URL[@PRIORITY]")]
    urls: Vec<String>,

    /// TOML client configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum requests in flight across all destinations
    #[arg(long)]
    limit_global: Option<usize>,

    /// Maximum requests in flight per destination
    #[arg(long)]
    limit_per_destination: Option<usize>,

    /// Priority for URLs without an `@N` suffix
    #[arg(short, long, default_value_t = DEFAULT_PRIORITY)]
    priority: Priority,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,
}

/// One fetched URL.
struct Fetched {
    url: String,
    status: u16,
    bytes: usize,
    elapsed: Duration,
}

/// Splits a trailing `@N` priority off `arg`. An `@` followed by anything but
/// digits is part of the URL.
fn parse_target(arg: &str, default: Priority) -> (String, Priority) {
    match arg.rsplit_once('@') {
        Some((url, priority)) => match priority.parse() {
            Ok(priority) => (url.to_string(), priority),
            Err(_) => (arg.to_string(), default),
        },
        None => (arg.to_string(), default),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(limit) = cli.limit_global {
        config.limit_global = limit;
    }
    if let Some(limit) = cli.limit_per_destination {
        config.limit_per_destination = limit;
    }
    Ok(config)
}

async fn fetch(client: Client, url: String, priority: Priority) -> anyhow::Result<Fetched> {
    let started = Instant::now();
    let request = Request::get(&url)?.with_priority(priority);
    let response = verbs::follow_redirects(&client, request)
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .with_context(|| format!("reading body of {url}"))?;

    Ok(Fetched {
        url,
        status,
        bytes: body.len(),
        elapsed: started.elapsed(),
    })
}

/// Fetches every URL concurrently and reports each result.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli)?;
    let client = Client::new(config).context("invalid client configuration")?;

    let mut tasks = JoinSet::new();
    for arg in &cli.urls {
        let (url, priority) = parse_target(arg, cli.priority);
        tracing::debug!(url = %url, priority, "queueing");
        tasks.spawn(fetch(client.clone(), url, priority));
    }

    let mut failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined.context("fetch task panicked")? {
            Ok(done) => println!(
                "{} {:>9} bytes {:>8.1?} {}",
                done.status, done.bytes, done.elapsed, done.url
            ),
            Err(err) => {
                failures += 1;
                eprintln!("error: {err:#}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} fetches failed", cli.urls.len());
    }
    Ok(())
}
