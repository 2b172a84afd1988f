use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use postfeed::core::config::{DEFAULT_CACHE_DIR, DEFAULT_FEED_URL};
use postfeed::{FeedConfig, ServerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "postfeed", version, about = "Single-feed RSS ingestor and posts API")]
struct Opts {
    #[arg(
        long,
        env = "POSTFEED_DATABASE_URL",
        default_value = "sqlite://postfeed.db?mode=rwc",
        global = true
    )]
    database_url: String,

    #[command(flatten)]
    feed: FeedOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct FeedOpts {
    #[arg(long, env = "POSTFEED_FEED_URL", default_value = DEFAULT_FEED_URL, global = true)]
    feed_url: String,

    #[arg(long, env = "POSTFEED_CACHE_DIR", default_value = DEFAULT_CACHE_DIR, global = true)]
    cache_dir: PathBuf,

    #[arg(long, env = "POSTFEED_CACHE_DURATION_SECS", default_value_t = 3600, global = true)]
    cache_duration_secs: u64,

    #[arg(long, env = "POSTFEED_FETCH_TIMEOUT_SECS", default_value_t = 20, global = true)]
    fetch_timeout_secs: u64,

    #[arg(long, env = "POSTFEED_MAX_RETRIES", default_value_t = 0, global = true)]
    max_retries: usize,
}

impl FeedOpts {
    fn into_config(self) -> FeedConfig {
        FeedConfig {
            url: self.feed_url,
            cache_dir: self.cache_dir,
            cache_duration: Duration::from_secs(self.cache_duration_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_retries: self.max_retries,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the feed once and store new posts
    Ingest,
    /// Serve the posts API
    Serve {
        #[arg(long, env = "POSTFEED_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        #[arg(long, env = "POSTFEED_API_TOKEN", hide_env_values = true)]
        api_token: String,

        /// Also ingest the feed every N seconds
        #[arg(long, env = "POSTFEED_INGEST_INTERVAL_SECS")]
        ingest_interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let opts = Opts::parse();
    let feed = opts.feed.into_config();

    match opts.command {
        Command::Ingest => {
            let report = postfeed::run_ingest(&opts.database_url, feed)
                .await
                .context("RSS feed ingestion failed")?;
            tracing::info!(
                inserted = report.inserted,
                already_stored = report.already_stored,
                "RSS feed parsed successfully"
            );
        }
        Command::Serve {
            bind,
            api_token,
            ingest_interval_secs,
        } => {
            let server = ServerConfig {
                bind,
                api_token,
                ingest_interval: ingest_interval_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            };
            postfeed::run_server(&opts.database_url, feed, server)
                .await
                .context("posts api failed")?;
        }
    }
    Ok(())
}
