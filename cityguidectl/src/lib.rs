use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use cityguide_core::network::{
    PinTable, RateLimiter, RateLimiterConfig, SecureTransport, TransportConfig, UpstreamClient,
};
use cityguide_core::{load_cityguide_config, CityGuideConfig, SqlitePoiCache};

mod commands;

pub use commands::{
    AlternativesArgs, CacheCommands, DiscoverArgs, LocatorArgs, PinCommands, PinFingerprintArgs,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] cityguide_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cache error: {0}")]
    Cache(#[from] cityguide_core::CacheError),
    #[error("network error: {0}")]
    Network(#[from] cityguide_core::NetworkError),
    #[error("{0}")]
    Discovery(#[from] cityguide_core::DiscoveryError),
    #[error("{0}")]
    Curation(#[from] cityguide_core::CurationError),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "City guide discovery and curation tool", long_about = None)]
pub struct Cli {
    /// Path to cityguide.toml
    #[arg(long, default_value = "configs/cityguide.toml")]
    pub config: PathBuf,
    /// Alternative path for poi_cache.sqlite
    #[arg(long)]
    pub cache_db: Option<PathBuf>,
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover points of interest for a city or an area
    Discover(DiscoverArgs),
    /// Rank replacement candidates for one stop of a route
    Alternatives(AlternativesArgs),
    /// Persistent discovery cache
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Certificate pinning helpers
    #[command(subcommand)]
    Pin(PinCommands),
}

pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    let context = || AppContext::new(&cli);

    match &cli.command {
        Commands::Discover(args) => {
            let report = context()?.discover(args)?;
            render(&report, cli.format)?;
        }
        Commands::Alternatives(args) => {
            let report = context()?.alternatives(args)?;
            render(&report, cli.format)?;
        }
        Commands::Cache(CacheCommands::Stats) => {
            let report = context()?.cache_stats()?;
            render(&report, cli.format)?;
        }
        Commands::Cache(CacheCommands::Clear) => {
            let report = context()?.cache_clear()?;
            render(&report, cli.format)?;
        }
        Commands::Cache(CacheCommands::Maintain) => {
            let report = context()?.cache_maintain()?;
            render(&report, cli.format)?;
        }
        Commands::Pin(PinCommands::Fingerprint(args)) => {
            let report = commands::fingerprint_file(args)?;
            render(&report, cli.format)?;
        }
        Commands::Pin(PinCommands::List) => {
            let report = context()?.pin_list()?;
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: CityGuideConfig,
    config_path: PathBuf,
    cache_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let config = load_cityguide_config(&config_path)?;

        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let cache_path = cli
            .cache_db
            .clone()
            .unwrap_or_else(|| config.resolve_path(&config_dir, &config.cache.path));

        debug!(config = %config_path.display(), cache = %cache_path.display(), "context ready");
        Ok(Self {
            config,
            config_path,
            cache_path,
        })
    }

    fn open_cache(&self) -> Result<SqlitePoiCache> {
        let cache = SqlitePoiCache::builder()
            .path(&self.cache_path)
            .ttl_hours(self.config.cache.ttl_hours)
            .build()?;
        cache.initialize()?;
        Ok(cache)
    }

    fn upstream(&self) -> Result<Arc<UpstreamClient>> {
        let pins = PinTable::new(self.config.transport.pins.clone())?;
        let transport = SecureTransport::new(pins, &TransportConfig::from(&self.config.transport))?;
        let limiter = RateLimiter::new(RateLimiterConfig::from(&self.config.rate_limit));
        Ok(Arc::new(UpstreamClient::new(transport, limiter)))
    }

    fn runtime(&self) -> Result<tokio::runtime::Runtime> {
        Ok(tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?)
    }
}
