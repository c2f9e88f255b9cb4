//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "likefeed";
const DEFAULT_POSTS_PER_PAGE: u64 = 20;
const DEFAULT_FIXTURE_PATH: &str = "feed.toml";

/// Command-line arguments for the likefeed binary.
#[derive(Debug, Parser)]
#[command(name = "likefeed", version, about = "Paginated post feed with optimistic likes")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LIKEFEED_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print one page of the feed as JSON.
    Show(ShowArgs),
    /// Like a post, then print the page it appears on.
    Like(MutateArgs),
    /// Remove a like from a post, then print the page it appears on.
    Unlike(MutateArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct ShowArgs {
    #[command(flatten)]
    pub overrides: FeedOverrides,

    /// Page number; anything other than a positive integer means page 1.
    #[arg(long, value_name = "PAGE")]
    pub page: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct MutateArgs {
    #[command(flatten)]
    pub overrides: FeedOverrides,

    /// Identifier of the post to act on.
    #[arg(value_name = "POST_ID")]
    pub post_id: String,

    /// Page number the post is shown on.
    #[arg(long, value_name = "PAGE")]
    pub page: Option<String>,

    #[command(flatten)]
    pub actor: ActorArgs,
}

/// Identity of the signed-in user; both values come from the session provider.
#[derive(Debug, Args, Clone, Default)]
pub struct ActorArgs {
    #[arg(long = "user-id", env = "LIKEFEED_USER_ID", value_name = "ID")]
    pub user_id: Option<String>,

    #[arg(long = "user-name", env = "LIKEFEED_USER_NAME", value_name = "NAME")]
    pub user_name: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FeedOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the feed fixture file.
    #[arg(long = "fixture", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub fixture: Option<PathBuf>,

    /// Override the number of posts per page.
    #[arg(long = "posts-per-page", value_name = "COUNT")]
    pub posts_per_page: Option<u64>,

    /// Mark confirmed entries stale so the next read refetches them.
    #[arg(
        long = "reconcile-on-success",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub reconcile_on_success: Option<bool>,

    /// Make like/unlike calls fail, exercising rollback.
    #[arg(
        long = "fail-mutations",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub fail_mutations: Option<bool>,

    /// Simulated latency of every remote call.
    #[arg(long = "remote-latency-ms", value_name = "MILLIS")]
    pub remote_latency_ms: Option<u64>,
}

impl Command {
    pub fn overrides(&self) -> &FeedOverrides {
        match self {
            Command::Show(args) => &args.overrides,
            Command::Like(args) | Command::Unlike(args) => &args.overrides,
        }
    }
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub feed: FeedSettings,
    pub cache: CacheSettings,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub posts_per_page: NonZeroU32,
    pub fixture: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub reconcile_on_success: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub fail_mutations: bool,
    pub latency: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("LIKEFEED").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.command.overrides());

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    feed: RawFeedSettings,
    cache: RawCacheSettings,
    remote: RawRemoteSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &FeedOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(fixture) = overrides.fixture.as_ref() {
            self.feed.fixture = Some(fixture.clone());
        }
        if let Some(count) = overrides.posts_per_page {
            self.feed.posts_per_page = Some(count);
        }
        if let Some(reconcile) = overrides.reconcile_on_success {
            self.cache.reconcile_on_success = Some(reconcile);
        }
        if let Some(fail) = overrides.fail_mutations {
            self.remote.fail_mutations = Some(fail);
        }
        if let Some(latency) = overrides.remote_latency_ms {
            self.remote.latency_ms = Some(latency);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            feed,
            cache,
            remote,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            feed: build_feed_settings(feed)?,
            cache: CacheSettings {
                reconcile_on_success: cache.reconcile_on_success.unwrap_or(false),
            },
            remote: RemoteSettings {
                fail_mutations: remote.fail_mutations.unwrap_or(false),
                latency: Duration::from_millis(remote.latency_ms.unwrap_or(0)),
            },
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::WARN,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let posts_per_page = non_zero_u32(
        feed.posts_per_page.unwrap_or(DEFAULT_POSTS_PER_PAGE),
        "feed.posts_per_page",
    )?;

    let fixture = feed
        .fixture
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURE_PATH));

    Ok(FeedSettings {
        posts_per_page,
        fixture,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    posts_per_page: Option<u64>,
    fixture: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    reconcile_on_success: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    fail_mutations: Option<bool>,
    latency_ms: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
