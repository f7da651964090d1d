use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "INTERNLINK_DATABASE_URL")]
    pub database_url: String,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub feed: FeedConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Maximum message content length in characters
    #[arg(long, env = "INTERNLINK_MAX_CONTENT_LEN", default_value_t = 4000)]
    pub max_content_len: usize,

    /// Length of the message preview embedded in notification bodies
    #[arg(long, env = "INTERNLINK_NOTIFICATION_PREVIEW_LEN", default_value_t = 80)]
    pub notification_preview_len: usize,
}

#[derive(Clone, Debug, Args)]
pub struct FeedConfig {
    /// Capacity of the change-feed broadcast channel
    #[arg(long, env = "INTERNLINK_FEED_CHANNEL_CAPACITY", default_value_t = 64)]
    pub channel_capacity: usize,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "INTERNLINK_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn load() -> Self {
        Self::parse()
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { max_content_len: 4000, notification_preview_len: 80 }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { channel_capacity: 64 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_format: LogFormat::Text }
    }
}
