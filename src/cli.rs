//! Command Line Interface (CLI) arguments.

use byte_unit::Byte;
use clap::Parser;
use url::Url;

/// Channel stats server command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "CHANNEL_STATS_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8000, env = "CHANNEL_STATS_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "CHANNEL_STATS_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/channel-stats/certs/cert.pem",
        env = "CHANNEL_STATS_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/channel-stats/certs/key.pem",
        env = "CHANNEL_STATS_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "CHANNEL_STATS_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to enable sending traces to Jaeger.
    #[arg(long, default_value_t = false, env = "CHANNEL_STATS_ENABLE_JAEGER")]
    pub enable_jaeger: bool,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "CHANNEL_STATS_USE_RAYON")]
    pub use_rayon: bool,
    /// URL of the S3-compatible object store holding the data files
    #[arg(
        long,
        default_value = "http://localhost:9000",
        env = "CHANNEL_STATS_S3_ENDPOINT"
    )]
    pub s3_endpoint: Url,
    /// Bucket in which data files are stored
    #[arg(long, default_value = "channel-stats", env = "CHANNEL_STATS_S3_BUCKET")]
    pub s3_bucket: String,
    /// Region of the object store
    #[arg(long, default_value = "us-east-1", env = "CHANNEL_STATS_S3_REGION")]
    pub s3_region: String,
    /// Access key for the object store. Anonymous access is used if unset.
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub s3_access_key: Option<String>,
    /// Secret key for the object store
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,
    /// Maximum number of simultaneous outbound S3 connections
    #[arg(long, env = "CHANNEL_STATS_S3_CONNECTION_LIMIT")]
    pub s3_connection_limit: Option<usize>,
    /// Memory limit for data files held in memory, e.g. "512 MiB"
    #[arg(long, value_parser = parse_byte_size, env = "CHANNEL_STATS_MEMORY_LIMIT")]
    pub memory_limit: Option<usize>,
    /// Limit on the number of concurrent statistics tasks. Defaults to one less than the number
    /// of CPUs.
    #[arg(long, env = "CHANNEL_STATS_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Maximum size of an uploaded data file
    #[arg(
        long,
        default_value = "64 MiB",
        value_parser = parse_byte_size,
        env = "CHANNEL_STATS_MAX_UPLOAD_SIZE"
    )]
    pub max_upload_size: usize,
}

/// Parse a human readable byte size such as "64 MiB" or "1000".
fn parse_byte_size(value: &str) -> Result<usize, String> {
    let bytes = Byte::parse_str(value, /* ignore case */ true)
        .map_err(|err| format!("invalid byte size {value:?}: {err}"))?
        .as_u64();
    usize::try_from(bytes).map_err(|err| err.to_string())
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
