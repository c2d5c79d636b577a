//! # Queue-Overflow CLI
//!
//! Command-line interface over the `queue-overflow` library.
//!
//! This module provides CLI commands for:
//! - Consuming messages from a queue, resolving overflow payloads
//! - Sending payloads through the overflow store
//! - Inspecting the resolved configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `QUEUE_OVERFLOW__*` environment variables, then command-line flags.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use queue_overflow::providers::aws::{AwsSqsClient, AwsSqsConfig};
use queue_overflow::providers::memory::{InMemoryObjectStore, InMemoryQueueService};
use queue_overflow::providers::s3::{S3Config, S3ObjectStore};
use queue_overflow::{
    MessageStream, ObjectStore, QueueService, ResolvedMessage, SendOptions, StreamBuilder,
    StreamError,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of configuration environment variables, e.g.
/// `QUEUE_OVERFLOW__STREAM__QUEUE=orders`
pub const ENV_PREFIX: &str = "QUEUE_OVERFLOW";

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue-Overflow CLI - queue consumer with object-store payload overflow
#[derive(Parser, Debug)]
#[command(name = "queue-overflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Consume and send queue messages with object-store payload overflow")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_OVERFLOW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive, overrides `logging.level`
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Receive messages and print their payloads
    Consume {
        /// Queue to read from, overrides `stream.queue`
        #[arg(short, long)]
        queue: Option<String>,

        /// Overflow bucket, overrides `stream.bucket`
        #[arg(short, long)]
        bucket: Option<String>,

        /// Poll every SECS seconds instead of long-polling back to back
        #[arg(short, long, value_name = "SECS")]
        interval: Option<u64>,

        /// Stop after this many messages
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Delete each message after printing it
        #[arg(short, long)]
        delete: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Upload a payload to the overflow store and enqueue its key
    Send {
        /// Queue to send to, overrides `stream.queue`
        #[arg(short, long)]
        queue: Option<String>,

        /// Overflow bucket, overrides `stream.bucket`
        #[arg(short, long)]
        bucket: Option<String>,

        /// Payload text
        #[arg(short, long)]
        message: Option<String>,

        /// Read the payload from this file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Object header, repeatable
        #[arg(long = "header", value_name = "KEY=VALUE")]
        headers: Vec<String>,
    },

    /// Validate and display configuration
    Config {
        /// Print the resolved configuration as TOML
        #[arg(short, long)]
        show: bool,
    },
}

/// Output format for consumed messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One tab-separated line per message
    Text,
    /// One JSON object per line
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Stream(_) => 2,
            Self::Io(_) => 3,
            Self::InvalidArgument { .. } => 4,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// CLI configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    pub logging: LoggingConfig,
    pub provider: ProviderConfig,
    pub stream: StreamSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Which clients back the queue and the overflow store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// AWS SQS and S3, or compatible endpoints
    Aws,
    /// Process-local queue and store
    #[default]
    Memory,
}

/// Provider connection settings
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqs_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            sqs_endpoint: None,
            s3_endpoint: None,
        }
    }
}

impl ProviderConfig {
    fn sqs_config(&self) -> AwsSqsConfig {
        AwsSqsConfig {
            region: self.region.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            endpoint: self.sqs_endpoint.clone(),
        }
    }

    fn s3_config(&self) -> S3Config {
        S3Config {
            region: self.region.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            endpoint: self.s3_endpoint.clone(),
        }
    }

    /// Copy with the secret replaced, for display
    fn redacted(&self) -> Self {
        Self {
            secret_access_key: self
                .secret_access_key
                .as_ref()
                .map(|_| "<redacted>".to_string()),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = self.redacted();
        f.debug_struct("ProviderConfig")
            .field("kind", &redacted.kind)
            .field("region", &redacted.region)
            .field("access_key_id", &redacted.access_key_id)
            .field("secret_access_key", &redacted.secret_access_key)
            .field("sqs_endpoint", &redacted.sqs_endpoint)
            .field("s3_endpoint", &redacted.s3_endpoint)
            .finish()
    }
}

/// Default stream options, each overridable on the command line
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        config.logging.format
    };
    initialize_logging(&level, format)?;

    execute_command(cli.command, &config).await
}

/// Install the global tracing subscriber; logs go to stderr
pub fn initialize_logging(level: &str, format: LogFormat) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| CliError::InvalidArgument {
        arg: "log-level".to_string(),
        message: e.to_string(),
    })
}

/// Load configuration from defaults, an optional file and the environment
pub fn load_configuration(path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    load_configuration_from(path, None)
}

/// As [`load_configuration`], reading variables from `environment` instead
/// of the process environment when given
pub fn load_configuration_from(
    path: Option<&Path>,
    environment: Option<config::Map<String, String>>,
) -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        builder = builder.add_source(
            config::File::from(path)
                .required(true)
                .format(config::FileFormat::Toml),
        );
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(environment),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

async fn execute_command(command: Commands, config: &CliConfig) -> Result<(), CliError> {
    match command {
        Commands::Consume {
            queue,
            bucket,
            interval,
            limit,
            delete,
            format,
        } => {
            let interval = interval.or(config.stream.interval_seconds);
            let builder = stream_builder(
                &config.provider,
                &setting(queue, &config.stream.queue, "stream.queue")?,
                bucket.or_else(|| config.stream.bucket.clone()),
                interval,
            )?;
            execute_consume_command(builder, ConsumeOptions { limit, delete, format }).await
        }
        Commands::Send {
            queue,
            bucket,
            message,
            file,
            headers,
        } => {
            let builder = stream_builder(
                &config.provider,
                &setting(queue, &config.stream.queue, "stream.queue")?,
                Some(setting(bucket, &config.stream.bucket, "stream.bucket")?),
                None,
            )?;
            let payload = read_payload(message, file.as_deref())?;
            let options = parse_headers(&headers)?
                .into_iter()
                .fold(SendOptions::new(), |options, (key, value)| {
                    options.with_header(key, value)
                });
            execute_send_command(builder, payload, options).await
        }
        Commands::Config { show } => execute_config_command(config, show, &mut std::io::stdout()),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Options of the `consume` command
#[derive(Debug, Clone, Copy)]
pub struct ConsumeOptions {
    pub limit: Option<usize>,
    pub delete: bool,
    pub format: OutputFormat,
}

/// JSON shape of one consumed message
#[derive(Serialize)]
struct MessageRecord<'a> {
    receipt_handle: &'a str,
    timestamp: String,
    overflow_key: Option<&'a str>,
    payload: String,
}

async fn execute_consume_command(
    builder: StreamBuilder,
    options: ConsumeOptions,
) -> Result<(), CliError> {
    let mut stream = builder.open().await?;

    let cancel = stream.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let count = consume_messages(&mut stream, options, &mut std::io::stdout()).await?;
    info!(count = count, "Finished consuming");
    Ok(())
}

/// Print messages from `stream` until it ends or `limit` is reached
///
/// The stream is closed before returning. Returns the number of messages
/// printed.
pub async fn consume_messages<W: Write>(
    stream: &mut MessageStream,
    options: ConsumeOptions,
    out: &mut W,
) -> Result<usize, CliError> {
    let mut count = 0;
    while options.limit.map_or(true, |limit| count < limit) {
        let Some(result) = stream.next().await else {
            break;
        };
        let message = result?;
        write_message(out, &message, options.format)?;
        if options.delete {
            message.delete().await?;
        }
        count += 1;
    }

    stream.close();
    Ok(count)
}

fn write_message<W: Write>(
    out: &mut W,
    message: &ResolvedMessage,
    format: OutputFormat,
) -> Result<(), CliError> {
    let payload = String::from_utf8_lossy(message.payload()).into_owned();
    match format {
        OutputFormat::Text => writeln!(
            out,
            "{}\t{}\t{}",
            message.timestamp(),
            message.overflow_key().map_or("-", |key| key.as_str()),
            payload
        )?,
        OutputFormat::Json => {
            let record = MessageRecord {
                receipt_handle: message.receipt_handle().as_str(),
                timestamp: message.timestamp().to_string(),
                overflow_key: message.overflow_key().map(|key| key.as_str()),
                payload,
            };
            serde_json::to_writer(&mut *out, &record).map_err(std::io::Error::from)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

async fn execute_send_command(
    builder: StreamBuilder,
    payload: Bytes,
    options: SendOptions,
) -> Result<(), CliError> {
    let size = payload.len();
    let key = builder.build()?.service().send(payload, &options).await?;

    info!(key = %key, size = size, "Sent payload");
    println!("{}", key);
    Ok(())
}

/// Print a validation summary, or the configuration itself when `show` is set
pub fn execute_config_command<W: Write>(
    config: &CliConfig,
    show: bool,
    out: &mut W,
) -> Result<(), CliError> {
    if show {
        let display = CliConfig {
            provider: config.provider.redacted(),
            ..config.clone()
        };
        let rendered = toml::to_string_pretty(&display).map_err(ConfigError::from)?;
        write!(out, "{}", rendered)?;
    } else {
        writeln!(out, "Configuration is valid")?;
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Flag value if given, else the configured value
fn setting(flag: Option<String>, configured: &Option<String>, key: &str) -> Result<String, CliError> {
    flag.or_else(|| configured.clone())
        .ok_or_else(|| {
            ConfigError::MissingRequired {
                key: key.to_string(),
            }
            .into()
        })
}

/// Stream builder wired to the configured provider's clients
pub fn stream_builder(
    provider: &ProviderConfig,
    queue: &str,
    bucket: Option<String>,
    interval_seconds: Option<u64>,
) -> Result<StreamBuilder, CliError> {
    let mut builder = StreamBuilder::new(queue);

    match provider.kind {
        ProviderKind::Aws => {
            let sqs = provider.sqs_config();
            builder = builder.with_queue_factory(move || {
                Ok(Box::new(AwsSqsClient::new(sqs.clone())?) as Box<dyn QueueService>)
            });
            if bucket.is_some() {
                let s3 = provider.s3_config();
                builder = builder.with_store_factory(move || {
                    Ok(Box::new(S3ObjectStore::new(s3.clone())?) as Box<dyn ObjectStore>)
                });
            }
        }
        ProviderKind::Memory => {
            let queues = InMemoryQueueService::new();
            builder = builder.with_queue_factory(move || {
                Ok(Box::new(queues.client()) as Box<dyn QueueService>)
            });
            if bucket.is_some() {
                let objects = InMemoryObjectStore::new();
                builder = builder.with_store_factory(move || {
                    Ok(Box::new(objects.client()) as Box<dyn ObjectStore>)
                });
            }
        }
    }

    if let Some(bucket) = bucket {
        builder = builder.with_bucket_name(bucket);
    }

    match interval_seconds {
        Some(0) => Err(CliError::InvalidArgument {
            arg: "interval".to_string(),
            message: "must be at least one second".to_string(),
        }),
        Some(seconds) => Ok(builder.with_interval(Duration::from_secs(seconds))),
        None => Ok(builder),
    }
}

/// Payload from exactly one of `--message` and `--file`
pub fn read_payload(message: Option<String>, file: Option<&Path>) -> Result<Bytes, CliError> {
    match (message, file) {
        (Some(text), None) => Ok(Bytes::from(text)),
        (None, Some(path)) => Ok(Bytes::from(std::fs::read(path)?)),
        (Some(_), Some(_)) => Err(CliError::InvalidArgument {
            arg: "message".to_string(),
            message: "use either --message or --file, not both".to_string(),
        }),
        (None, None) => Err(CliError::InvalidArgument {
            arg: "message".to_string(),
            message: "one of --message or --file is required".to_string(),
        }),
    }
}

/// Split `KEY=VALUE` arguments
pub fn parse_headers(headers: &[String]) -> Result<Vec<(String, String)>, CliError> {
    headers
        .iter()
        .map(|header| match header.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(CliError::InvalidArgument {
                arg: "header".to_string(),
                message: format!("expected KEY=VALUE, got '{}'", header),
            }),
        })
        .collect()
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
