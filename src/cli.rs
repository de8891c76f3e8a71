//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate), and their associated argument structs.
//! Every flag has an environment variable equivalent for container
//! deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "butler",
    version,
    about = "Configuration-management agent for long-running services",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        butler run -u http://configs.example.com/butler.toml   Start the agent\n  \
        butler validate butler.toml                            Check a config document\n\n  \
        Docs: https://github.com/adobe/butler"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the agent
    Run(Box<RunArgs>),

    /// Validate an agent config document without starting
    Validate(ValidateArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        butler run -u http://configs/butler.toml                      Defaults\n  \
        butler run -u file:///etc/butler/butler.toml --pretty         Local dev\n  \
        butler run -u s3://cfg-bucket/butler.toml --s3-region us-east-1\n  \
        butler run -u http://configs/butler.toml -s env=prod -s dc=or1")]
pub struct RunArgs {
    /// URL of the agent's own config document (http, https, s3, file)
    #[arg(short = 'u', long, env = "BUTLER_CONFIG_URL")]
    pub config_url: String,

    /// Seconds between re-fetches of the agent's own config
    #[arg(
        short = 'i',
        long,
        env = "BUTLER_SCHEDULER_INTERVAL",
        default_value_t = 300
    )]
    pub scheduler_interval: u64,

    /// Timeout in seconds for the agent config fetch
    #[arg(long, env = "BUTLER_CONFIG_TIMEOUT", default_value_t = 10)]
    pub config_timeout: u64,

    /// Skip TLS certificate verification for the agent config fetch
    #[arg(long, env = "BUTLER_CONFIG_INSECURE")]
    pub config_insecure: bool,

    /// AWS region, required when the config URL uses the s3 scheme
    #[arg(long, env = "BUTLER_S3_REGION")]
    pub s3_region: Option<String>,

    /// Default mustache substitution (key=value, repeatable); a manager's
    /// own subs win on collision
    #[arg(short = 's', long = "mustache-subs", value_name = "KEY=VALUE")]
    pub mustache_subs: Vec<String>,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "BUTLER_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Exporter --
    /// Listen address for the metrics/health endpoint
    #[arg(
        long,
        env = "BUTLER_HTTP_HOST",
        default_value = "0.0.0.0",
        help_heading = "Exporter"
    )]
    pub http_host: String,

    /// Listen port for the metrics/health endpoint
    #[arg(
        long,
        env = "BUTLER_HTTP_PORT",
        default_value_t = 8080,
        help_heading = "Exporter"
    )]
    pub http_port: u16,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Agent config document to validate
    #[arg(default_value = "butler.toml")]
    pub config: PathBuf,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}
