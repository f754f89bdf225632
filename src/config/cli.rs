use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the ppreporter cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "ppreporter-cache",
    version,
    about = "Entity cache diagnostics and relaxed-read statement rewriting"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PPREPORTER_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Tag the tables of a SELECT statement with the NOLOCK hint.
    Rewrite(RewriteArgs),
    /// Load lookup tables and today's activity into the cache.
    Prewarm(PrewarmArgs),
    /// Prewarm once and print the cache key list with statistics.
    Stats(StatsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RewriteArgs {
    /// File holding the statement; stdin is read when omitted.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PrewarmArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Keep refreshing today's slice until interrupted.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub watch: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StatsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}
