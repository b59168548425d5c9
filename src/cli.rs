// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `flowdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowdag",
    version,
    about = "Run a DAG workflow description to completion and print the result.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the engine config file (TOML).
    ///
    /// Default: `Flowdag.toml` in the current working directory. A missing
    /// file means built-in defaults.
    #[arg(long, value_name = "PATH", default_value = "Flowdag.toml")]
    pub config: String,

    /// Path to the DAG description (JSON).
    #[arg(long, value_name = "PATH")]
    pub dag: String,

    /// Initial context as a JSON object.
    #[arg(long, value_name = "JSON")]
    pub input: Option<String>,

    /// Execution id. A random one is generated when omitted.
    #[arg(long, value_name = "ID")]
    pub execution_id: Option<String>,

    /// Give up waiting for the execution after this many seconds.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task tree, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_the_dag_is_given() {
        let args = CliArgs::try_parse_from(["flowdag", "--dag", "flow.json"]).unwrap();
        assert_eq!(args.config, "Flowdag.toml");
        assert_eq!(args.timeout_secs, 60);
        assert!(args.execution_id.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn dag_is_required() {
        assert!(CliArgs::try_parse_from(["flowdag"]).is_err());
    }
}
