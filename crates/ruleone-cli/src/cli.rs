//! CLI argument definitions for ruleone.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `metrics` | Rule #1 metrics for one or more tickers or ISINs |
//! | `resolve` | Show how an identifier maps to a ticker |
//! | `sources` | List registered sources and their health |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--deadline-ms` | `RULEONE_REQUEST_DEADLINE_MS` | Per-identifier fetch deadline |
//! | `--max-concurrency` | `RULEONE_MAX_CONCURRENT_REQUESTS` | Upstream calls in flight |
//!
//! # Examples
//!
//! ```bash
//! ruleone metrics NVDA
//! ruleone metrics US67066G1040 MSFT --pretty
//! ruleone resolve DE000BASF111
//! ```

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use ruleone_core::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "ruleone",
    author,
    version,
    about = "Rule #1 value-investing metrics from aggregated fundamentals"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Deadline for fetching one identifier, in milliseconds.
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub deadline_ms: Option<u64>,

    /// Maximum number of upstream calls in flight.
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_concurrency: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Command-line flags win over environment settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(deadline_ms) = self.deadline_ms {
            settings.request_deadline = Duration::from_millis(deadline_ms);
        }
        if let Some(max) = self.max_concurrency {
            settings.max_concurrent_requests = usize::try_from(max).unwrap_or(usize::MAX);
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch fundamentals and compute Rule #1 metrics.
    ///
    /// Identifiers are fetched concurrently. Without arguments the configured
    /// default ticker is used.
    ///
    /// # Examples
    ///
    ///   ruleone metrics NVDA
    ///   ruleone metrics AAPL US67066G1040 --pretty
    Metrics(MetricsArgs),

    /// Resolve a ticker or ISIN without fetching data.
    Resolve(ResolveArgs),

    /// List registered sources, their role and health.
    Sources,
}

/// Arguments for the `metrics` command.
#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Tickers or ISINs.
    pub identifiers: Vec<String>,
}

/// Arguments for the `resolve` command.
#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Ticker or ISIN.
    pub identifier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "ruleone",
            "metrics",
            "NVDA",
            "AAPL",
            "--deadline-ms",
            "1500",
            "--max-concurrency",
            "2",
            "--pretty",
        ])
        .expect("valid arguments");
        let mut settings = Settings::default();

        cli.apply_overrides(&mut settings);

        assert!(cli.pretty);
        assert_eq!(settings.request_deadline, Duration::from_millis(1_500));
        assert_eq!(settings.max_concurrent_requests, 2);
        let Command::Metrics(args) = cli.command else {
            panic!("metrics command expected");
        };
        assert_eq!(args.identifiers, vec!["NVDA", "AAPL"]);
    }

    #[test]
    fn metrics_accepts_no_identifiers() {
        let cli = Cli::try_parse_from(["ruleone", "metrics"]).expect("valid arguments");
        let Command::Metrics(args) = cli.command else {
            panic!("metrics command expected");
        };
        assert!(args.identifiers.is_empty());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let error = Cli::try_parse_from(["ruleone", "--max-concurrency", "0", "sources"])
            .expect_err("zero is invalid");
        assert_eq!(error.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
