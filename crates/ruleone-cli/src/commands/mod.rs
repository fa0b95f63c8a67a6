mod metrics;
mod resolve;
mod sources;

use std::sync::Arc;

use ruleone_core::{MetricsService, ServiceContext, Settings};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli, settings: Settings) -> Result<(), CliError> {
    let context = ServiceContext::from_settings(&settings)?;
    let default_ticker = settings.default_ticker.clone();
    let service = Arc::new(MetricsService::builder(context).settings(settings).build());

    match &cli.command {
        Command::Metrics(args) => metrics::run(args, service, &default_ticker, cli.pretty).await,
        Command::Resolve(args) => resolve::run(args, &service, cli.pretty).await,
        Command::Sources => sources::run(&service, cli.pretty).await,
    }
}
