use ruleone_core::MetricsService;

use crate::cli::ResolveArgs;
use crate::error::CliError;
use crate::output;

pub async fn run(
    args: &ResolveArgs,
    service: &MetricsService,
    pretty: bool,
) -> Result<(), CliError> {
    let resolution = service.resolve(&args.identifier).await;
    output::render(&resolution, pretty)
}
