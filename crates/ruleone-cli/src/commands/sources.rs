use ruleone_core::MetricsService;
use serde::Serialize;

use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct SourcesResponse {
    sources: Vec<ruleone_core::SourceStatus>,
}

pub async fn run(service: &MetricsService, pretty: bool) -> Result<(), CliError> {
    let sources = service.source_statuses().await;
    output::render(&SourcesResponse { sources }, pretty)
}
