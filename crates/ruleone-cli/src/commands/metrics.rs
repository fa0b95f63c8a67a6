use std::sync::Arc;

use ruleone_core::{MetricsRecord, MetricsService, NotFound};
use tokio::task::JoinSet;

use crate::cli::MetricsArgs;
use crate::error::CliError;
use crate::output;

/// Fetches every identifier concurrently. Records are printed in argument
/// order; identifiers without data are reported on stderr.
pub async fn run(
    args: &MetricsArgs,
    service: Arc<MetricsService>,
    default_ticker: &str,
    pretty: bool,
) -> Result<(), CliError> {
    let identifiers = if args.identifiers.is_empty() {
        vec![default_ticker.to_owned()]
    } else {
        args.identifiers.clone()
    };

    let mut tasks = JoinSet::new();
    for (index, identifier) in identifiers.iter().cloned().enumerate() {
        let service = Arc::clone(&service);
        tasks.spawn(async move { (index, service.fetch_company_metrics(&identifier).await) });
    }

    let mut results: Vec<Option<Result<MetricsRecord, NotFound>>> = vec![None; identifiers.len()];
    while let Some(joined) = tasks.join_next().await {
        if let Ok((index, result)) = joined {
            results[index] = Some(result);
        }
    }

    let mut records = Vec::with_capacity(identifiers.len());
    let mut failed = 0;
    for (identifier, result) in identifiers.iter().zip(results) {
        match result {
            Some(Ok(record)) => records.push(record),
            Some(Err(not_found)) => {
                failed += 1;
                eprintln!("error: {not_found}");
            }
            None => {
                failed += 1;
                eprintln!("error: fetch for '{identifier}' ended abnormally");
            }
        }
    }

    match records.as_slice() {
        [] => {}
        [record] if identifiers.len() == 1 => output::render(record, pretty)?,
        _ => output::render(&records, pretty)?,
    }

    if failed > 0 {
        return Err(CliError::NotFound {
            failed,
            requested: identifiers.len(),
        });
    }
    Ok(())
}
