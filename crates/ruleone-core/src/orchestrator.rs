use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::data_source::{FundamentalsSource, SourceError};
use crate::merge::{merge_fragments, SourcedFragment};
use crate::{CompanyFundamentals, FragmentKind, ProviderId, Symbol};

pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(20);

/// Lifecycle of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    Idle,
    Dispatching,
    Awaiting,
    Complete,
    TimedOut,
    Merged,
}

/// How one source ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Completed,
    Failed(SourceError),
    /// Still running when the request deadline passed.
    TimedOut,
    /// Not dispatched because the source reported itself unhealthy.
    Skipped,
    /// Aborted after a critical source failed.
    Cancelled,
}

impl SourceOutcome {
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for SourceOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(error) => write!(f, "failed: {error}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub provider: ProviderId,
    pub kind: FragmentKind,
    pub critical: bool,
    pub outcome: SourceOutcome,
    /// Absent for sources that never finished.
    pub latency_ms: Option<u64>,
}

/// Per-request record of what every source did.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub request_id: Uuid,
    pub symbol: Symbol,
    pub phases: Vec<FetchPhase>,
    pub sources: Vec<SourceReport>,
    /// Completed fragments in source registration order.
    pub fragments: Vec<SourcedFragment>,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
}

impl FetchReport {
    fn new(request_id: Uuid, symbol: Symbol) -> Self {
        Self {
            request_id,
            symbol,
            phases: vec![FetchPhase::Idle],
            sources: Vec::new(),
            fragments: Vec::new(),
            warnings: Vec::new(),
            latency_ms: 0,
        }
    }

    fn enter(&mut self, phase: FetchPhase) {
        debug!(request_id = %self.request_id, ?phase, "fetch phase");
        self.phases.push(phase);
    }

    pub fn phase(&self) -> FetchPhase {
        self.phases.last().copied().unwrap_or(FetchPhase::Idle)
    }

    pub fn outcome(&self, provider: ProviderId, kind: FragmentKind) -> Option<&SourceOutcome> {
        self.sources
            .iter()
            .find(|source| source.provider == provider && source.kind == kind)
            .map(|source| &source.outcome)
    }

    /// Non-critical providers with at least one source that did not complete.
    pub fn degraded_sources(&self) -> Vec<ProviderId> {
        let mut degraded = Vec::new();
        for source in &self.sources {
            if !source.critical
                && !source.outcome.is_completed()
                && !degraded.contains(&source.provider)
            {
                degraded.push(source.provider);
            }
        }
        degraded
    }

    fn critical_failure(&self) -> Option<&SourceReport> {
        self.sources
            .iter()
            .find(|source| source.critical && !source.outcome.is_completed())
    }
}

/// Merged fundamentals plus the report that produced them.
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    pub fundamentals: CompanyFundamentals,
    pub report: FetchReport,
}

#[derive(Debug, Clone, Error)]
pub enum FetchFailure {
    #[error("critical source '{provider}' ({kind}) did not complete: {outcome}")]
    CriticalSource {
        provider: ProviderId,
        kind: FragmentKind,
        outcome: SourceOutcome,
        report: Box<FetchReport>,
    },
}

impl FetchFailure {
    pub fn report(&self) -> &FetchReport {
        match self {
            Self::CriticalSource { report, .. } => report,
        }
    }
}

/// Fans a symbol out to every registered source and merges the fragments.
///
/// The permit pool is shared by all requests served by this orchestrator, so
/// `max_concurrent_requests` bounds upstream calls process-wide.
pub struct FetchOrchestrator {
    sources: Vec<Arc<dyn FundamentalsSource>>,
    permits: Arc<Semaphore>,
    deadline: Duration,
    growth_order: Vec<ProviderId>,
}

impl FetchOrchestrator {
    pub fn new(sources: Vec<Arc<dyn FundamentalsSource>>) -> Self {
        Self {
            sources,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_REQUESTS)),
            deadline: DEFAULT_REQUEST_DEADLINE,
            growth_order: vec![ProviderId::Yahoo, ProviderId::Zacks],
        }
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_growth_order(mut self, growth_order: Vec<ProviderId>) -> Self {
        self.growth_order = growth_order;
        self
    }

    pub fn sources(&self) -> &[Arc<dyn FundamentalsSource>] {
        &self.sources
    }

    pub fn growth_order(&self) -> &[ProviderId] {
        &self.growth_order
    }

    pub async fn fetch(&self, symbol: &Symbol) -> Result<FetchSuccess, FetchFailure> {
        let request_id = Uuid::new_v4();
        let span = info_span!("fetch", %request_id, %symbol);
        self.run(request_id, symbol).instrument(span).await
    }

    async fn run(&self, request_id: Uuid, symbol: &Symbol) -> Result<FetchSuccess, FetchFailure> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut report = FetchReport::new(request_id, symbol.clone());
        let mut outcomes: Vec<Option<(SourceOutcome, Option<u64>)>> =
            vec![None; self.sources.len()];
        let mut fragments = Vec::new();
        let mut tasks = JoinSet::new();

        report.enter(FetchPhase::Dispatching);
        for (index, source) in self.sources.iter().enumerate() {
            let health = source.health().await;
            if !health.is_available() {
                warn!(provider = %source.id(), kind = %source.kind(), "source unhealthy, skipping");
                outcomes[index] = Some((SourceOutcome::Skipped, None));
                continue;
            }

            let source = Arc::clone(source);
            let permits = Arc::clone(&self.permits);
            let symbol = symbol.clone();
            tasks.spawn(
                async move {
                    let started = Instant::now();
                    let result = match permits.acquire_owned().await {
                        Ok(_permit) => source.fetch(&symbol).await,
                        Err(_) => Err(SourceError::internal("concurrency limiter closed")),
                    };
                    (index, result, elapsed_ms(started))
                }
                .in_current_span(),
            );
        }

        report.enter(FetchPhase::Awaiting);
        let mut short_circuited = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(None) => {
                    report.enter(FetchPhase::Complete);
                    break;
                }
                Ok(Some(Ok((index, result, latency_ms)))) => {
                    let source = &self.sources[index];
                    let outcome = match result {
                        Ok(fragment) if fragment.kind() == source.kind() => {
                            fragments.push((
                                index,
                                SourcedFragment {
                                    provider: source.id(),
                                    fragment: fragment.normalized(),
                                },
                            ));
                            SourceOutcome::Completed
                        }
                        Ok(fragment) => SourceOutcome::Failed(SourceError::malformed(format!(
                            "expected {} fragment, got {}",
                            source.kind(),
                            fragment.kind()
                        ))),
                        Err(error) => SourceOutcome::Failed(error),
                    };

                    if let SourceOutcome::Failed(error) = &outcome {
                        warn!(
                            provider = %source.id(),
                            kind = %source.kind(),
                            critical = source.critical(),
                            code = error.code(),
                            error = error.message(),
                            "source failed"
                        );
                    }
                    let critical_failed = source.critical() && !outcome.is_completed();
                    outcomes[index] = Some((outcome, Some(latency_ms)));

                    if critical_failed {
                        tasks.abort_all();
                        short_circuited = true;
                        report.enter(FetchPhase::Complete);
                        break;
                    }
                }
                Ok(Some(Err(join_error))) => {
                    report
                        .warnings
                        .push(format!("source task ended abnormally: {join_error}"));
                }
                Err(_) => {
                    tasks.abort_all();
                    warn!(deadline_ms = duration_ms(self.deadline), "request deadline elapsed");
                    report.enter(FetchPhase::TimedOut);
                    break;
                }
            }
        }

        let unfinished = match report.phase() {
            FetchPhase::TimedOut => SourceOutcome::TimedOut,
            _ if short_circuited => SourceOutcome::Cancelled,
            _ => SourceOutcome::Failed(SourceError::internal("source task panicked")),
        };
        for (source, outcome) in self.sources.iter().zip(outcomes) {
            let (outcome, latency_ms) = outcome.unwrap_or_else(|| (unfinished.clone(), None));
            if outcome == SourceOutcome::TimedOut {
                warn!(provider = %source.id(), kind = %source.kind(), "source timed out");
            }
            report.sources.push(SourceReport {
                provider: source.id(),
                kind: source.kind(),
                critical: source.critical(),
                outcome,
                latency_ms,
            });
        }

        fragments.sort_by_key(|(index, _)| *index);
        report.fragments = fragments.into_iter().map(|(_, fragment)| fragment).collect();
        report.latency_ms = elapsed_ms(started);

        if let Some(failed) = report.critical_failure() {
            let (provider, kind, outcome) = (failed.provider, failed.kind, failed.outcome.clone());
            warn!(%provider, %kind, %outcome, latency_ms = report.latency_ms, "fetch failed");
            return Err(FetchFailure::CriticalSource {
                provider,
                kind,
                outcome,
                report: Box::new(report),
            });
        }

        let fundamentals = merge_fragments(symbol.clone(), &report.fragments, &self.growth_order);
        report.enter(FetchPhase::Merged);
        let degraded = report.degraded_sources();
        if !degraded.is_empty() {
            report.warnings.push(format!(
                "degraded result; incomplete sources: {}",
                degraded
                    .iter()
                    .map(|provider| provider.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        info!(
            latency_ms = report.latency_ms,
            fragments = report.fragments.len(),
            degraded = degraded.len(),
            "fetch complete"
        );

        Ok(FetchSuccess {
            fundamentals,
            report,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    duration_ms(started.elapsed())
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{BoxFuture, HealthState, HealthStatus};
    use crate::{FinancialStatements, FundamentalsFragment, GrowthEstimate};

    struct Canned {
        provider: ProviderId,
        kind: FragmentKind,
        result: Result<FundamentalsFragment, SourceError>,
        health: HealthStatus,
        delay: Duration,
    }

    impl Canned {
        fn statements() -> Self {
            Self {
                provider: ProviderId::Alphavantage,
                kind: FragmentKind::Statements,
                result: Ok(FundamentalsFragment::Statements(FinancialStatements {
                    historical_eps_growth: Some(9.0),
                    ..FinancialStatements::default()
                })),
                health: HealthStatus::healthy(),
                delay: Duration::ZERO,
            }
        }

        fn growth(provider: ProviderId, result: Result<f64, SourceError>) -> Self {
            Self {
                provider,
                kind: FragmentKind::GrowthEstimate,
                result: result.map(|percent| {
                    FundamentalsFragment::GrowthEstimate(
                        GrowthEstimate::new(provider, percent).expect("finite"),
                    )
                }),
                health: HealthStatus::healthy(),
                delay: Duration::ZERO,
            }
        }
    }

    impl FundamentalsSource for Canned {
        fn id(&self) -> ProviderId {
            self.provider
        }

        fn kind(&self) -> FragmentKind {
            self.kind
        }

        fn fetch<'a>(
            &'a self,
            _symbol: &'a Symbol,
        ) -> BoxFuture<'a, Result<FundamentalsFragment, SourceError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.result.clone()
            })
        }

        fn health<'a>(&'a self) -> BoxFuture<'a, HealthStatus> {
            Box::pin(async move { self.health })
        }
    }

    fn symbol() -> Symbol {
        Symbol::parse("NVDA").expect("valid")
    }

    #[tokio::test]
    async fn walks_every_phase_on_success() {
        let orchestrator = FetchOrchestrator::new(vec![
            Arc::new(Canned::statements()),
            Arc::new(Canned::growth(ProviderId::Zacks, Ok(14.0))),
        ]);

        let success = orchestrator.fetch(&symbol()).await.expect("fetch succeeds");

        assert_eq!(
            success.report.phases,
            vec![
                FetchPhase::Idle,
                FetchPhase::Dispatching,
                FetchPhase::Awaiting,
                FetchPhase::Complete,
                FetchPhase::Merged,
            ]
        );
        assert_eq!(success.fundamentals.five_year_growth_rate, Some(14.0));
        assert!(success.report.degraded_sources().is_empty());
    }

    #[tokio::test]
    async fn failed_growth_source_degrades_instead_of_failing() {
        let orchestrator = FetchOrchestrator::new(vec![
            Arc::new(Canned::statements()),
            Arc::new(Canned::growth(
                ProviderId::Zacks,
                Err(SourceError::unavailable("zacks down")),
            )),
        ]);

        let success = orchestrator.fetch(&symbol()).await.expect("degraded success");

        assert_eq!(success.report.degraded_sources(), vec![ProviderId::Zacks]);
        assert_eq!(success.fundamentals.five_year_growth_rate, Some(9.0));
        assert_eq!(success.report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn unhealthy_critical_source_is_skipped_and_fails_the_request() {
        let mut statements = Canned::statements();
        statements.health = HealthStatus::new(HealthState::Unhealthy, true);
        let orchestrator = FetchOrchestrator::new(vec![Arc::new(statements)]);

        let failure = orchestrator.fetch(&symbol()).await.expect_err("critical skipped");

        let FetchFailure::CriticalSource { outcome, .. } = &failure;
        assert_eq!(*outcome, SourceOutcome::Skipped);
        assert_eq!(failure.report().fragments.len(), 0);
    }

    #[tokio::test]
    async fn mismatched_fragment_kind_is_malformed() {
        let mut statements = Canned::statements();
        statements.result = Ok(FundamentalsFragment::GrowthEstimate(
            GrowthEstimate::new(ProviderId::Alphavantage, 1.0).expect("finite"),
        ));
        let orchestrator = FetchOrchestrator::new(vec![Arc::new(statements)]);

        let failure = orchestrator.fetch(&symbol()).await.expect_err("wrong kind");

        let FetchFailure::CriticalSource { outcome, .. } = failure;
        let SourceOutcome::Failed(error) = outcome else {
            panic!("failed outcome expected");
        };
        assert_eq!(error.code(), "source.malformed");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_growth_source_times_out_without_failing() {
        let mut slow = Canned::growth(ProviderId::Yahoo, Ok(20.0));
        slow.delay = Duration::from_secs(60);
        let orchestrator = FetchOrchestrator::new(vec![
            Arc::new(Canned::statements()),
            Arc::new(slow),
        ])
        .with_deadline(Duration::from_secs(5));

        let success = orchestrator.fetch(&symbol()).await.expect("degraded success");

        assert_eq!(success.report.phases[3], FetchPhase::TimedOut);
        assert_eq!(
            success.report.outcome(ProviderId::Yahoo, FragmentKind::GrowthEstimate),
            Some(&SourceOutcome::TimedOut)
        );
        assert_eq!(success.fundamentals.five_year_growth_rate, Some(9.0));
    }
}
