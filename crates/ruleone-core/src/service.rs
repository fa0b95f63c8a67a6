//! Aggregation façade: identifier in, [`MetricsRecord`] out.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::{
    AlphaVantageSource, Upstream, YahooGrowthSource, YahooProfileSource, YahooSession,
    YahooSymbolSearch, ZacksGrowthSource,
};
use crate::cache::CacheStore;
use crate::config::Settings;
use crate::data_source::{FundamentalsSource, HealthStatus};
use crate::http_client::{HttpClient, HttpError, ReqwestHttpClient};
use crate::orchestrator::{FetchFailure, FetchOrchestrator};
use crate::provider_policy::ProviderPolicy;
use crate::resolver::{IdentifierResolver, Resolution};
use crate::retry::RetryConfig;
use crate::valuation::build_metrics;
use crate::{
    FragmentKind, IdentifierKind, MetricsRecord, ProviderId, Symbol, ValidationError,
};

/// Shared process resources, built once at startup.
#[derive(Clone)]
pub struct ServiceContext {
    pub http: Arc<dyn HttpClient>,
    pub cache: CacheStore<MetricsRecord>,
}

impl ServiceContext {
    pub fn new(http: Arc<dyn HttpClient>, cache: CacheStore<MetricsRecord>) -> Self {
        Self { http, cache }
    }

    /// Pooled reqwest transport with the configured user agents and cache TTL.
    pub fn from_settings(settings: &Settings) -> Result<Self, HttpError> {
        let http = ReqwestHttpClient::new(settings.user_agents.clone())?;
        Ok(Self::new(Arc::new(http), CacheStore::new(settings.cache_ttl)))
    }
}

#[derive(Debug, Clone, Error)]
pub enum NotFoundReason {
    #[error("identifier could not be resolved to a ticker")]
    Resolution,
    #[error("resolved symbol is invalid: {0}")]
    InvalidSymbol(ValidationError),
    #[error(transparent)]
    Fetch(FetchFailure),
}

/// No usable data for the requested identifier.
#[derive(Debug, Clone, Error)]
#[error("data unavailable for this identifier: '{identifier}'")]
pub struct NotFound {
    pub identifier: String,
    #[source]
    pub reason: NotFoundReason,
}

/// Health snapshot of one registered source, for the `sources` command.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub provider: ProviderId,
    pub kind: FragmentKind,
    pub critical: bool,
    pub status: &'static str,
    #[serde(skip)]
    pub health: HealthStatus,
}

pub struct MetricsService {
    resolver: IdentifierResolver,
    orchestrator: FetchOrchestrator,
    cache: CacheStore<MetricsRecord>,
}

impl MetricsService {
    pub fn new(
        resolver: IdentifierResolver,
        orchestrator: FetchOrchestrator,
        cache: CacheStore<MetricsRecord>,
    ) -> Self {
        Self {
            resolver,
            orchestrator,
            cache,
        }
    }

    pub fn builder(context: ServiceContext) -> MetricsServiceBuilder {
        MetricsServiceBuilder::new(context)
    }

    pub async fn resolve(&self, identifier: &str) -> Resolution {
        self.resolver.resolve(identifier).await
    }

    pub async fn fetch_company_metrics(&self, identifier: &str) -> Result<MetricsRecord, NotFound> {
        let resolution = self.resolver.resolve(identifier).await;
        let not_found = |reason| NotFound {
            identifier: identifier.trim().to_owned(),
            reason,
        };

        if resolution.kind == IdentifierKind::Unknown || !resolution.succeeded {
            warn!(
                identifier = %resolution.input,
                kind = %resolution.kind,
                "identifier not resolved"
            );
            return Err(not_found(NotFoundReason::Resolution));
        }

        let symbol = Symbol::parse(&resolution.symbol)
            .map_err(|error| not_found(NotFoundReason::InvalidSymbol(error)))?;

        if let Some(cached) = self.cache.get(symbol.as_str()).await {
            debug!(%symbol, "metrics served from cache");
            return Ok(cached.relabeled(&resolution.input, resolution.kind, resolution.succeeded));
        }

        let success = self
            .orchestrator
            .fetch(&symbol)
            .await
            .map_err(|failure| not_found(NotFoundReason::Fetch(failure)))?;

        let record = build_metrics(
            &success.fundamentals,
            &resolution,
            success.report.degraded_sources(),
        );
        self.cache.put(symbol.as_str(), record.clone()).await;
        info!(
            %symbol,
            identifier = %resolution.input,
            latency_ms = success.report.latency_ms,
            "metrics computed"
        );
        Ok(record)
    }

    pub async fn source_statuses(&self) -> Vec<SourceStatus> {
        let mut statuses = Vec::with_capacity(self.orchestrator.sources().len());
        for source in self.orchestrator.sources() {
            let health = source.health().await;
            statuses.push(SourceStatus {
                provider: source.id(),
                kind: source.kind(),
                critical: source.critical(),
                status: health.label(),
                health,
            });
        }
        statuses
    }
}

/// Wires the production sources from [`Settings`] over a [`ServiceContext`].
pub struct MetricsServiceBuilder {
    context: ServiceContext,
    settings: Settings,
}

impl MetricsServiceBuilder {
    pub fn new(context: ServiceContext) -> Self {
        Self {
            context,
            settings: Settings::default(),
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> MetricsService {
        let Self { context, settings } = self;
        let retry = RetryConfig::exponential(settings.http_max_retries);
        let timeout_ms = u64::try_from(settings.http_timeout.as_millis()).unwrap_or(u64::MAX);
        let upstream = |provider| {
            Upstream::new(provider, Arc::clone(&context.http), retry.clone())
                .with_timeout_ms(timeout_ms)
        };

        // Yahoo sources share one breaker and one crumb.
        let yahoo = upstream(ProviderId::Yahoo);
        let session = Arc::new(YahooSession::default());

        let mut sources: Vec<Arc<dyn FundamentalsSource>> = vec![
            Arc::new(YahooProfileSource::new(yahoo.clone(), Arc::clone(&session))),
            Arc::new(AlphaVantageSource::new(
                upstream(ProviderId::Alphavantage),
                settings.alphavantage_api_key.clone(),
                &ProviderPolicy::alphavantage(settings.alphavantage_quota_per_minute)
                    .with_request_timeout(settings.http_timeout),
            )),
        ];
        for provider in &settings.growth_sources {
            match provider {
                ProviderId::Yahoo => sources.push(Arc::new(YahooGrowthSource::new(
                    yahoo.clone(),
                    Arc::clone(&session),
                ))),
                ProviderId::Zacks => {
                    sources.push(Arc::new(ZacksGrowthSource::new(upstream(ProviderId::Zacks))))
                }
                ProviderId::Alphavantage => {
                    warn!("alphavantage has no growth estimate source; ignored in growth order")
                }
            }
        }

        let orchestrator = FetchOrchestrator::new(sources)
            .with_max_concurrent_requests(settings.max_concurrent_requests)
            .with_deadline(settings.request_deadline)
            .with_growth_order(settings.growth_sources.clone());
        let resolver = IdentifierResolver::new(Arc::new(YahooSymbolSearch::new(yahoo)));

        MetricsService::new(resolver, orchestrator, context.cache)
    }
}
