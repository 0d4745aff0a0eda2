//! Per-provider ingestion jobs and the fan-out trigger.
//!
//! A job sequences: credential check, provider/catalog load, payload
//! fetch (browser session or direct API call), extraction, matching,
//! price computation, ledger append, alerting. Every failure is caught
//! at the job boundary and folded into the run report; a job never
//! panics or errors past itself, and never affects sibling jobs.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::alerts::{AlertEvent, AlertFanout};
use crate::catalog;
use crate::config::AppConfig;
use crate::extractors::{registry, Extractor};
use crate::ledger;
use crate::matching::match_offer;
use crate::models::{NewPriceRecord, RunReport};
use crate::session::{EnginePreference, SessionManager};
use crate::utils::error::AppError;
use crate::Result;

/// Shared, read-only dependencies for ingestion jobs. Jobs share no
/// mutable state; each loads its own catalog snapshot.
#[derive(Clone)]
pub struct JobContext {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionManager>,
    pub alerts: Arc<AlertFanout>,
    pub http: reqwest::Client,
    /// The extractor set the fan-out runs over. Defaults to the built-in
    /// registry; tests swap in their own.
    pub extractors: Vec<Arc<dyn Extractor>>,
}

impl JobContext {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let sessions = Arc::new(SessionManager::new(config.browser.clone()));
        let alerts = Arc::new(AlertFanout::from_config(&config.alerting));
        Self {
            pool,
            config: Arc::new(config),
            sessions,
            alerts,
            http: reqwest::Client::new(),
            extractors: registry(),
        }
    }

    pub fn with_extractors(mut self, extractors: Vec<Arc<dyn Extractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn extractor_by_slug(&self, slug: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .iter()
            .find(|e| e.provider_slug() == slug)
            .cloned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// One entry of the fan-out trigger's aggregate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub route: String,
    pub status: OutcomeStatus,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run one provider's ingestion job end to end. Never returns an error:
/// failures land in the report.
pub async fn run_provider_job(ctx: &JobContext, extractor: Arc<dyn Extractor>) -> RunReport {
    let slug = extractor.provider_slug().to_string();
    let mut report = RunReport::started(&slug);
    counter!("gridwatch_ingest_runs_total", "provider" => slug.clone()).increment(1);

    match run_steps(ctx, &extractor, &mut report).await {
        Ok(()) => {
            info!(
                provider = %slug,
                matched = report.matched_count(),
                unmatched = report.unmatched_count(),
                errors = report.errors.len(),
                "ingestion run finished"
            );
        }
        Err(e) => {
            warn!(provider = %slug, error = %e, "ingestion run failed");
            report.record_error(e.to_string());
        }
    }

    counter!("gridwatch_offers_matched_total", "provider" => slug.clone())
        .increment(report.matched_count() as u64);
    counter!("gridwatch_offers_unmatched_total", "provider" => slug.clone())
        .increment(report.unmatched_count() as u64);

    let report = report.finish();
    ctx.alerts
        .notify_all(&AlertEvent::run_summary(&report))
        .await;
    report
}

async fn run_steps(
    ctx: &JobContext,
    extractor: &Arc<dyn Extractor>,
    report: &mut RunReport,
) -> Result<()> {
    let slug = extractor.provider_slug();

    // Required credential: absence is fatal for this job only.
    if let Some(credential) = extractor.required_credential() {
        if !ctx.config.api_keys.contains_key(credential) {
            return Err(AppError::Configuration {
                field: format!("api_keys.{}", credential),
            });
        }
    }

    let provider = catalog::provider_by_slug(&ctx.pool, slug)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("provider '{}'", slug),
        })?;

    // Fresh snapshot per run; the catalog can change between runs.
    let gpu_catalog = catalog::load_catalog(&ctx.pool).await?;

    let payload = fetch_payload(ctx, extractor).await;
    let payload = match payload {
        Ok(p) => p,
        Err(e) => {
            if matches!(e, AppError::SessionAcquisition(_) | AppError::Configuration { .. }) {
                ctx.alerts
                    .notify_all(&AlertEvent::fallback_route_missing(slug, e.to_string()))
                    .await;
            } else {
                ctx.alerts
                    .notify_all(&AlertEvent::extraction_failure(
                        slug,
                        extractor.source_url(),
                        e.to_string(),
                    ))
                    .await;
            }
            return Err(e);
        }
    };

    let offers = match extractor.extract(&payload) {
        Ok(offers) => offers,
        Err(e) => {
            ctx.alerts
                .notify_all(&AlertEvent::extraction_failure(
                    slug,
                    extractor.source_url(),
                    e.to_string(),
                ))
                .await;
            return Err(e);
        }
    };

    // Exactly one match result per raw offer.
    let mut records = Vec::new();
    for offer in &offers {
        let result = match_offer(offer, &gpu_catalog);
        match &result.matched_model {
            Some(model) => {
                let resolved = &result.raw_offer;
                match ledger::compute_per_gpu_price(
                    resolved.price,
                    resolved.price_convention,
                    resolved.gpu_count,
                ) {
                    Some(price_per_hour) => records.push(NewPriceRecord {
                        provider_id: provider.id.clone(),
                        gpu_model_id: model.id.clone(),
                        price_per_hour,
                        gpu_count: resolved.gpu_count.max(1),
                        source_name: resolved.source_name.clone(),
                        source_url: extractor.source_url().to_string(),
                    }),
                    None => {
                        // Extraction defect, logged, never inserted.
                        report.record_error(format!(
                            "rejected non-positive price {} for '{}'",
                            resolved.price, resolved.raw_gpu_label
                        ));
                    }
                }
                report.matched.push(result);
            }
            None => report.unmatched.push(result.raw_offer),
        }
    }

    let (inserted, errors) = ledger::append_all(&ctx.pool, &records).await;
    counter!("gridwatch_records_inserted_total", "provider" => slug.to_string())
        .increment(inserted as u64);
    for error in errors {
        report.record_error(error.to_string());
    }

    Ok(())
}

/// Fetch the extractor's raw payload: a rendered page through an
/// automation session, or a direct API call for browserless sources.
async fn fetch_payload(ctx: &JobContext, extractor: &Arc<dyn Extractor>) -> Result<String> {
    if extractor.needs_browser() {
        // The guard comes straight out of acquire, so a timeout landing
        // on any later await still releases through the guard's drop.
        let mut guard = ctx.sessions.acquire(EnginePreference::Remote).await?;
        let result = match guard.session() {
            Some(session) => {
                ctx.sessions
                    .fetch_rendered(session, extractor.source_url(), extractor.wait_selector())
                    .await
            }
            None => Err(AppError::Internal("session released before fetch".to_string())),
        };
        guard.release();
        result
    } else {
        let mut request = ctx.http.get(extractor.source_url());
        if let Some(credential) = extractor.required_credential() {
            if let Some(key) = ctx.config.api_keys.get(credential) {
                request = request.bearer_auth(key);
            }
        }
        let response = request
            .timeout(Duration::from_secs(ctx.config.server.request_timeout))
            .send()
            .await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Trigger every registered provider job concurrently, each under its
/// own hard timeout. One job's failure or hang never affects the others.
pub async fn run_all(ctx: &JobContext) -> Vec<JobOutcome> {
    let timeout = Duration::from_secs(ctx.config.orchestrator.job_timeout_secs);
    let max_concurrent = ctx.config.orchestrator.max_concurrent_jobs;

    let jobs: Vec<futures::future::BoxFuture<'static, JobOutcome>> = ctx
        .extractors
        .clone()
        .into_iter()
        .map(|extractor: Arc<dyn Extractor>| {
            let ctx = ctx.clone();
            async move {
                let route = format!("/api/v1/ingest/{}", extractor.provider_slug());
                match tokio::time::timeout(timeout, run_provider_job(&ctx, extractor)).await {
                    Ok(report) if report.is_fatal() => JobOutcome {
                        route,
                        status: OutcomeStatus::Error,
                        status_code: Some(500),
                        error: Some(report.errors.join("; ")),
                    },
                    Ok(_) => JobOutcome {
                        route,
                        status: OutcomeStatus::Success,
                        status_code: Some(200),
                        error: None,
                    },
                    // Timed-out jobs are recorded, not retried.
                    Err(_) => JobOutcome {
                        route,
                        status: OutcomeStatus::Error,
                        status_code: None,
                        error: Some(AppError::Timeout.to_string()),
                    },
                }
            }
            .boxed()
        })
        .collect();

    let mut outcomes: Vec<JobOutcome> = stream::iter(jobs)
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    outcomes.sort_by(|a, b| a.route.cmp(&b.route));
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{seed_gpu_model, seed_provider};
    use crate::config::test_config;
    use crate::db::test_pool;
    use crate::models::{PriceConvention, RawOffer};

    /// Extractor stub fed a canned payload, no fetch needed.
    struct StubExtractor {
        slug: &'static str,
        offers: Vec<RawOffer>,
        fail: bool,
    }

    impl StubExtractor {
        fn with_offers(slug: &'static str, offers: Vec<RawOffer>) -> Arc<dyn Extractor> {
            Arc::new(Self {
                slug,
                offers,
                fail: false,
            })
        }

        fn failing(slug: &'static str) -> Arc<dyn Extractor> {
            Arc::new(Self {
                slug,
                offers: Vec::new(),
                fail: true,
            })
        }
    }

    impl Extractor for StubExtractor {
        fn provider_slug(&self) -> &str {
            self.slug
        }
        fn source_name(&self) -> &str {
            "stub"
        }
        fn source_url(&self) -> &str {
            "https://stub.test/pricing"
        }
        fn price_convention(&self) -> PriceConvention {
            PriceConvention::Aggregate
        }
        fn needs_browser(&self) -> bool {
            false
        }
        fn extract(&self, _payload: &str) -> crate::Result<Vec<RawOffer>> {
            if self.fail {
                Err(AppError::Extraction("expected markup not found".to_string()))
            } else {
                Ok(self.offers.clone())
            }
        }
    }

    async fn context_with_stub_fetch() -> JobContext {
        // Stub sources never call the network in these tests because the
        // payload fetch happens against a local wiremock server.
        let pool = test_pool().await;
        JobContext::new(pool, test_config())
    }

    fn aggregate_offer(label: &str, price: f64, count: u32) -> RawOffer {
        RawOffer::new("stub", "stubprov", label, price, PriceConvention::Aggregate, count)
    }

    async fn ctx_with_provider() -> JobContext {
        let ctx = context_with_stub_fetch().await;
        seed_provider(&ctx.pool, "Stub Provider", "stubprov").await;
        seed_gpu_model(&ctx.pool, "H100", "NVIDIA", 80, &["H100 SXM5"]).await;
        ctx
    }

    /// Wraps an extractor so its payload fetch hits a given URL (a local
    /// wiremock server) instead of the real source.
    struct Proxied {
        inner: Arc<dyn Extractor>,
        url: String,
    }

    impl Extractor for Proxied {
        fn provider_slug(&self) -> &str {
            self.inner.provider_slug()
        }
        fn source_name(&self) -> &str {
            self.inner.source_name()
        }
        fn source_url(&self) -> &str {
            &self.url
        }
        fn price_convention(&self) -> PriceConvention {
            self.inner.price_convention()
        }
        fn needs_browser(&self) -> bool {
            false
        }
        fn required_credential(&self) -> Option<&str> {
            self.inner.required_credential()
        }
        fn extract(&self, payload: &str) -> crate::Result<Vec<RawOffer>> {
            self.inner.extract(payload)
        }
    }

    async fn mock_payload_server() -> wiremock::MockServer {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;
        server
    }

    fn proxied(extractor: Arc<dyn Extractor>, url: String) -> Arc<dyn Extractor> {
        Arc::new(Proxied {
            inner: extractor,
            url,
        })
    }

    /// Route stub fetches through a wiremock server returning an empty
    /// payload; extraction uses the stub's canned offers.
    async fn run_with_mock_fetch(ctx: &JobContext, extractor: Arc<dyn Extractor>) -> RunReport {
        let server = mock_payload_server().await;
        run_provider_job(ctx, proxied(extractor, server.uri())).await
    }

    #[tokio::test]
    async fn test_job_matches_prices_and_persists() {
        let ctx = ctx_with_provider().await;
        let extractor = StubExtractor::with_offers(
            "stubprov",
            vec![
                aggregate_offer("8x H100 SXM5", 23.92, 8),
                aggregate_offer("UNKNOWN-GPU-9000", 4.0, 1),
            ],
        );

        let report = run_with_mock_fetch(&ctx, extractor).await;

        assert_eq!(report.matched_count(), 1);
        assert_eq!(report.unmatched_count(), 1);
        assert!(report.errors.is_empty());
        assert!(!report.is_fatal());

        let rows: Vec<(f64, i64)> =
            sqlx::query_as("SELECT price_per_hour, gpu_count FROM price_records")
                .fetch_all(&ctx.pool)
                .await
                .unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].0 - 2.99).abs() < 1e-9);
        assert_eq!(rows[0].1, 8);
    }

    #[tokio::test]
    async fn test_unmatched_offer_inserts_nothing() {
        let ctx = ctx_with_provider().await;
        let extractor = StubExtractor::with_offers(
            "stubprov",
            vec![aggregate_offer("UNKNOWN-GPU-9000", 4.0, 1)],
        );

        let report = run_with_mock_fetch(&ctx, extractor).await;
        assert_eq!(report.unmatched_count(), 1);

        let count: (i64,) = sqlx::query_as("SELECT count(*) FROM price_records")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_non_positive_price_rejected_and_logged() {
        let ctx = ctx_with_provider().await;
        let extractor = StubExtractor::with_offers(
            "stubprov",
            vec![aggregate_offer("H100", -5.0, 1)],
        );

        let report = run_with_mock_fetch(&ctx, extractor).await;
        assert_eq!(report.matched_count(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("non-positive price"));

        let count: (i64,) = sqlx::query_as("SELECT count(*) FROM price_records")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_fatal_but_contained() {
        let ctx = ctx_with_provider().await;
        let report = run_with_mock_fetch(&ctx, StubExtractor::failing("stubprov")).await;
        assert!(report.is_fatal());
        assert!(report.errors[0].contains("expected markup not found"));
    }

    #[tokio::test]
    async fn test_missing_credential_is_fatal_config_error() {
        struct NeedsKey;
        impl Extractor for NeedsKey {
            fn provider_slug(&self) -> &str {
                "keyed"
            }
            fn source_name(&self) -> &str {
                "keyed"
            }
            fn source_url(&self) -> &str {
                "https://keyed.test"
            }
            fn price_convention(&self) -> PriceConvention {
                PriceConvention::PerGpu
            }
            fn needs_browser(&self) -> bool {
                false
            }
            fn required_credential(&self) -> Option<&str> {
                Some("keyed")
            }
            fn extract(&self, _payload: &str) -> crate::Result<Vec<RawOffer>> {
                Ok(Vec::new())
            }
        }

        let ctx = context_with_stub_fetch().await;
        let report = run_provider_job(&ctx, Arc::new(NeedsKey)).await;
        assert!(report.is_fatal());
        assert!(report.errors[0].contains("api_keys.keyed"));
    }

    #[tokio::test]
    async fn test_unknown_provider_slug_is_fatal() {
        let ctx = context_with_stub_fetch().await;
        let extractor = StubExtractor::with_offers("ghost", vec![]);
        let report = run_provider_job(&ctx, extractor).await;
        assert!(report.is_fatal());
        assert!(report.errors[0].contains("ghost"));
    }

    #[tokio::test]
    async fn test_run_all_aggregates_mixed_outcomes() {
        let ctx = ctx_with_provider().await;
        let server = mock_payload_server().await;

        // 2 of 3 jobs fail: one unknown provider, one extraction failure.
        let extractors: Vec<Arc<dyn Extractor>> = vec![
            proxied(StubExtractor::with_offers("ghost", vec![]), server.uri()),
            proxied(StubExtractor::failing("alpha"), server.uri()),
            proxied(
                StubExtractor::with_offers("stubprov", vec![aggregate_offer("2x H100", 6.0, 2)]),
                server.uri(),
            ),
        ];
        seed_provider(&ctx.pool, "Alpha", "alpha").await;

        let ctx = ctx.with_extractors(extractors);
        let outcomes = run_all(&ctx).await;
        assert_eq!(outcomes.len(), 3);

        let by_route = |route: &str| {
            outcomes
                .iter()
                .find(|o| o.route == format!("/api/v1/ingest/{}", route))
                .unwrap()
        };
        assert_eq!(by_route("ghost").status, OutcomeStatus::Error);
        assert_eq!(by_route("alpha").status, OutcomeStatus::Error);
        assert_eq!(by_route("stubprov").status, OutcomeStatus::Success);
        assert_eq!(by_route("stubprov").status_code, Some(200));
    }

    #[tokio::test]
    async fn test_run_all_times_out_hung_job() {
        // The payload server stalls longer than the 1-second job timeout.
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let pool = test_pool().await;
        let mut config = test_config();
        config.orchestrator.job_timeout_secs = 1;
        let ctx = JobContext::new(pool, config);
        seed_provider(&ctx.pool, "Hang", "hang").await;

        let extractor = proxied(StubExtractor::with_offers("hang", vec![]), server.uri());
        let ctx = ctx.with_extractors(vec![extractor]);
        let outcomes = run_all(&ctx).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::Error);
        assert_eq!(outcomes[0].error.as_deref(), Some("Timeout"));
    }
}
