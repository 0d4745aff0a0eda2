use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use gridwatch::config::{
    AlertingConfig, AppConfig, BrowserConfig, DatabaseConfig, MetricsConfig, OrchestratorConfig,
    ServerConfig,
};
use gridwatch::extractors::Extractor;
use gridwatch::models::{generate_id, NewPriceRecord, PriceConvention, RawOffer};
use gridwatch::orchestrator::JobContext;
use gridwatch::web::{create_router, AppState};
use gridwatch::{db, ledger, AppError};

fn test_app_config(db_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout: 5,
        },
        database: DatabaseConfig {
            url: db_url.to_string(),
            max_connections: 5,
            acquire_timeout: 10,
        },
        browser: BrowserConfig {
            remote_ws_url: None,
            chrome_path: None,
            connect_attempts: 2,
            retry_base_delay_ms: 50,
            fallback_to_local: true,
            user_agent: "GridwatchTest/0.1".to_string(),
            navigation_timeout: 5,
        },
        alerting: AlertingConfig {
            discord_webhook_url: None,
            slack_webhook_url: None,
        },
        orchestrator: OrchestratorConfig {
            job_timeout_secs: 5,
            max_concurrent_jobs: 4,
        },
        metrics: MetricsConfig {
            enabled: false,
            port: 9001,
        },
        api_keys: HashMap::new(),
    }
}

async fn setup() -> (TempDir, SqlitePool, AppState) {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("gridwatch-test.db");
    let db_url = format!("sqlite://{}", db_path.display());

    let config = test_app_config(&db_url);
    let pool = db::init_pool(&config.database).await.expect("pool");
    let state = AppState {
        ctx: JobContext::new(pool.clone(), config),
    };
    (dir, pool, state)
}

async fn seed_provider(pool: &SqlitePool, name: &str, slug: &str) -> String {
    let id = generate_id();
    sqlx::query("INSERT INTO providers (id, name, slug) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(slug)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_gpu(pool: &SqlitePool, name: &str, vram: u32) -> String {
    let id = generate_id();
    sqlx::query(
        "INSERT INTO gpu_models (id, name, manufacturer, vram_gb, aliases) VALUES (?, ?, 'NVIDIA', ?, '[]')",
    )
    .bind(&id)
    .bind(name)
    .bind(vram as i64)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Browserless extractor pointed at a local mock server, producing
/// canned offers or a canned extraction failure.
struct StubSource {
    slug: &'static str,
    url: String,
    fail: bool,
}

impl Extractor for StubSource {
    fn provider_slug(&self) -> &str {
        self.slug
    }
    fn source_name(&self) -> &str {
        "stub"
    }
    fn source_url(&self) -> &str {
        &self.url
    }
    fn price_convention(&self) -> PriceConvention {
        PriceConvention::PerGpu
    }
    fn needs_browser(&self) -> bool {
        false
    }
    fn extract(&self, _payload: &str) -> gridwatch::Result<Vec<RawOffer>> {
        if self.fail {
            Err(AppError::Extraction("expected markup not found".to_string()))
        } else {
            Ok(vec![RawOffer::new(
                "stub",
                self.slug,
                "H100",
                2.5,
                PriceConvention::PerGpu,
                1,
            )])
        }
    }
}

fn stub_source(slug: &'static str, url: &str, fail: bool) -> Arc<dyn Extractor> {
    Arc::new(StubSource {
        slug,
        url: url.to_string(),
        fail,
    })
}

async fn mock_payload_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;
    server
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (_dir, _pool, state) = setup().await;
    let router = create_router(state);

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn ingest_unknown_provider_returns_404() {
    let (_dir, _pool, state) = setup().await;
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::post("/api/v1/ingest/not-a-provider")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn ingest_with_missing_credential_is_fatal_500() {
    let (_dir, pool, state) = setup().await;
    seed_provider(&pool, "RunPod", "runpod").await;
    let router = create_router(state);

    // The runpod extractor hard-requires an API key; none is configured.
    let response = router
        .oneshot(
            Request::post("/api/v1/ingest/runpod")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("api_keys.runpod"));
}

#[tokio::test]
async fn trend_window_is_clamped_to_90_days() {
    let (_dir, pool, state) = setup().await;
    let provider_id = seed_provider(&pool, "Lambda", "lambda").await;
    let gpu_id = seed_gpu(&pool, "H100", 80).await;

    ledger::append(
        &pool,
        &NewPriceRecord {
            provider_id,
            gpu_model_id: gpu_id.clone(),
            price_per_hour: 2.49,
            gpu_count: 1,
            source_name: "test".to_string(),
            source_url: "https://lambda.test/pricing".to_string(),
        },
    )
    .await
    .unwrap();

    let router = create_router(state);
    let response = router
        .oneshot(
            Request::get(format!(
                "/api/v1/trends?provider=lambda&gpu_model_id={}&days=400",
                gpu_id
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    // requesting 400 days yields exactly 90
    assert_eq!(json["days"], 90);
    assert_eq!(json["points"].as_array().unwrap().len(), 1);
    assert_eq!(json["points"][0]["samples"], 1);
}

#[tokio::test]
async fn trend_for_unknown_provider_returns_404() {
    let (_dir, _pool, state) = setup().await;
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::get("/api/v1/trends?provider=ghost&days=7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_balance_after_browserless_runs() {
    let (_dir, pool, state) = setup().await;
    seed_provider(&pool, "RunPod", "runpod").await;

    // A browserless job acquires no session; the pairing invariant holds
    // trivially and the counters stay balanced.
    let extractor = state.ctx.extractor_by_slug("runpod").unwrap();
    let _report = gridwatch::orchestrator::run_provider_job(&state.ctx, extractor).await;

    assert_eq!(
        state.ctx.sessions.acquired_count(),
        state.ctx.sessions.released_count()
    );
}

#[tokio::test]
async fn ingest_all_maps_mixed_outcomes_to_207() {
    let (_dir, pool, state) = setup().await;
    seed_provider(&pool, "Alpha", "alpha").await;
    seed_provider(&pool, "Beta", "beta").await;
    seed_gpu(&pool, "H100", 80).await;

    let server = mock_payload_server().await;
    // 2 of 3 jobs fail: one extraction failure, one unknown provider.
    let extractors = vec![
        stub_source("alpha", &server.uri(), false),
        stub_source("beta", &server.uri(), true),
        stub_source("ghost", &server.uri(), false),
    ];
    let state = AppState {
        ctx: state.ctx.with_extractors(extractors),
    };

    let router = create_router(state);
    let response = router
        .oneshot(
            Request::post("/api/v1/ingest-all")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);

    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("2 of 3"));

    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    let failed = results.iter().filter(|r| r["status"] == "error").count();
    assert_eq!(failed, 2);

    let ok = results.iter().find(|r| r["status"] == "success").unwrap();
    assert_eq!(ok["route"], "/api/v1/ingest/alpha");
    assert_eq!(ok["statusCode"], 200);
}

#[tokio::test]
async fn ingest_all_with_no_failures_is_200() {
    let (_dir, pool, state) = setup().await;
    seed_provider(&pool, "Alpha", "alpha").await;
    seed_gpu(&pool, "H100", 80).await;

    let server = mock_payload_server().await;
    let state = AppState {
        ctx: state
            .ctx
            .with_extractors(vec![stub_source("alpha", &server.uri(), false)]),
    };

    let router = create_router(state);
    let response = router
        .oneshot(
            Request::post("/api/v1/ingest-all")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("all 1"));
    assert_eq!(json["results"][0]["status"], "success");
}

#[tokio::test]
async fn providers_endpoint_lists_seeded_rows() {
    let (_dir, pool, state) = setup().await;
    seed_provider(&pool, "Lambda", "lambda").await;
    seed_provider(&pool, "CoreWeave", "coreweave").await;

    let router = create_router(state);
    let response = router
        .oneshot(Request::get("/api/v1/providers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["slug"], "coreweave");
    assert_eq!(rows[1]["slug"], "lambda");
}
