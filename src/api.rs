use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, Uri},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::{CredentialGate, CredentialRejection, Principal};
use crate::config::ServiceConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    Metrics, ACCEPTED_TOTAL, INGEST_DURATION_MS, LISTED_TOTAL, REJECTED_TOTAL,
    STORE_FAILURES_TOTAL,
};
use crate::model::{ResponseId, StoredResponse};
use crate::store::{InMemoryStore, ResponseStore};
use crate::validate::{self, SubmissionLimits};

pub const RESPONSES_PATH: &str = "/api/nps-responses";
pub const MSG_SAVED: &str = "Response saved successfully";

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<CredentialGate>,
    pub store: Arc<dyn ResponseStore>,
    pub limits: SubmissionLimits,
    pub list_limit: usize,
}

impl AppState {
    pub fn new(gate: CredentialGate, store: Arc<dyn ResponseStore>) -> Self {
        Self {
            gate: Arc::new(gate),
            store,
            limits: SubmissionLimits::default(),
            list_limit: 100,
        }
    }

    pub fn from_config(cfg: &ServiceConfig) -> Self {
        Self {
            gate: Arc::new(CredentialGate::from_config(&cfg.auth)),
            store: Arc::new(InMemoryStore::with_limits(
                cfg.store.max_per_account,
                cfg.store.max_accounts,
            )),
            limits: cfg.submission,
            list_limit: cfg.store.list_limit,
        }
    }

    pub fn with_limits(mut self, limits: SubmissionLimits) -> Self {
        self.limits = limits;
        self
    }

    async fn authorize(&self, headers: &HeaderMap) -> ApiResult<Principal> {
        let header = match headers.get(AUTHORIZATION).map(|v| v.to_str()) {
            None => None,
            Some(Ok(v)) => Some(v),
            // Present but not visible ASCII: a credential was sent, just not a usable one.
            Some(Err(_)) => {
                let rejection = CredentialRejection::MalformedCredential;
                tracing::info!(target: "auth", reason = rejection.as_label(), "credential rejected");
                return Err(ApiError::from(rejection));
            }
        };
        self.gate.authorize(header).await.map_err(|rejection| {
            tracing::info!(
                target: "auth",
                reason = rejection.as_label(),
                "credential rejected"
            );
            ApiError::from(rejection)
        })
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(RESPONSES_PATH, get(list_responses).post(create_response))
}

/// Ingestion routes only, with CORS open to any origin.
pub fn router(state: AppState) -> Router {
    routes().layer(CorsLayer::permissive()).with_state(state)
}

/// Full application: ingestion routes plus body limit, static widget assets,
/// optional `/metrics` and request tracing.
pub fn create_router(state: AppState, cfg: &ServiceConfig) -> anyhow::Result<Router> {
    let mut app = routes()
        .layer(DefaultBodyLimit::max(cfg.http.max_body_bytes))
        .with_state(state);

    if let Some(dir) = &cfg.http.asset_dir {
        app = app.nest_service("/assets", ServeDir::new(dir));
    }
    if cfg.http.metrics_enabled {
        app = app.merge(Metrics::init()?.router::<()>());
    }

    Ok(app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub success: bool,
    pub id: ResponseId,
    pub message: String,
}

async fn create_response(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<CreatedResponse>> {
    let started = Instant::now();
    let result = ingest(&state, &headers, &body).await;
    histogram!(INGEST_DURATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);

    match result {
        Ok(id) => {
            counter!(ACCEPTED_TOTAL).increment(1);
            Ok(Json(CreatedResponse {
                success: true,
                id,
                message: MSG_SAVED.to_string(),
            }))
        }
        Err(e) => {
            counter!(REJECTED_TOTAL, "reason" => e.reason()).increment(1);
            Err(e)
        }
    }
}

/// Gate, then validate, then store. Order matters: unauthenticated callers
/// learn nothing about payload rules.
async fn ingest(state: &AppState, headers: &HeaderMap, body: &[u8]) -> ApiResult<ResponseId> {
    let principal = state.authorize(headers).await?;

    let raw: serde_json::Value = serde_json::from_slice(body)?;
    let submission = validate::validate(&raw, &state.limits, Utc::now()).map_err(|e| {
        tracing::info!(
            target: "ingest",
            key = %principal.key_fingerprint,
            violations = e.violations.len(),
            "payload rejected"
        );
        e
    })?;

    let score = submission.score();
    let has_feedback = submission.feedback().is_some();
    let agent = submission.client_agent().unwrap_or_default().to_string();
    let url = submission.source_url().unwrap_or_default().to_string();

    let id = state
        .store
        .insert(&principal.account, submission)
        .await
        .map_err(|e| {
            counter!(STORE_FAILURES_TOTAL).increment(1);
            tracing::error!(target: "ingest", error = %e, "failed to save NPS response");
            ApiError::StorageWrite(e)
        })?;

    tracing::info!(
        target: "ingest",
        %id,
        key = %principal.key_fingerprint,
        account = %principal.account,
        %score,
        category = ?score.category(),
        has_feedback,
        %url,
        user_agent = %agent,
        "NPS response received"
    );
    Ok(id)
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseRow {
    pub id: ResponseId,
    pub score: u8,
    pub feedback: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub url: Option<String>,
}

impl From<StoredResponse> for ResponseRow {
    fn from(r: StoredResponse) -> Self {
        let s = &r.submission;
        Self {
            id: r.id,
            score: s.score().get(),
            feedback: s.feedback().map(str::to_string),
            timestamp: s.timestamp(),
            url: s.source_url().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseList {
    pub responses: Vec<ResponseRow>,
}

fn count_rejection(e: ApiError) -> ApiError {
    counter!(REJECTED_TOTAL, "reason" => e.reason()).increment(1);
    e
}

async fn list_responses(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> ApiResult<Json<ResponseList>> {
    // Query is parsed after the gate so unauthenticated callers always get 401.
    let principal = state.authorize(&headers).await.map_err(count_rejection)?;
    let Query(q) = Query::<ListQuery>::try_from_uri(&uri)
        .map_err(|e| count_rejection(ApiError::InvalidQuery(e.body_text())))?;

    let limit = q.limit.unwrap_or(state.list_limit).min(state.list_limit);
    let rows = state
        .store
        .list(&principal.account, limit)
        .await
        .map_err(|e| {
            counter!(STORE_FAILURES_TOTAL).increment(1);
            tracing::error!(target: "ingest", error = %e, "failed to load NPS responses");
            ApiError::StorageRead(e)
        })?;

    counter!(LISTED_TOTAL).increment(rows.len() as u64);
    Ok(Json(ResponseList {
        responses: rows.into_iter().map(ResponseRow::from).collect(),
    }))
}
