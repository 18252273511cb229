use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Result;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ConnectInfo, FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    cache::{self, TtlCache},
    config::Settings,
    error::ApiError,
    export::{self, ExportFormat},
    ratelimit::{FixedWindowLimiter, RateLimitDecision},
    resolver::Resolve,
    scanner::ScanService,
    store::ScanStore,
    types::{HistoryEntry, ScanPage, ScanRecord, ScanStatus},
    validate::{self, RawScanOptions},
};

const ESTIMATED_TIME: &str = "2-5 minutes";

/// Process-wide services shared by every request.
#[derive(Clone, Debug)]
pub struct AppState {
    settings: Arc<Settings>,
    store: Arc<ScanStore>,
    cache: Arc<TtlCache<ScanRecord>>,
    limiter: Arc<FixedWindowLimiter>,
    scans: ScanService,
}

impl AppState {
    pub fn new(settings: Settings, resolver: Arc<dyn Resolve>) -> Self {
        let store = Arc::new(ScanStore::new());
        let scans = ScanService::new(store.clone(), resolver, settings.scan_deadline());
        let limiter = Arc::new(FixedWindowLimiter::new(
            settings.rate_limit_max,
            settings.rate_limit_window(),
        ));
        Self {
            settings: Arc::new(settings),
            store,
            cache: Arc::new(TtlCache::new()),
            limiter,
            scans,
        }
    }

    pub fn scans(&self) -> &ScanService {
        &self.scans
    }

    async fn check_rate(&self, client: &str) -> Result<RateLimitDecision, ApiError> {
        let decision = self.limiter.consume(client).await;
        if decision.is_allowed() {
            Ok(decision)
        } else {
            warn!(client = %client, retry_after_ms = decision.ms_before_next, "rate limit exceeded");
            Err(ApiError::RateLimited {
                limit: self.limiter.max_requests(),
                decision,
            })
        }
    }

    /// Cached detail response, falling back to the store. Completed scans are cached.
    async fn lookup(&self, scan_id: &str) -> Result<ScanRecord, ApiError> {
        let key = cache::scan_key(scan_id);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }
        let record = self.store.get(scan_id).await.ok_or(ApiError::NotFound)?;
        if record.status == ScanStatus::Completed && !self.cache_completed(key, &record).await {
            return Err(ApiError::NotFound);
        }
        Ok(record)
    }

    /// Cache `record`, then confirm it was not deleted meanwhile. A delete that raced the
    /// write leaves no cache entry behind; returns `false` in that case.
    async fn cache_completed(&self, key: String, record: &ScanRecord) -> bool {
        self.cache
            .setex(key.clone(), self.settings.cache_ttl(), record.clone())
            .await;
        if self.store.get(&record.scan_id).await.is_some() {
            return true;
        }
        self.cache.del(&key).await;
        false
    }

    fn with_rate_headers(&self, mut resp: Response, decision: &RateLimitDecision) -> Response {
        let headers = resp.headers_mut();
        for (name, value) in decision.headers(self.limiter.max_requests()) {
            headers.insert(name, value);
        }
        resp
    }
}

/// Rate-limit key of the caller: first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the peer address, then `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientKey(client_key(&parts.headers, peer)))
    }
}

fn client_key(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub options: Option<RawScanOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanResponse {
    pub scan_id: String,
    pub message: String,
    pub domain: String,
    pub status: ScanStatus,
    pub estimated_time: String,
    pub monitor_url: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchScanRequest {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub options: Option<RawScanOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchScanItem {
    pub domain: String,
    pub scan_id: String,
    pub status: ScanStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// API routes under `/api`, with the static UI as fallback.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan).get(list_scans))
        .route("/scan/batch", post(post_batch))
        .route("/scan/{scan_id}", get(get_scan).delete(delete_scan))
        .route("/scan/{scan_id}/export", get(export_scan))
        .route("/history", get(get_history))
        .route("/health", get(get_health))
        .with_state(state.clone());

    let static_svc = ServeDir::new(&state.settings.ui_dir).append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl+C / SIGTERM, then give in-flight scans the configured grace period.
pub async fn serve(state: AppState) -> Result<()> {
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(&state.settings.bind).await?;
    info!("Serving UI on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let drained = state.scans.shutdown(state.settings.shutdown_grace()).await;
    info!(drained, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

async fn post_scan(
    State(app): State<AppState>,
    ClientKey(client): ClientKey,
    body: Result<Json<StartScanRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let decision = app.check_rate(&client).await?;

    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let domain = validate::normalize_domain(&req.domain)?;
    let options = validate::validate_options(req.options.unwrap_or_default())?;

    let record = app.scans.start(domain, options).await?;
    let out = StartScanResponse {
        monitor_url: format!("/api/scan/{}", record.scan_id),
        scan_id: record.scan_id,
        message: "Scan started successfully".to_string(),
        domain: record.domain,
        status: record.status,
        estimated_time: ESTIMATED_TIME.to_string(),
    };
    Ok(app.with_rate_headers(Json(out).into_response(), &decision))
}

async fn post_batch(
    State(app): State<AppState>,
    ClientKey(client): ClientKey,
    body: Result<Json<BatchScanRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let decision = app.check_rate(&client).await?;

    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let domains = validate::validate_batch(&req.domains)?;
    let options = validate::validate_options(req.options.unwrap_or_default())?;

    let mut scans = Vec::with_capacity(domains.len());
    for domain in domains {
        let record = app.scans.start(domain, options.clone()).await?;
        scans.push(BatchScanItem {
            domain: record.domain,
            scan_id: record.scan_id,
            status: record.status,
        });
    }
    info!(count = scans.len(), "batch scan started");
    Ok(app.with_rate_headers(Json(json!({ "scans": scans })).into_response(), &decision))
}

async fn list_scans(
    State(app): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ScanPage>, ApiError> {
    let Query(p) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = p.limit.unwrap_or(50).clamp(1, 100);
    let page = p.page.unwrap_or(1).max(1);
    Ok(Json(app.store.list(page, limit).await))
}

async fn get_scan(
    State(app): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<ScanRecord>, ApiError> {
    app.lookup(&scan_id).await.map(Json)
}

async fn delete_scan(
    State(app): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.store.delete(&scan_id).await?;
    app.cache.del(&cache::scan_key(&scan_id)).await;
    info!(scan_id = %scan_id, "scan deleted");
    Ok(Json(json!({ "message": "Scan deleted successfully" })))
}

async fn export_scan(
    State(app): State<AppState>,
    Path(scan_id): Path<String>,
    params: Result<Query<ExportParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(p) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let format = match p.format.as_deref() {
        Some(f) => f.parse::<ExportFormat>()?,
        None => ExportFormat::default(),
    };
    let record = app.lookup(&scan_id).await?;
    let body = export::render(&record, format)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::file_name(&record, format)
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn get_history(
    State(app): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(p) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = p.limit.unwrap_or(10).clamp(1, 100);
    let history: Vec<HistoryEntry> = app.store.history(limit).await;
    Ok(Json(json!({ "history": history })))
}

async fn get_health(State(app): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "inFlightScans": app.scans.in_flight(),
    }))
}
