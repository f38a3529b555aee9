use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::{ScanError, ValidationError},
    probe::Prober,
    scanner::Scanner,
    types::{PortProbeResult, ScanSession},
};

/// Shared handle to the scanner behind the HTTP routes.
pub struct AppState<P: Prober> {
    scanner: Arc<Scanner<P>>,
}

impl<P: Prober> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            scanner: self.scanner.clone(),
        }
    }
}

/// Raw request body. Ports are kept loose so out-of-range values reach validation
/// instead of failing deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[serde(default)]
    pub target_host: Option<String>,
    #[serde(default)]
    pub start_port: Option<PortValue>,
    #[serde(default)]
    pub end_port: Option<PortValue>,
}

/// A port as sent by clients: a JSON integer or a decimal string such as `"80"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    /// Negative or huge values collapse to 0, which the range check rejects.
    fn to_port(&self) -> std::result::Result<u32, ValidationError> {
        let wide = match self {
            PortValue::Number(n) => *n,
            PortValue::Text(t) => t
                .trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::Syntax(format!("port {t:?} is not an integer")))?,
        };
        Ok(u32::try_from(wide).unwrap_or(0))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub target_host: String,
    pub start_port: u16,
    pub end_port: u16,
    pub total_ports: u32,
    pub results: Vec<PortProbeResult>,
    pub scan_time: String,
}

/// Session plus its derived progress percentage.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: ScanSession,
    pub progress: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub session_id: Option<String>,
}

pub fn router<P: Prober>(scanner: Arc<Scanner<P>>) -> Router {
    let state = AppState { scanner };
    let api = Router::new()
        .route("/port-scan", post(post_scan::<P>))
        .route("/port-scan/status", get(get_status::<P>))
        .route("/port-scan/stats", get(get_stats::<P>))
        .with_state(state);

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

pub async fn spawn_server<P: Prober>(bind: &str, scanner: Arc<Scanner<P>>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "serving scan API");
    axum::serve(listener, router(scanner)).await?;
    Ok(())
}

async fn post_scan<P: Prober>(
    State(app): State<AppState<P>>,
    payload: std::result::Result<Json<ScanRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let (host, start, end) = match required_fields(req) {
        Ok(fields) => fields,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match app.scanner.scan(&host, start, end).await {
        Ok(report) => {
            let scan_time = report
                .scan_time
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default();
            let body = ScanResponse {
                success: true,
                session_id: report.session_id,
                target_host: report.target_host,
                start_port: report.start_port,
                end_port: report.end_port,
                total_ports: report.total_ports,
                results: report.results,
                scan_time,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => scan_error_response(&e),
    }
}

async fn get_status<P: Prober>(
    State(app): State<AppState<P>>,
    Query(q): Query<StatusQuery>,
) -> Response {
    let Some(raw) = q.session_id.filter(|s| !s.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Session ID required");
    };
    let Ok(id) = Uuid::parse_str(raw.trim()) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid session ID");
    };
    match app.scanner.session(id).await {
        Ok(session) => {
            let progress = session.progress_percent();
            (StatusCode::OK, Json(SessionResponse { session, progress })).into_response()
        }
        Err(e) => scan_error_response(&e),
    }
}

async fn get_stats<P: Prober>(State(app): State<AppState<P>>) -> Response {
    (StatusCode::OK, Json(app.scanner.stats().await)).into_response()
}

/// Missing fields are rejected here; range checks happen in the scanner.
fn required_fields(req: ScanRequest) -> std::result::Result<(String, u32, u32), ValidationError> {
    let host = req
        .target_host
        .ok_or(ValidationError::MissingField("targetHost"))?;
    let start = req
        .start_port
        .ok_or(ValidationError::MissingField("startPort"))?;
    let end = req.end_port.ok_or(ValidationError::MissingField("endPort"))?;
    Ok((host, start.to_port()?, end.to_port()?))
}

fn scan_error_response(e: &ScanError) -> Response {
    let status = match e {
        ScanError::Validation(_) => StatusCode::BAD_REQUEST,
        ScanError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            error!(error = %e, code = e.code(), "scan request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, &e.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
