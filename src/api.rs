// Carteira - HTTP access layer
// JSON API over the ledger, plus the page and the database download

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{Ledger, LedgerState, RecordedExpense};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    ledger: Arc<Ledger>,
    download_name: Arc<str>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>, download_name: &str) -> Self {
        Self {
            ledger,
            download_name: Arc::from(download_name),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}

/// Error response: `{"error": message}` with the matching status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found() -> Self {
        LedgerError::NotFound(0).into()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if !err.is_client_error() {
            tracing::error!(error = %err, "ledger operation failed");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Run a ledger operation off the async runtime
async fn with_ledger<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Ledger) -> LedgerResult<T> + Send + 'static,
{
    let ledger = Arc::clone(&state.ledger);

    let result = tokio::task::spawn_blocking(move || op(&ledger))
        .await
        .map_err(|e| LedgerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    Ok(result?)
}

// ============================================================================
// Request coercion
// ============================================================================

/// Anything that is not a JSON object counts as `{}`
fn parse_object(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Numbers and numeric strings are accepted; a missing field is 0.
/// Unparseable strings become NaN so the ledger rejects them.
fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

fn coerce_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/state - Balance and expenses, newest first
async fn get_state(State(state): State<AppState>) -> Result<Json<LedgerState>, ApiError> {
    let ledger_state = with_ledger(&state, |ledger| ledger.get_state()).await?;
    Ok(Json(ledger_state))
}

/// POST /api/saldo - {amount}
async fn add_funds(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let data = parse_object(&body);
    let amount = coerce_number(data.get("amount"));

    let balance = with_ledger(&state, move |ledger| ledger.add_funds(amount)).await?;
    Ok(Json(json!({ "balance": balance })))
}

/// POST /api/gasto - {categoria, valor}
async fn add_expense(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RecordedExpense>, ApiError> {
    let data = parse_object(&body);
    let category = coerce_text(data.get("categoria"));
    let value = coerce_number(data.get("valor"));

    let recorded = with_ledger(&state, move |ledger| ledger.add_expense(&category, value)).await?;
    Ok(Json(recorded))
}

/// DELETE /api/gasto/:id
async fn delete_expense(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: i64 = id.parse().map_err(|_| ApiError::not_found())?;

    let balance = with_ledger(&state, move |ledger| ledger.delete_expense(id)).await?;
    Ok(Json(json!({ "balance": balance })))
}

/// GET /api/events - Audit trail, newest first
async fn get_events(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let events = with_ledger(&state, |ledger| ledger.events()).await?;
    Ok(Json(json!({ "events": events })))
}

/// GET /download-db - Database file as an attachment
async fn download_db(State(state): State<AppState>) -> Result<Response, ApiError> {
    let bytes = with_ledger(&state, |ledger| ledger.snapshot_bytes()).await?;
    let disposition = format!("attachment; filename=\"{}\"", state.download_name);

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// ============================================================================
// Router / Server
// ============================================================================

/// Build the router with all endpoints (used by the server and the tests)
pub fn build_router(state: AppState, static_dir: &std::path::Path) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/state", get(get_state))
        .route("/saldo", post(add_funds))
        .route("/gasto", post(add_expense))
        .route("/gasto/:id", delete(delete_expense))
        .route("/events", get(get_events));

    Router::new()
        .route("/", get(serve_index))
        .route("/download-db", get(download_db))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Open the ledger named by `config` and serve until Ctrl+C
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    let ledger = Ledger::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "database opened");

    let state = AppState::new(Arc::new(ledger), &config.download_name);
    let app = build_router(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!("carteira server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            }
        })
        .await
        .context("Server error")?;

    tracing::info!("server stopped");
    Ok(())
}
