//! HTTP surface
//!
//! - `GET  /health`
//! - `POST /generate {url, prompt, previousScript?}` -> `{message, script}`
//! - `POST /run {script}` -> `{exitCode, stdout, stderr, trace, spotlight}`
//! - `POST /compile {script}` -> `{program}`

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use momos_common::{ActionScript, Error, GenerateRequest};
use momos_runner::{compile, Runner};

use crate::agent::GenerationAgent;

/// Connection target written into programs served by `/compile`
const PLACEHOLDER_TARGET: &str = "ws://localhost:9222/devtools/browser/<id>";

/// Shared handler state
pub struct AppState {
    pub runner: Runner,
    pub agent: Arc<dyn GenerationAgent>,
}

/// Error returned by handlers, rendered as `{"error": message}`
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            Error::Generation(_) => StatusCode::BAD_GATEWAY,
            Error::SandboxUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            Error::Generation(_) => "Failed to generate script".to_string(),
            e => e.to_string(),
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Rejected request: {}", self.0);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn json_body(body: std::result::Result<Json<Value>, JsonRejection>) -> ApiResult<Value> {
    body.map(|Json(v)| v)
        .map_err(|e| Error::InvalidRequest(e.body_text()).into())
}

fn script_field(body: &Value) -> ApiResult<ActionScript> {
    let value = body
        .get("script")
        .ok_or_else(|| Error::InvalidRequest("script: required field is missing".to_string()))?;
    Ok(ActionScript::from_value(value).map_err(Error::from)?)
}

fn string_field(body: &Value, field: &str) -> ApiResult<String> {
    match body.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(Error::InvalidRequest(format!("{}: expected a string", field)).into()),
        None => Err(Error::InvalidRequest(format!("{}: required field is missing", field)).into()),
    }
}

/// Parse a `/generate` body, validating `previousScript` like any script.
pub fn parse_generate_request(body: &Value) -> ApiResult<GenerateRequest> {
    let previous_script = match body.get("previousScript") {
        None | Some(Value::Null) => None,
        Some(value) => Some(ActionScript::from_value(value).map_err(Error::from)?),
    };
    Ok(GenerateRequest {
        url: string_field(body, "url")?,
        prompt: string_field(body, "prompt")?,
        previous_script,
    })
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "momos-service"
    }))
}

async fn generate_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult<Response> {
    let body = json_body(body)?;
    let request = parse_generate_request(&body)?;
    info!("Generating script for {}", request.url);

    let response = state.agent.generate(&request).await?;
    info!("Generated {} actions", response.script.actions.len());
    Ok((StatusCode::OK, Json(response)).into_response())
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult<Response> {
    let body = json_body(body)?;
    let script = script_field(&body)?;

    let result = state.runner.run(&script).await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

async fn compile_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult<Response> {
    let body = json_body(body)?;
    let script = script_field(&body)?;

    let block = compile(&script)?;
    let program = state
        .runner
        .gateway()
        .assembler()
        .assemble(&block, PLACEHOLDER_TARGET);
    Ok((StatusCode::OK, Json(json!({ "program": program.as_str() }))).into_response())
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/generate", post(generate_handler))
        .route("/run", post(run_handler))
        .route("/compile", post(compile_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    info!("Momos service starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
