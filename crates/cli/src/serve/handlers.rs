//! HTTP route handlers: health, transitions, unfreeze, flags, freeze intents.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use caseflow_engine::{
    EngineError, ErrorCode, FlagError, Principal, TransitionRequest, UnfreezeRequest,
};
use serde::de::DeserializeOwned;

use super::middleware::Caller;
use super::state::AppState;

/// An engine or flag error rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub(crate) struct ApiError {
    code: ErrorCode,
    message: String,
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorCode::Aborted => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<FlagError> for ApiError {
    fn from(e: FlagError) -> Self {
        match e {
            FlagError::UnknownFlag(_) => Self {
                code: ErrorCode::NotFound,
                message: e.to_string(),
            },
            FlagError::NonBoolean(_) => Self {
                code: ErrorCode::InvalidArgument,
                message: e.to_string(),
            },
            FlagError::Storage(cause) => EngineError::internal("flag storage", cause).into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message }
        });
        (status_for(self.code), Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn ok(value: impl serde::Serialize) -> ApiResult {
    Ok((StatusCode::OK, Json(value)).into_response())
}

fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| EngineError::InvalidArgument(format!("malformed request body: {e}")).into())
}

fn require(caller: &Caller) -> Result<&Principal, ApiError> {
    caller
        .principal()
        .ok_or_else(|| EngineError::Unauthenticated.into())
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    ApiError {
        code: ErrorCode::NotFound,
        message: "not found".to_string(),
    }
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// POST /transition
pub(crate) async fn handle_transition(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> ApiResult {
    // Anonymous callers get 401 even when the payload is malformed.
    if caller.principal().is_none() {
        return Err(EngineError::Unauthenticated.into());
    }
    let request: TransitionRequest = parse_body(&body)?;
    ok(state.engine.transition(request, caller.principal()).await?)
}

/// POST /unfreeze
pub(crate) async fn handle_unfreeze(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> ApiResult {
    if caller.principal().is_none() {
        return Err(EngineError::Unauthenticated.into());
    }
    let request: UnfreezeRequest = parse_body(&body)?;
    ok(state.engine.unfreeze(request, caller.principal()).await?)
}

/// GET /flags
pub(crate) async fn handle_list_flags(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> ApiResult {
    require(&caller)?;
    ok(state.engine.flags().all().await?)
}

/// GET /flags/{name}
pub(crate) async fn handle_get_flag(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> ApiResult {
    require(&caller)?;
    let flags = state.engine.flags();
    if caseflow_engine::flags::lookup(flags.registry(), &name).is_none() {
        return Err(FlagError::UnknownFlag(name).into());
    }
    let value = flags.get(&name).await;
    ok(serde_json::json!({ "name": name, "value": value }))
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct SetFlagBody {
    #[serde(default)]
    value: serde_json::Value,
}

/// PUT /flags/{name}
pub(crate) async fn handle_set_flag(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let principal = require(&caller)?;
    let payload: SetFlagBody = parse_body(&body)?;
    state
        .engine
        .flags()
        .set_json(&name, &payload.value, principal.actor())
        .await?;
    let value = state.engine.flags().get(&name).await;
    ok(serde_json::json!({ "success": true, "name": name, "value": value }))
}

/// GET /freezes
pub(crate) async fn handle_pending_freezes(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> ApiResult {
    let pending = state.engine.pending_intents(caller.principal()).await?;
    ok(serde_json::json!({ "pending": pending }))
}

/// POST /freezes/drain
pub(crate) async fn handle_drain_freezes(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> ApiResult {
    ok(state.engine.drain_pending(caller.principal()).await?)
}

/// POST /freezes/{id}/retry
pub(crate) async fn handle_retry_freeze(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(state.engine.retry_intent(&id, caller.principal()).await?)
}
