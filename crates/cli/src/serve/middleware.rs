//! HTTP middleware: bearer token resolution.

use std::sync::Arc;

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use caseflow_engine::{Principal, PrincipalResolver};

use super::state::AppState;

/// The caller resolved from the `Authorization` header, if any.
///
/// Handlers pass this straight to the engine, which answers
/// `unauthenticated` itself when it is `None`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Caller(pub(crate) Option<Principal>);

impl Caller {
    pub(crate) fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

pub(crate) async fn principal_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let principal = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.principals.resolve(token.trim()));

    if principal.is_none() && request.headers().contains_key("authorization") {
        tracing::debug!(path = %request.uri().path(), "unrecognized bearer token");
    }
    request.extensions_mut().insert(Caller(principal));
    next.run(request).await
}
