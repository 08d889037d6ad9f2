//! Request handling: the axum surface delegates every path to the
//! framework-neutral service core.

use crate::sqlite::SqliteSession;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    response::Response,
    Router,
};
use oxidata_core::{parse_query_string, Error, ServiceRequest};
use std::sync::Arc;
use tracing::error;

/// Maximum accepted request body (10 MiB).
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = parse_query_string(request.uri().query().unwrap_or(""));
    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    let body = match axum::body::to_bytes(request.into_body(), BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(&Error::InvalidBody(e.to_string()));
        }
    };

    let mut session = match SqliteSession::acquire(&state.pool).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "failed to acquire connection");
            return error_response(&e);
        }
    };

    let service_request = ServiceRequest {
        method,
        path,
        query,
        headers,
        body,
        deadline: None,
    };

    let response = state.service.handle(&mut session, service_request).await;
    into_axum_response(response)
}

fn into_axum_response(response: oxidata_core::ServiceResponse) -> Response {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn error_response(error: &Error) -> Response {
    into_axum_response(oxidata_core::ServiceResponse::from_error(error))
}
