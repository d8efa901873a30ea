// Host record routes: the host pushes sale documents, transactions and partners here

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::put,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{status_of, AppState};
use crate::error::AdapterError;
use crate::model::{Partner, SaleDocument, Transaction};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/host/documents", put(put_document))
        .route("/host/transactions", put(put_transaction).get(get_transaction))
        .route("/host/partners", put(put_partner))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.host_api_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        Ok(())
    } else {
        warn!("Rejected host request without a valid bearer token");
        Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response())
    }
}

fn error_json(e: &AdapterError) -> Response {
    (status_of(e), Json(json!({ "error": e.to_string() }))).into_response()
}

fn stored(result: Result<(), AdapterError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!("Host record rejected: {}", e);
            error_json(&e)
        }
    }
}

async fn put_document(State(state): State<AppState>, headers: HeaderMap, Json(doc): Json<SaleDocument>) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    if doc.name.trim().is_empty() {
        return error_json(&AdapterError::validation("document name is empty"));
    }
    debug!(kind = doc.kind.as_str(), name = %doc.name, "Host document received");
    stored(state.ctx.documents.save_document(&doc).await)
}

async fn put_transaction(State(state): State<AppState>, headers: HeaderMap, Json(tx): Json<Transaction>) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    stored(state.orchestrator.register_transaction(&tx).await)
}

async fn put_partner(State(state): State<AppState>, headers: HeaderMap, Json(partner): Json<Partner>) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    if partner.id.trim().is_empty() {
        return error_json(&AdapterError::validation("partner id is empty"));
    }
    stored(state.vault.register_partner(partner).await)
}

#[derive(Debug, Deserialize)]
struct ReferenceQuery {
    reference: String,
}

async fn get_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ReferenceQuery>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    match state.orchestrator.transaction(&q.reference).await {
        Ok(tx) => Json(tx).into_response(),
        Err(e) => error_json(&e),
    }
}
