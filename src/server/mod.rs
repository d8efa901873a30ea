// Inbound HTTP: hosted checkout redirect, checkout return and card token endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::AdapterError;
use crate::orchestrator::{CheckoutReturn, CheckoutStart, TransactionOrchestrator};
use crate::settings::FormValues;
use crate::store::Context;
use crate::vault::{CardTokenRequest, TokenVault};

mod host;

/// Path the gateway sends the buyer back to after a hosted checkout.
pub const RETURN_PATH: &str = "/payment/square/validate";
/// Form action of the hosted checkout button.
pub const CHECKOUT_PATH: &str = "/payment/square/redirect_checkout";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub vault: Arc<TokenVault>,
    pub ctx: Context,
    pub form_values: FormValues,
    pub process_url: String,
    pub default_partner_id: Option<String>,
    pub host_api_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CHECKOUT_PATH, post(redirect_checkout))
        .route(RETURN_PATH, get(checkout_return))
        .route("/payment/square/form_values", get(form_values))
        .route("/payment/square/s2s/create_json_3ds", post(create_token_3ds))
        .route("/payment/square/s2s/create_json", post(create_token))
        .route("/health", get(health_check))
        .merge(host::routes())
        .with_state(state)
}

pub async fn run_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn status_of(e: &AdapterError) -> StatusCode {
    StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn error_page(e: &AdapterError) -> Response {
    let body = format!(
        "<html><head><title>Payment error</title></head><body><h1>Payment error</h1><p>{}</p></body></html>",
        escape_html(&e.to_string())
    );
    (status_of(e), Html(body)).into_response()
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn form_values(State(state): State<AppState>) -> Json<FormValues> {
    Json(state.form_values)
}

async fn redirect_checkout(State(state): State<AppState>, Form(req): Form<CheckoutStart>) -> Response {
    match state.orchestrator.start_checkout(req).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => {
            error!("Hosted checkout failed: {}", e);
            error_page(&e)
        }
    }
}

async fn checkout_return(State(state): State<AppState>, Query(ret): Query<CheckoutReturn>) -> Response {
    match state.orchestrator.handle_checkout_return(ret).await {
        Ok(result) => {
            info!(reference = %result.reference, state = ?result.state, "Checkout return processed");
            Redirect::to(&state.process_url).into_response()
        }
        Err(e) => {
            warn!("Checkout return rejected: {}", e);
            error_page(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    #[serde(default)]
    pub partner_id: Option<String>,
    pub card_nonce: String,
    #[serde(default)]
    pub last_4: Option<String>,
    #[serde(default)]
    pub verify_validity: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenDescriptor {
    pub result: bool,
    pub id: String,
    pub short_name: String,
    #[serde(rename = "3d_secure")]
    pub three_d_secure: bool,
    pub verified: bool,
}

impl AppState {
    async fn create_card_token(&self, form: TokenForm) -> Result<crate::model::PaymentToken, AdapterError> {
        let partner_id = form
            .partner_id
            .filter(|p| !p.is_empty())
            .or_else(|| self.default_partner_id.clone())
            .ok_or_else(|| AdapterError::validation("missing partner id"))?;
        self.vault
            .create_card_token(CardTokenRequest {
                partner_id,
                card_nonce: form.card_nonce,
                last_4: form.last_4,
                verify_validity: form.verify_validity,
            })
            .await
    }
}

async fn create_token_3ds(State(state): State<AppState>, Json(form): Json<TokenForm>) -> Response {
    match state.create_card_token(form).await {
        Ok(token) => Json(TokenDescriptor {
            result: true,
            id: token.id,
            short_name: token.name,
            three_d_secure: false,
            verified: token.verified,
        })
        .into_response(),
        Err(e) => {
            warn!("Card token creation failed: {}", e);
            (status_of(&e), Json(json!({ "result": false, "error": e.to_string() }))).into_response()
        }
    }
}

async fn create_token(State(state): State<AppState>, Json(form): Json<TokenForm>) -> Response {
    match state.create_card_token(form).await {
        Ok(token) => Json(json!(token.id)).into_response(),
        Err(e) => {
            warn!("Card token creation failed: {}", e);
            (status_of(&e), Json(json!(false))).into_response()
        }
    }
}
