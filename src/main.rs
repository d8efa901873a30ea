use std::sync::Arc;

use anyhow::Result;
use square_adapter::database::Database;
use square_adapter::gateway::build_gateway;
use square_adapter::model::Transaction;
use square_adapter::orchestrator::{OrchestratorSettings, TransactionOrchestrator};
use square_adapter::server::{self, AppState};
use square_adapter::settings::Config;
use square_adapter::store::Context;
use square_adapter::vault::TokenVault;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::load();

    // Credentials are checked before any gateway client exists
    if let Err(e) = cfg.validate() {
        tracing::error!("{}; exiting", e);
        return Ok(());
    }
    tracing::info!(
        provider = ?cfg.provider,
        environment = ?cfg.square.environment,
        capture_manually = cfg.square.capture_manually,
        "Starting Square gateway adapter"
    );

    let db = Arc::new(Database::new(&cfg.database_path)?);
    let ctx = Context::from_store(db);
    let gateway = build_gateway(&cfg)?;

    let orchestrator = TransactionOrchestrator::new(gateway.clone(), ctx.clone(), OrchestratorSettings::from_config(&cfg))
        .with_callback(Arc::new(|tx: &Transaction| {
            tracing::info!(reference = %tx.reference, amount = %tx.amount, "Payment done");
        }));
    let vault = TokenVault::new(gateway, ctx.clone());

    if cfg.host_api_token.is_none() {
        tracing::warn!("HOST_API_TOKEN is not set; host record routes accept unauthenticated requests");
    }
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        vault: Arc::new(vault),
        ctx,
        form_values: cfg.form_values(),
        process_url: cfg.process_url.clone(),
        default_partner_id: cfg.default_partner_id.clone(),
        host_api_token: cfg.host_api_token.clone(),
    };

    server::run_server(cfg.server_port, state).await
}
