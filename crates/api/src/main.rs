//! ShopLedger API server

use std::sync::Arc;

use anyhow::Context;
use shopledger_api::{routes::create_router, AppState, Config};
use shopledger_billing::{BillingService, LedgerStore, MemoryLedgerStore, PgLedgerStore};
use shopledger_shared::{create_pool, run_migrations};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shopledger_api=info,shopledger_billing=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = Config::from_env().context("invalid configuration")?;

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            tracing::info!("Ledger store: postgres");
            Arc::new(PgLedgerStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory ledger; nothing survives a restart");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let billing = BillingService::from_env(store).context("invalid billing configuration")?;
    if config.admin_api_token.is_none() {
        tracing::warn!("ADMIN_API_TOKEN not set, operator endpoints are disabled");
    }

    let bind_address = config.bind_address.clone();
    let app = create_router(AppState::new(config, billing));

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "ShopLedger API listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
