use std::sync::Arc;

use cardstore::{CardService, CardStore, StoreConfig};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable the `inmem-store` or `postgres-store` feature");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; deployments set env externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping card store");
    let cfg = StoreConfig::from_env();
    info!(
        op_timeout_ms = cfg.op_timeout.as_millis() as u64,
        table = %cfg.table,
        "configuration loaded"
    );

    let store = build_store(&cfg).await?;
    let _service = CardService::new(store);
    info!("Card store ready");
    Ok(())
}

#[cfg(feature = "postgres-store")]
async fn build_store(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn CardStore>> {
    use cardstore::repo::pg::PgCardStore;
    use sqlx::postgres::PgPoolOptions;

    let db_url = cfg
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(cfg.op_timeout)
        .connect(db_url)
        .await?;
    let store = PgCardStore::new(pool, cfg);
    // no index, no traffic
    store.provision().await?;
    info!("Using Postgres card store backend");
    Ok(Arc::new(store))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_store(_cfg: &StoreConfig) -> anyhow::Result<Arc<dyn CardStore>> {
    use cardstore::repo::inmem::InMemCardStore;

    info!("Using in-memory card store backend");
    Ok(Arc::new(InMemCardStore::new()))
}
