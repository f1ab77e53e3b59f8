use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use super::database::PgWithdrawalStore;
use crate::config::DatabaseConfig;

/// Open the withdrawal database and apply pending migrations.
pub async fn connect_store(config: &DatabaseConfig) -> anyhow::Result<PgWithdrawalStore> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.get_db_url())
        .await
        .context("connecting to withdrawal database")?;

    run_migrations(&pool).await?;
    Ok(PgWithdrawalStore::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("running withdrawal_requests migrations")?;
    Ok(())
}
