use anyhow::Result;
use newsdesk::{db::Database, Config};

pub async fn execute(config: &Config) -> Result<()> {
    tracing::info!("Running database migrations");

    let db = Database::new(
        config.database_url()?,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;

    db.run_migrations().await?;
    db.health_check().await?;
    db.check_pgvector().await?;

    println!("Database migrations completed successfully");
    Ok(())
}
