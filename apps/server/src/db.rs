use sqlx::PgPool;

async fn is_applied(pool: &PgPool, name: &str) -> anyhow::Result<bool> {
    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = $1")
            .bind(name)
            .fetch_one(pool)
            .await?;
    Ok(applied)
}

async fn mark_applied(pool: &PgPool, name: &str) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
        .bind(name)
        .execute(pool)
        .await?;
    tracing::info!("Applied migration: {}", name);
    Ok(())
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, "001_init").await? {
        let migration_sql = include_str!("../migrations/001_init.sql");
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(pool).await?;
            }
        }
        mark_applied(pool, "001_init").await?;
    }

    // 002: pinned date window so the UI stops shifting at midnight
    if !is_applied(pool, "002_active_dates").await? {
        sqlx::query("ALTER TABLE schedule_data ADD COLUMN IF NOT EXISTS active_dates JSONB")
            .execute(pool)
            .await?;
        mark_applied(pool, "002_active_dates").await?;
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}
