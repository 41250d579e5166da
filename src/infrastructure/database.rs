use crate::entities::{images, upload_tokens, users};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Statement};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(50)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Entity-derived schema creation plus the indexes the entities alone
/// cannot express. Safe to run on every startup.
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmts = vec![
        schema
            .create_table_from_entity(users::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(images::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(upload_tokens::Entity)
            .if_not_exists()
            .to_owned(),
    ];

    for stmt in stmts {
        let stmt = builder.build(&stmt);
        db.execute(stmt).await?;
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_images_user_id ON images(user_id);",
        "CREATE INDEX IF NOT EXISTS idx_images_created_at ON images(created_at);",
        "CREATE INDEX IF NOT EXISTS idx_upload_tokens_user_id ON upload_tokens(user_id);",
    ];
    for sql in indexes {
        db.execute(Statement::from_string(builder, sql.to_string()))
            .await?;
    }

    info!("🔄 Schema migrations applied");
    Ok(())
}
