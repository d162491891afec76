use crate::entities::{
    approvals, departments, login_codes, profiles, resources, semesters, sessions, subjects,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema, Statement,
};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(50)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Brings the schema up to date and seeds departments and semesters.
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();

    if builder == DbBackend::Postgres {
        info!("🔄 Running SQLx migrations for PostgreSQL...");
        let pool = db.get_postgres_connection_pool();
        sqlx::migrate!("./migrations").run(pool).await?;
    } else {
        info!("🔄 Running SeaORM auto-migrations for SQLite...");
        let schema = Schema::new(builder);

        // Parents before children so foreign keys resolve.
        let stmts = vec![
            schema
                .create_table_from_entity(departments::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(semesters::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(profiles::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(subjects::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(resources::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(approvals::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(sessions::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(login_codes::Entity)
                .if_not_exists()
                .to_owned(),
        ];

        for stmt in stmts {
            db.execute(builder.build(&stmt)).await?;
        }

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_resources_status_created ON resources(status, created_at);",
            "CREATE INDEX IF NOT EXISTS idx_resources_file_path ON resources(file_path);",
            "CREATE INDEX IF NOT EXISTS idx_login_codes_email ON login_codes(email);",
            "CREATE INDEX IF NOT EXISTS idx_approvals_resource ON approvals(resource_id);",
        ] {
            if let Err(e) = db
                .execute(Statement::from_string(builder, index.to_string()))
                .await
            {
                warn!("⚠️ Index creation skipped: {}", e);
            }
        }
    }

    crate::infrastructure::seed::seed_reference_data(db).await?;

    Ok(())
}
