use clap::Parser;
use dotenvy::dotenv;
use resource_hub::config::AppConfig;
use resource_hub::infrastructure::{database, seed, storage};
use resource_hub::services::auth::LogMailer;
use resource_hub::services::browse_cache::{BrowseCache, FileCacheBackend};
use resource_hub::utils::clock::{Clock, SystemClock};
use resource_hub::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resource_hub=info,audit=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Resource Hub...");

    let db = database::setup_database().await?;
    let storage_service = storage::setup_storage().await;

    let config = AppConfig::from_env();
    info!(
        "🛡️  Config: Max Size={}, Page Size={}, Admins={}",
        config.max_file_size_label(),
        config.browse_page_size,
        config.admin_emails.len()
    );

    let subjects = seed::load_subject_catalog(config.subjects_file.as_deref()).await?;
    seed::seed_subjects(&db, &subjects).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = match &config.browse_cache_path {
        Some(path) => {
            info!("💾 Browse cache persisted at {}", path);
            BrowseCache::new(
                Arc::new(FileCacheBackend::new(path)),
                clock.clone(),
                config.browse_cache_capacity,
            )
        }
        None => BrowseCache::in_memory(clock.clone(), config.browse_cache_capacity),
    };

    let state = AppState::new(
        db,
        storage_service,
        config,
        clock,
        Arc::new(LogMailer),
        Arc::new(cache),
    );

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Resource Hub exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
