use api::routes::routes;
use axum::Router;
use db::connect;
use sea_orm_migration::MigratorTrait;
use services::devices::DeviceRegistry;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_appender::rolling;
use util::config::AppConfig;
use util::state::AppState;

#[tokio::main]
async fn main() {
    // Load configuration and initialize logging
    let _log_guard = {
        let config = AppConfig::global();
        init_logging(&config.log_file, config.log_to_stdout)
    };

    // Set up the database and shared state
    let db = connect().await;
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    let app_state = AppState::new(db);

    // Periodically mark silent devices offline
    spawn_liveness_sweeper(app_state.clone());

    // Configure middleware
    let cors = CorsLayer::very_permissive();

    // Build app router
    let app = Router::new()
        .nest("/api", routes(app_state.clone()))
        .layer(cors);

    // Start server
    let (host, port, project_name) = {
        let config = AppConfig::global();
        (config.host.clone(), config.port, config.project_name.clone())
    };
    let addr: SocketAddr = format!("{host}:{port}").parse().expect("Invalid address");

    println!("Starting {project_name} on http://{host}:{port}");

    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server crashed");
}

fn init_logging(log_file: &str, log_to_stdout: bool) -> tracing_appender::non_blocking::WorkerGuard {
    use std::fs;
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    fs::create_dir_all("logs").ok();

    let file_appender = rolling::daily("logs", log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(true);

    let env_filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("api=info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if log_to_stdout {
        registry.with(stdout_layer).init();
    } else {
        registry.init();
    }

    guard
}

fn spawn_liveness_sweeper(app_state: AppState) {
    let threshold = AppConfig::global().device_offline_after_seconds;
    // sweep at a fraction of the threshold so flips are timely
    let interval = Duration::from_secs((threshold as u64 / 4).max(15));

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match DeviceRegistry::sweep_stale(app_state.db()).await {
                Ok(0) => {}
                Ok(flipped) => tracing::info!(flipped, "liveness sweep flipped devices offline"),
                Err(err) => tracing::warn!(error = %err, "liveness sweep failed"),
            }
        }
    });
}
