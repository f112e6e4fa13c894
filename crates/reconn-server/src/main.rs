//! reconn server binary.
//!
//! Depending on `server.role`, serves the HTTP API, consumes the GPU task
//! queue, or both. Shuts down gracefully on SIGTERM/SIGINT.

use reconn_server::{app, build_pipeline, config, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("RECONN_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        role = %config.server.role,
        "resolved startup configuration"
    );

    let pool = reconn_db::create_pool(
        &config.database.path,
        reconn_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool; check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            reconn_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    let pipeline =
        build_pipeline(&config, pool).expect("failed to build pipeline; check storage/llm/voice");
    pipeline
        .layout()
        .ensure_local_dirs()
        .expect("failed to create local artifact directories");

    let role = config.server.role;

    if role.runs_worker() {
        let worker = pipeline.clone();
        tokio::spawn(reconn_pipeline::run_worker(worker));
    }

    if role.runs_http() {
        let addr = SocketAddr::new(config.server.host, config.server.port);
        tracing::info!(%addr, "starting reconn server");

        let listener = TcpListener::bind(addr)
            .await
            .expect("failed to bind to address; is another process using this port?");

        axum::serve(listener, app(AppState { pipeline }))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .expect("server error");
    } else {
        shutdown_signal().await;
    }

    tracing::info!("reconn server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
