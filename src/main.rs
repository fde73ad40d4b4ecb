use std::sync::Arc;

use clap::Parser;
use examshelf::app;
use examshelf::config::{Cli, Config, default_config_dir, default_config_path};
use examshelf::db::Database;
use examshelf::handler::AppState;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    dotenvy::dotenv().ok();

    // --config puts the database next to the config file; otherwise both live
    // in ~/.examshelf/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("examshelf.svc starting");

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();

    let sweep_db = db.clone();
    let sweep_token = cancellation_token.clone();
    let sweep_every = std::time::Duration::from_secs(cfg.auth.session_sweep_seconds.max(1));
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match sweep_db.purge_expired_sessions().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(purged = n, "purged expired sessions"),
                        Err(e) => tracing::warn!("failed to purge expired sessions: {}", e),
                    }
                }
                _ = sweep_token.cancelled() => {
                    tracing::info!("session sweeper shutting down");
                    break;
                }
            }
        }
    });

    let router = app(AppState::new(db.clone(), cfg.auth.clone()));

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("examshelf.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server stopped unexpectedly");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
            cancellation_token.cancel();
        }
    }

    let _ = sweeper.await;
    if let Err(e) = db.sync().await {
        tracing::warn!(error = %e, "final replica sync failed");
    }
    tracing::info!("examshelf.svc going off, graceful shutdown complete");
}
