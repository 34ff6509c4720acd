mod config;

use std::sync::Arc;

use tracing::info;

use beam_api::notify::{ApnsNotifier, NoopNotifier, Notifier};
use beam_api::{AppStateInner, build_router};
use beam_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "photobeam=debug,beam_api=debug,beam_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);

    let notifier: Arc<dyn Notifier> = match config.apns.clone() {
        Some(apns) => Arc::new(ApnsNotifier::new(db.clone(), apns)?),
        None => {
            info!("APNs credentials not set, push disabled");
            Arc::new(NoopNotifier)
        }
    };

    let app = build_router(Arc::new(AppStateInner {
        db,
        notifier,
        max_upload_bytes: config.max_upload_bytes,
    }));

    info!("Photobeam listening on {}", config.addr);
    info!("Upload cap: {} bytes", config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("No SIGTERM handler ({}), waiting for Ctrl+C", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
