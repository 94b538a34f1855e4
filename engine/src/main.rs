// StagePanel engine
//
// Runs next to the operator's browser:
//   - Talks to the device over its Wi-Fi access point
//   - Serves a JSON API (and optionally the static UI) on loopback
//   - Polls device storage in the background

use std::sync::Arc;

use stagepanel_engine::api::build_router;
use stagepanel_engine::config::PanelConfig;
use stagepanel_engine::{HttpDevice, Panel};
use tower_http::services::ServeDir;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let version = env!("CARGO_PKG_VERSION");
    let cfg = PanelConfig::from_env()?;

    let device = HttpDevice::new(&cfg.device_url, cfg.http_timeout)?;
    info!("device at {}", device.base_url());

    let panel = Panel::new(Arc::new(device));
    let poller = panel.initialize().await;

    let mut app = build_router(panel);
    if let Some(dir) = &cfg.ui_dir {
        info!("serving UI from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }

    info!("StagePanel engine v{version} starting on http://{}", cfg.bind);

    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.abort();
    info!("StagePanel engine stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("could not install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("Shutdown signal received.");
}
