use std::sync::Arc;

use mirror_core::{config::Config, Error};
use mirror_discord::{health, router};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    mirror_core::logging::init("mirror")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        sources = cfg.source_channels.len(),
        target = %cfg.target_channel,
        max_upload_bytes = cfg.max_upload_bytes,
        "configuration loaded"
    );

    let engine = router::build_engine(&cfg)
        .map_err(|e| Error::External(format!("engine setup failed: {e}")))?;

    let shutdown = CancellationToken::new();

    let health_shutdown = shutdown.clone();
    let port = cfg.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port, health_shutdown).await {
            error!(error = %e, "health endpoint failed");
        }
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                signal_shutdown.cancel();
            }
            Err(e) => error!(error = %e, "failed to listen for interrupt"),
        }
    });

    router::run(cfg, engine, shutdown.clone())
        .await
        .map_err(|e| Error::External(format!("discord client failed: {e}")))?;

    shutdown.cancel();
    Ok(())
}
