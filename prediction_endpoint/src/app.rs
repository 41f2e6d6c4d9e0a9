use crate::config::Config;
use crate::inference::{InferencePool, RemoteInference};
use crate::server::HttpServer;
use crate::telemetry::Metrics;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let instances = (0..config.inference.instances)
        .map(|_| RemoteInference::new(&config.inference))
        .collect::<Result<Vec<_>, _>>()?;

    let inference = match InferencePool::new(instances) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!("Failed to initialize inference collaborator: {:?}", e);
            return Err(Box::new(e));
        }
    };
    tracing::info!(
        "Forwarding inference to {} (timeout {} ms)",
        config.inference.url,
        config.inference.timeout_ms
    );

    let metrics = Arc::new(Metrics::new()?);
    metrics.install_global();

    let server = HttpServer::new(inference, metrics, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
