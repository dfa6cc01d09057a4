use std::time::Duration;

use broker_engine::{BrokerConfig, BrokerEngine};

use crate::config::ServeArgs;
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("broker-server starting");

    let mut config = BrokerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, topics = config.topics.len(), "loaded config");

    let engine = BrokerEngine::bootstrap(&config)?;
    let stats_task = spawn_stats_logger(engine.clone(), args.stats_interval);

    // SIGHUP reloads topics, Ctrl+C shuts down.
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;

    tracing::info!("server ready, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = sighup.recv() => {
                tracing::info!(config = %args.config, "SIGHUP received, reloading configuration");
                match BrokerConfig::load(&args.config)
                    .and_then(|new_config| engine.reload(&config, &new_config).map(|()| new_config))
                {
                    Ok(new_config) => {
                        config = new_config;
                        tracing::info!("configuration reloaded");
                    }
                    Err(e) => tracing::error!(error = %e, "configuration reload failed (keeping old config)"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("shutting down...");
                break;
            }
        }
    }

    engine.shutdown();
    if let Some(handle) = stats_task {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "stats logger task failed");
        }
    }
    tracing::info!("shutdown complete");
    Ok(())
}

fn spawn_stats_logger(
    engine: BrokerEngine,
    interval_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    let shutdown = engine.shutdown_token();
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = engine.stats();
                    tracing::info!(
                        topics = stats.topics,
                        partitions = stats.partitions,
                        records = stats.records,
                        groups = stats.groups,
                        active_streams = stats.active_streams,
                        "engine stats"
                    );
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }))
}
