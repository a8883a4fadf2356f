//! Process entry point: parse configuration, initialise logging, bootstrap
//! every backing-store connection (spec §4.I), run the Consumer Loop until
//! a shutdown signal arrives, then tear down gracefully.

use std::sync::Arc;

use clap::Parser;
use mailer::{
    config::Config,
    consumer::Signal,
    lifecycle::{self, Runtime},
    logging::Logger,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    Logger::init(config.log_level.as_deref());

    tracing::info!(mode = ?config.mode(), retrier = config.retrier, "mailer starting");

    let Runtime { executor_ctx, consumer } = match lifecycle::bootstrap(&config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "bootstrap failed, aborting");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let consumer_handle = tokio::spawn(consumer.run(Arc::clone(&executor_ctx), shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("ctrl-c received, shutting down");
    let _ = shutdown_tx.send(Signal::Shutdown);
    let _ = consumer_handle.await;

    lifecycle::shutdown_executor_context(executor_ctx);

    Ok(())
}
