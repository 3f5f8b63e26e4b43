use std::sync::Arc;

use actix_web::web;
use anyhow::Context;
use clap::Parser;
use tts_gate::config::{WorkerArgs, WorkerConfig};
use tts_gate::{WorkerContext, logging, server};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::try_from(WorkerArgs::parse())?;
    logging::init_logging(config.log_level);

    let ctx = WorkerContext::start(&config.backend, &config.readiness)
        .await
        .context("worker startup failed")?;
    let ctx = web::Data::new(ctx);

    // Returns once actix has handled SIGINT/SIGTERM and drained workers
    server::startup(&config, ctx.clone()).await?;

    log::info!("Server stopped, shutting down backend");
    if let Some(ctx) = Arc::into_inner(ctx.into_inner()) {
        ctx.shutdown().await;
    }
    Ok(())
}
