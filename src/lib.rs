use actix_cors::Cors;
use actix_web::{
    middleware::{NormalizePath, TrailingSlash},
    web::{Data, JsonConfig},
    App, HttpServer,
};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

use config::Config;
use service::Service;
use worker::DeliveryWorker;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod message;
pub mod queue;
pub mod service;
pub mod worker;

/// Starts the full application: store + queue, the delivery worker, and the
/// HTTP server. When the server exits, the worker is signalled to stop and is
/// awaited so an in-flight delivery can complete.
pub async fn run() -> eyre::Result<()> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("COURIER_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("COURIER_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let config = Config::load()?;

    let service = Service::connect_with(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = DeliveryWorker::new(service.queue().clone(), service.db().clone(), shutdown_rx);
    let worker_handle = tokio::spawn(worker.run());

    let bind_addr = (service.config().host().to_owned(), service.config().port());

    let data = Data::new(service);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method();

        let json_cfg = JsonConfig::default().content_type_required(false);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .wrap(cors)
            .service(api::messages::service())
            .app_data(data.clone())
            .app_data(json_cfg)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    shutdown_tx.send(true).ok();
    worker_handle.await?;

    Ok(())
}
