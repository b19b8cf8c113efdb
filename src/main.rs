use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod repository;
mod routes;
mod services;

use config::Config;
use db::init_db;

use crate::api::AppState;
use crate::docs::ApiDoc;
use crate::repository::mysql::MySqlRepository;
use crate::services::gateway::EsslAdmsGateway;
use crate::services::pipeline::{BiometricPipeline, PipelineSettings};
use crate::services::scheduler::{BiometricScheduler, SYNC_QUEUE_CAPACITY, SyncJobQueue};
use anyhow::Context;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Biometric integration is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let credentials_configured = config.gateway.is_configured();
    if !credentials_configured {
        warn!("eSSL ADMS credentials are not configured; device operations will be refused");
    }

    let gateway = EsslAdmsGateway::new(
        &config.gateway,
        Duration::from_secs(config.gateway_timeout_secs),
        config.scheduler.timezone,
    )
    .context("failed to build eSSL ADMS client")?;

    let pipeline = Arc::new(BiometricPipeline::new(
        Arc::new(MySqlRepository::new(pool)),
        Arc::new(gateway),
        PipelineSettings {
            credentials_configured,
            sync_days_back: config.scheduler.sync_days_back,
            timezone: config.scheduler.timezone,
        },
    ));

    // the HTTP service keeps running when the schedules cannot be registered
    let scheduler = match BiometricScheduler::start(pipeline.clone(), &config.scheduler).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Biometric scheduler not started");
            None
        }
    };

    let state = Data::new(AppState {
        jobs: SyncJobQueue::spawn(pipeline.clone(), SYNC_QUEUE_CAPACITY),
        pipeline,
        scheduler: config.scheduler.clone(),
    });

    let limiter = routes::build_limiter(config.rate_protected_per_min)?;
    let server_addr = config.server_addr.clone();
    let api_prefix = config.api_prefix.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(state.clone())
            .service(index)
            // Biometric routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &api_prefix, &limiter))
    })
    .bind(&server_addr)
    .with_context(|| format!("failed to bind {server_addr}"))?
    .run()
    .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await?;
    }

    info!("Server stopped");
    Ok(())
}
