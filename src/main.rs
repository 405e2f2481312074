use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

use hrm_attendance::AttendanceEngine;
use hrm_attendance::config::Config;
use hrm_attendance::db::init_db;
use hrm_attendance::docs::ApiDoc;
use hrm_attendance::routes;
use hrm_attendance::utils::clock::SystemClock;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance compliance service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

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

    let settings = config.engine_settings();
    let store = init_db(config.database_url.as_deref(), settings.channel_capacity).await?;
    let engine = AttendanceEngine::bootstrap(store, Arc::new(SystemClock), settings)
        .await
        .context("Failed to load attendance state")?;
    let engine = Data::new(engine);

    let server_addr = config.server_addr.clone();
    info!(addr = %server_addr, prefix = %config.api_prefix, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(engine.clone())
            .service(index)
            // identity + rate limited API
            .configure(|cfg| routes::configure(cfg, &config))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
