use std::sync::Mutex;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;

use attendance_ledger::config::Config;
use attendance_ledger::db::init_db;
use attendance_ledger::docs::openapi_for_prefix;
use attendance_ledger::routes;
use attendance_ledger::service::editor::EditController;
use attendance_ledger::service::persistence::PersistenceCoordinator;
use tracing::info;
use tracing_appender::rolling;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(rules = ?config.rules, addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config.database_url, &config.db)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    let store = Data::new(PersistenceCoordinator::new(pool));
    let rules = Data::new(config.rules.clone());
    let editor = Data::new(Mutex::new(EditController::new()));
    let server_addr = config.server_addr.clone();
    let api_doc = openapi_for_prefix(&config.api_prefix);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", api_doc.clone()),
            )
            .app_data(store.clone())
            .app_data(rules.clone())
            .app_data(editor.clone())
            .configure(|cfg| routes::configure(cfg, &config))
    })
    .bind(&server_addr)
    .with_context(|| format!("binding {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
