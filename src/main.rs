use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use tracing::info;

use sotto::app::AppController;
use sotto::http;

#[actix_web::main]
async fn main() -> Result<()> {
    let controller = Arc::new(AppController::new()?);

    let config = controller.config();
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %bind_addr,
        "Starting HTTP server"
    );

    let data = web::Data::from(Arc::clone(&controller));

    HttpServer::new(move || {
        // Local clients only, but the desktop shell runs on a different
        // origin, so CORS stays wide open.
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(http::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
