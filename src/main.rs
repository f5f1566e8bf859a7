use actix_web::{web, App, HttpServer};
use log::{info, warn};

use warp_archive::app_state::AppState;
use warp_archive::config::{AppConfig, LoggingConfig};
use warp_archive::service;

fn init_logging(logging: &LoggingConfig) {
    if logging.config_file.exists() {
        match log4rs::init_file(&logging.config_file, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!(
                "Failed to load log config {}: {}, falling back to env_logger",
                logging.config_file.display(),
                e
            ),
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    init_logging(&config.logging);

    let state = AppState::from_config(config.clone())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    if state.registry.is_empty() {
        warn!("Serving without any enabled archiving driver");
    }

    let server = config.server.clone();
    info!("Starting server on {}:{}", server.host, server.port);

    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(data.clone())
            .app_data(web::PayloadConfig::default().limit(server.max_payload_size))
            .configure(service::configure)
    })
    .workers(config.server.workers.max(1))
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
