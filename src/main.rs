mod auth;
mod config;
mod db;
mod entity;
mod error;
mod response;
mod routes;
mod store;
mod thread;

use std::io;

use actix_web::{middleware, web, App, HttpServer};
use config::AppConfig;
use db::connect_db;
use log::{error, info};
use response::json_error_handler;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = AppConfig::from_env();
    let db = connect_db(&config).await.map_err(|e| {
        error!("db connect failed: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;
    let server_port = config.server_port;
    let api_prefix = config.api_prefix.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(db.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .wrap(middleware::from_fn(routes::cors::cors_handler))
            .service(web::scope(&config.api_prefix).configure(routes::configure))
    })
    .bind(("0.0.0.0", server_port))?;
    info!("server started at http://0.0.0.0:{}{}", server_port, api_prefix);
    server.run().await
}
