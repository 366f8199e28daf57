mod config;
mod context;
mod db;
mod entity;
mod error;
mod format;
mod query;
mod response;
mod routes;
mod store;

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use config::{AppConfig, StorageBackend};
use db::connect_db;
use log::info;
use response::json_error_handler;
use routes::{comment, idea, tag};
use store::file::FileIdeaStore;
use store::sql::SqlIdeaStore;
use store::IdeaStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = AppConfig::from_env();

    let store: Arc<dyn IdeaStore> = match config.storage_backend {
        StorageBackend::Sqlite => Arc::new(SqlIdeaStore::new(connect_db(&config).await)),
        StorageBackend::File => {
            std::fs::create_dir_all(&config.data_dir)?;
            info!("flat-file storage at {}", config.data_dir);
            Arc::new(FileIdeaStore::new(&config.data_dir))
        }
    };
    let store_data: web::Data<dyn IdeaStore> = web::Data::from(store);
    let server_port = config.server_port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(store_data.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .wrap(actix_web::middleware::from_fn(routes::cors::cors_handler))
            .service(
                web::scope("/api")
                    .service(web::scope("/ideas").configure(idea::config))
                    .service(web::scope("/tags").configure(tag::config))
                    .service(web::scope("/comments").configure(comment::config)),
            )
    })
    .bind(("0.0.0.0", server_port))?;
    info!("server started at http://0.0.0.0:{}", server_port);
    server.run().await
}
