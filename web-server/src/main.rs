// Web Server - main.rs
// web-server/src/main.rs
use actix_web::{web, App, HttpServer};
use common::{setup_tracing, Config};
use std::path::Path;
use std::sync::Arc;
use web_server::middleware::RateLimiter;
use web_server::oracle::{ConfirmationOracle, HttpConfirmationOracle};
use web_server::store::Store;
use web_server::{api, start_registry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = Config::from_env();

    if let Err(e) = setup_tracing(&config.log_level) {
        eprintln!("Tracing already initialised: {}", e);
    }

    let server_addr = config.web_server_addr.clone();
    tracing::info!("Starting Web Server on {}", server_addr);

    let store = Store::open(Path::new(&config.database.path)).map_err(|e| {
        tracing::error!("Failed to open database {}: {}", config.database.path, e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let oracle = HttpConfirmationOracle::new(&config.oracle).map_err(|e| {
        tracing::error!("Invalid oracle configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let oracle_data: web::Data<dyn ConfirmationOracle> =
        web::Data::from(Arc::new(oracle) as Arc<dyn ConfirmationOracle>);

    let config = Arc::new(config);
    let registry = start_registry(store, config.clone());

    let config_data = web::Data::from(config.clone());
    let registry_data = web::Data::new(registry);
    let rate_limiter = RateLimiter::new(&config.rate_limit);

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .wrap(rate_limiter.clone())
            .app_data(config_data.clone())
            .app_data(registry_data.clone())
            .app_data(oracle_data.clone())
            .configure(api::configure)
    })
    .bind(&server_addr)?
    .run()
    .await
}
