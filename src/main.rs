use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use chrono::Duration;
use std::io;
use std::sync::Arc;

use imgrank::api::{self, AppState};
use imgrank::auth::AuthService;
use imgrank::config::{Config, OwnerAccount};
use imgrank::store::Store;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables first so RUST_LOG can come from .env
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // Initialize store
    let store = Arc::new(Store::new(&config.database_path).map_err(io::Error::other)?);
    log::info!("Database: {}", config.database_path);

    let auth_service = Arc::new(
        AuthService::new(config.jwt_secret.clone(), store.clone())
            .with_token_ttl(Duration::days(config.token_ttl_days)),
    );

    if let Some(owner) = &config.owner {
        seed_owner(&store, owner);
    }

    let port = config.port;
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            // RequireAuth looks the AuthService up on its own
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(AppState {
                store: store.clone(),
                auth_service: auth_service.clone(),
            }))
            .configure(api::configure_routes)
    });

    log::info!("Starting imgrank server on port {}", port);
    server.bind(("0.0.0.0", port))?.run().await
}

/// Create the configured owner account on an empty database
fn seed_owner(store: &Store, owner: &OwnerAccount) {
    match store.count_users() {
        Ok(0) => {
            log::info!("Creating owner user from environment: {}", owner.username);
            if let Err(e) = store.create_user(&owner.username, &owner.password) {
                log::error!("Failed to create owner user: {}", e);
            }
        }
        Ok(_) => log::debug!("Users already exist, skipping owner creation"),
        Err(e) => log::error!("Failed to count users: {}", e),
    }
}
