use std::sync::Arc;

use foodgram::{
    config::Config,
    error::{ApiError, Error},
    jwt::SessionKeys,
    media::MediaStorage,
    postgres::PgStore,
    routes::{routes, AppContext},
};
use log::{error, info};

async fn run(config: Config) -> Result<(), Error> {
    let store = PgStore::connect(&config.database_url, config.max_connections).await?;
    store.migrate().await?;
    info!("Database migrations applied");

    let context = AppContext::new(
        Arc::new(store),
        MediaStorage::new(config.media_root.clone(), &config.base_url),
        SessionKeys::new(&config.jwt_secret, config.jwt_lifetime_hours)?,
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
        }
    };
    let (address, server) = warp::serve(routes(context))
        .try_bind_with_graceful_shutdown(config.bind_address, shutdown)
        .map_err(|e| ApiError::Internal.new(&format!("Failed to bind: {e}")))?;

    info!("Listening on {address}");
    server.await;
    info!("Server stopped");

    Ok(())
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    config.logger().init();

    if let Err(e) = run(config).await {
        error!("{e}");
        std::process::exit(1);
    }
}
