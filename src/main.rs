use actix_web::{web, App, HttpServer};
use clap::Parser;
use recipe_feed_proxy::{health, recipes, AppState, Args};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let address = format!("{}:{}", args.ip, args.port);

    let app_state = AppState::from_args(args).map_err(|e| {
        error!("Failed to initialize feed service: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Feed service initialization failed")
    })?;

    info!(
        "Serving recipes from {} (ttl {} min, {} items)",
        app_state.config.feed_url, app_state.config.cache_ttl, app_state.config.limit
    );
    if let Some(path) = &app_state.config.snapshot_path {
        info!("Snapshot file: {}", path);
    }

    let app_state = web::Data::new(app_state);

    info!("Server running at http://{}", address);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .service(recipes)
            .service(health)
    })
    .bind(&address)?
    .run()
    .await
}
