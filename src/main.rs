use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use northstar_server::{configure_routes, AppState, Settings};
use std::net::TcpListener;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

fn cors(config: &Settings) -> Cors {
    if !config.cors.enabled {
        return Cors::default();
    }

    let cors = if config.cors.allow_any_origin {
        Cors::default().allow_any_origin()
    } else {
        config
            .cors
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allowed_methods(vec!["GET", "POST", "PUT"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(config.cors.max_age as usize)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("northstar_server=info,actix_web=info")),
        )
        .with_target(false)
        .with_line_number(true)
        .init();

    let config = Settings::new().context("loading configuration")?;
    info!("Configuration loaded ({} environment)", config.environment);

    let state = AppState::new(config.clone())
        .await
        .context("initialising application state")?;
    let state = web::Data::new(state);

    // Expired sessions, magic links and idle rate-limit windows
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match cleanup_state.auth_service.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {} expired sign-in records", removed),
                Err(e) => error!("Cleanup failed: {}", e),
            }
        }
    });

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&address).with_context(|| format!("binding {address}"))?;
    info!("Listening on http://{}", address);

    let workers = config.server.workers as usize;
    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors(&config))
            .app_data(server_state.clone())
            .configure(configure_routes)
    })
    .listen(listener)?
    .workers(workers)
    .run()
    .await?;

    state.shutdown().await?;
    info!("Server stopped");
    Ok(())
}
