use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use tracing::{error, info, warn};
use vyapar::api::middleware::ApiKeyAuth;
use vyapar::cli::{
    commands::{Cli, Commands},
    run_cli,
};
use vyapar::config::AppConfig;
use vyapar::db::Store;

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting Vyapar server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store = match Store::open(&config.database) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    if config.auth.api_keys.is_empty() {
        if config.auth.allow_anonymous {
            warn!("No api keys configured and auth.allow_anonymous is set; the API is open");
        } else {
            warn!("No api keys configured; every request except /health will be refused");
        }
    }

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(store.clone()))
            .route("/health", web::get().to(health))
            .wrap(ApiKeyAuth)
            .configure(vyapar::api::routes::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
