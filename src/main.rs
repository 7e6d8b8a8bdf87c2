mod api;
mod commands;
mod config;
mod console;
mod db;
mod engine;
mod error;
mod models;
mod results;
mod roster;
mod state;
mod tasks;

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::BufReader;

use config::Config;
use db::Database;
use roster::{JsonFileSource, Roster};
use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let database =
        match Database::connect(&config.database_url, config.database_max_connections).await {
            Ok(db) => db,
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                return;
            }
        };

    let roster = Arc::new(Roster::new(Box::new(JsonFileSource::new(&config.roster_path))));
    if let Err(e) = roster.refresh().await {
        warn!("Starting with an empty roster: {}", e);
    }

    if let Some(period) = config.roster_refresh {
        let roster = Arc::clone(&roster);
        tokio::spawn(async move {
            tasks::roster_refresh::refresh_roster_task(roster, period).await;
        });
    }

    let state = Arc::new(AppState::new(database.clone(), roster));

    let listener = match tokio::net::TcpListener::bind(config.results_bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind results server to {}: {}", config.results_bind, e);
            return;
        }
    };
    info!("Serving poll results on http://{}", config.results_bind);
    let app = api::router(Arc::clone(&state));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Results server error: {}", e);
        }
    });

    info!("Reading commands from stdin as `<team> <voter> <command>`");
    let stdin = BufReader::new(tokio::io::stdin());
    if let Err(e) = console::run(&state, &config, stdin, tokio::io::stdout()).await {
        error!("Console error: {}", e);
    }

    info!("Console closed; serving results until Ctrl-C");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }

    database.close().await;
    info!("Shut down");
}
