use clap::{App, Arg};
use lorabase::bridge;
use lorabase::config::Config;
use lorabase::control::{self, ControlState};
use lorabase::link::LinkHandler;
use lorabase::registry::StationRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("lorabase-station")
        .version("0.1.0")
        .author("Ground Segment Engineering Team")
        .about("Base station daemon: control API and wireless link bridge")
        .arg(
            Arg::with_name("config")
                .value_name("CONFIG")
                .help("Path to the JSON configuration file")
                .required(true)
                .index(1),
        )
        .get_matches();

    let config_path = PathBuf::from(matches.value_of("config").unwrap());
    let config = Config::load(&config_path)?;

    let registry = Arc::new(StationRegistry::new());
    for (address, client) in &config.clients {
        registry
            .register(address, client.min_frequency, client.max_frequency)
            .await;
    }
    info!("loaded {} configured station(s)", config.clients.len());

    let control_listener =
        TcpListener::bind(format!("{}:{}", config.hostname, config.port)).await?;
    let bridge_listener =
        TcpListener::bind(format!("{}:{}", config.hostname, config.bridge_port)).await?;

    let control_state = Arc::new(ControlState::new(
        Arc::clone(&registry),
        config,
        config_path,
    ));
    let link_handler = LinkHandler::new(Arc::clone(&registry));

    let control_server = tokio::spawn(async move {
        if let Err(e) = control::serve(control_listener, control_state).await {
            error!("control server error: {}", e);
        }
    });
    let bridge_server = tokio::spawn(async move {
        if let Err(e) = bridge::serve(bridge_listener, link_handler).await {
            error!("link bridge error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    control_server.abort();
    bridge_server.abort();

    Ok(())
}
