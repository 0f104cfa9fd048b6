use clap::Parser;
use log::{error, info};
use server::assets::AssetStore;
use server::game::GameState;
use server::network::{MapServer, ServerSettings};
use server::players::PlayerDirectory;
use server::resources::ResourceService;
use server::ServerError;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Map session port
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Resource service port
    #[clap(short, long, default_value = "8081")]
    resource_port: u16,
    /// Asset directory
    #[clap(short, long, default_value = "assets")]
    assets: String,
    /// Map new players start on
    #[clap(short, long, default_value = "town")]
    start_map: String,
    /// Wandering NPCs per map
    #[clap(short, long, default_value = "2")]
    wanderers: usize,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "20")]
    tick_rate: u32,
    /// Maximum concurrent map sessions
    #[clap(short, long, default_value = "64")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting server...");
    info!("Assets: {}", args.assets);
    info!("Tick rate: {} Hz", args.tick_rate);

    let assets = Arc::new(AssetStore::load(&args.assets)?);
    let start = assets
        .map(&args.start_map)
        .ok_or_else(|| ServerError::UnknownStartMap(args.start_map.clone()))?;
    let players = Arc::new(RwLock::new(PlayerDirectory::new(&args.start_map, start.spawn)));

    let resources = ResourceService::bind(
        &format!("{}:{}", args.host, args.resource_port),
        Arc::clone(&assets),
        Arc::clone(&players),
    )
    .await?;

    let settings = ServerSettings {
        tick_rate: args.tick_rate,
        wanderers: args.wanderers,
        max_clients: args.max_clients,
    };
    let map_server = MapServer::bind(
        &format!("{}:{}", args.host, args.port),
        GameState::new(assets),
        players,
        settings,
    )
    .await?;

    let resource_handle = tokio::spawn(resources.run());
    let map_handle = tokio::spawn(map_server.run());

    tokio::select! {
        result = resource_handle => {
            match result {
                Ok(Err(e)) => error!("Resource service stopped: {}", e),
                Err(e) => error!("Resource service task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        result = map_handle => {
            match result {
                Ok(Err(e)) => error!("Map server stopped: {}", e),
                Err(e) => error!("Map server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
