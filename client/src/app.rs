//! Client boot sequence, run on the world thread.

use crate::cache::AssetCache;
use crate::config::ClientConfig;
use crate::entity::BehaviorRegistry;
use crate::error::ClientError;
use crate::graphics::FrameSink;
use crate::input::InputSource;
use crate::network::NetworkDataSource;
use crate::rendering::WorldRenderer;
use crate::world::WorldManager;
use log::{error, info};
use std::sync::Arc;

/// Shows progress on `graphics`, logs in, loads the world and runs it until
/// the window closes or the session ends.
pub async fn run<G, I>(config: ClientConfig, graphics: &mut G, input: &I) -> Result<(), ClientError>
where
    G: FrameSink,
    I: InputSource,
{
    let size = graphics.size();
    if size.width == 0 || size.height == 0 {
        error!("Failed to initialize graphics context!");
        return Err(ClientError::Graphics(format!(
            "canvas is {}x{}",
            size.width, size.height
        )));
    }

    let mut renderer = WorldRenderer::new();
    renderer.show_loading_message(graphics, "Starting things up...");

    let source = Arc::new(NetworkDataSource::new(
        &config.server,
        &config.resources,
        config.request_timeout(),
    ));
    let cache = AssetCache::new(Arc::clone(&source));
    let mut world = WorldManager::new(
        source,
        cache,
        BehaviorRegistry::with_builtins(),
        config.request_timeout(),
        config.frame_interval(),
    );

    renderer.show_loading_message(graphics, "Initializing world...");
    if let Err(e) = world.initialize(&config.token).await {
        error!("Failed to initialize world manager: {}", e);
        renderer.show_loading_message(graphics, "Could not load the world.");
        return Err(e);
    }

    renderer.show_loading_message(graphics, "World loaded! Starting rendering engine...");
    info!("Rendering engine started.");
    world.run_world(graphics, input, &mut renderer).await
}
