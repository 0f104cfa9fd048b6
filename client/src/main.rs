use clap::Parser;
use client::graphics::{CanvasSize, FrameRecorder};
use client::rendering::MacroquadCanvas;
use client::{app, input, ClientConfig};
use log::{error, info};
use macroquad::prelude::*;

fn window_conf() -> Conf {
    let config = ClientConfig::parse();
    Conf {
        window_title: "Tile World".to_string(),
        window_width: config.width as i32,
        window_height: config.height as i32,
        window_resizable: false,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ClientConfig::parse();

    info!("Starting client...");
    info!("Map server: {}", config.server);
    info!("Resource service: {}", config.resources);
    info!("Controls: WASD or arrow keys to move");

    let (mut recorder, frames) = FrameRecorder::new(CanvasSize {
        width: config.width,
        height: config.height,
    });
    let (mut input_manager, shared_input) = input::channel();

    let world = std::thread::spawn(move || -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| e.to_string())?;
        runtime
            .block_on(app::run(config, &mut recorder, &shared_input))
            .map_err(|e| e.to_string())
    });

    let mut canvas = MacroquadCanvas::new();
    let mut world = Some(world);

    loop {
        input_manager.update();

        let frame = frames.borrow().clone();
        canvas.draw(&frame);

        if world.as_ref().is_some_and(|handle| handle.is_finished()) {
            match world.take().map(|handle| handle.join()) {
                Some(Ok(Ok(()))) => info!("World stopped."),
                Some(Ok(Err(e))) => error!("World stopped: {}", e),
                Some(Err(_)) => error!("World thread panicked"),
                None => {}
            }
        }

        next_frame().await;
    }
}
