use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ClientConfig {
    /// Map server address for the persistent session
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    pub server: String,

    /// Resource service address (assets, login, images)
    #[arg(short = 'r', long, default_value = "127.0.0.1:8081")]
    pub resources: String,

    /// Login token; doubles as the player name
    #[arg(short = 't', long, default_value = "guest")]
    pub token: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    pub width: u32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    pub height: u32,

    /// Give up on a request or on the initial map state after this long
    #[arg(long, default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Simulation and render passes per second
    #[arg(long, default_value = "60")]
    pub target_fps: u32,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Minimum spacing between two accepted ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::parse_from(["client"])
    }
}
