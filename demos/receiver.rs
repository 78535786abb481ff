//! Simple receiver session server
//!
//! Pass a JSON config path as the first argument, or run with defaults.
//! Set `RUST_LOG=airplay_lite=debug` for protocol traces.

use std::sync::Arc;

use airplay_lite::{PlaybackControl, ServerConfig, SessionServer};
use tracing_subscriber::EnvFilter;

struct PrintPlayback;

impl PlaybackControl for PrintPlayback {
    fn play(&self) {
        println!("Playback started!");
    }

    fn pause(&self) {
        println!("Paused");
    }

    fn stop(&self) {
        println!("Playback stopped");
    }

    fn flush(&self) {
        println!("Flushed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_json_file(path)?,
        None => ServerConfig::with_name("Rust AirPlay Receiver"),
    };

    let mut server = SessionServer::new(config);
    server.set_playback_handler(Some(Arc::new(PrintPlayback)));
    server.set_volume_handler(Some(Arc::new(|linear: f32| {
        if linear <= 0.0 {
            println!("Muted");
        } else {
            println!("Volume: {:.0}%", linear * 100.0);
        }
    })));

    server.start().await?;
    if let Some(addr) = server.local_addr() {
        println!(
            "Receiver '{}' listening on {addr}. Press Ctrl+C to stop.",
            server.config().device_name
        );
    }

    // Serve until the shutdown signal
    server.run_until(tokio::signal::ctrl_c()).await?;

    // Cleanup
    server.stop().await;
    println!("Receiver stopped.");

    Ok(())
}
