//! Relay configuration, read from the command line or the environment.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Command-line arguments for the relay.
#[derive(Debug, Clone, Parser)]
#[command(name = "inkroom-server")]
#[command(about = "Inkroom WebSocket room relay")]
#[command(version)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "INKROOM_BIND", default_value = "0.0.0.0:3030")]
    pub bind: SocketAddr,

    /// Seconds an empty room is kept before it is dropped
    #[arg(long, env = "INKROOM_ROOM_IDLE_SECS", default_value_t = 60)]
    pub room_idle_secs: u64,

    /// Seconds between sweeps for idle rooms
    #[arg(long, env = "INKROOM_REAPER_INTERVAL_SECS", default_value_t = 10)]
    pub reaper_interval_secs: u64,

    /// Per-room broadcast buffer, in messages
    #[arg(long, env = "INKROOM_CHANNEL_CAPACITY", default_value_t = 256)]
    pub channel_capacity: usize,
}

impl ServerConfig {
    pub fn room_idle(&self) -> Duration {
        Duration::from_secs(self.room_idle_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        // tokio intervals panic on a zero period.
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3030)),
            room_idle_secs: 60,
            reaper_interval_secs: 10,
            channel_capacity: 256,
        }
    }
}
