use clap::{Parser, ValueEnum};
use client::network::{self, ClientSettings};
use client::sensor::{PoseData, SensorListener};
use log::{info, warn};
use shared::{MatchConfig, Role, DEFAULT_SENSOR_PORT, DEFAULT_SERVER_PORT};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Cleaner,
    Polluter,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Cleaner => Role::Cleaner,
            RoleArg::Polluter => Role::Polluter,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_SERVER_PORT))]
    server: String,

    /// Display name sent to the relay
    #[arg(short = 'n', long, default_value = "")]
    name: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Ticks per second
    #[arg(short = 't', long, default_value = "60")]
    tick_rate: u32,

    /// UDP port the phone/gesture sensor sends pose data to
    #[arg(long, default_value_t = DEFAULT_SENSOR_PORT)]
    sensor_port: u16,

    /// Do not listen for sensor data
    #[arg(long)]
    no_sensor: bool,

    /// Practice without a relay, playing this role
    #[arg(long, value_enum)]
    offline: Option<RoleArg>,

    /// JSON file with match settings
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Override the match duration in seconds
    #[arg(short = 'd', long)]
    duration: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MatchConfig::from_json_file(path)?,
        None => MatchConfig::default(),
    };
    if let Some(duration) = args.duration {
        config.match_duration = duration;
    }
    config.validate()?;

    let settings = ClientSettings {
        server: args.server.clone(),
        name: args.name.clone(),
        fake_ping_ms: args.fake_ping,
        tick_duration: Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64),
        ..ClientSettings::default()
    };

    let (pose_tx, pose_rx) = watch::channel(PoseData::default());
    let _sensor = if args.no_sensor {
        None
    } else {
        match SensorListener::spawn(&format!("0.0.0.0:{}", args.sensor_port), pose_tx) {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!("Sensor input unavailable: {}", e);
                None
            }
        }
    };

    let commands = network::spawn_command_reader();

    info!("Starting participant...");
    info!("Match: {:.0}s, countdown {}s", config.match_duration, config.countdown_seconds);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("{}", client::input::HELP);

    let mut client = match args.offline {
        Some(role) => network::Client::offline(settings, config, role.into(), pose_rx, commands),
        None => {
            info!("Connecting to: {}", args.server);
            network::Client::connect(settings, config, pose_rx, commands).await?
        }
    };

    client.run().await?;

    Ok(())
}
