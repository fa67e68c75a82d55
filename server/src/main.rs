use clap::Parser;
use log::info;
use server::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Clean Ocean session relay", long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_SERVER_PORT)]
    port: u16,

    /// Relay ticks per second (resends and roster publication)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Room capacity
    #[arg(short, long, default_value = "2")]
    max_clients: usize,

    /// Seconds of silence before a participant is dropped
    #[arg(long, default_value_t = shared::CLIENT_TIMEOUT_SECS)]
    timeout: u64,

    /// Milliseconds before an unacknowledged delivery is resent
    #[arg(long, default_value_t = shared::RESEND_INTERVAL_MS)]
    resend_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    let config = ServerConfig {
        tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
        max_clients: args.max_clients.max(1),
        client_timeout: Duration::from_secs(args.timeout),
        resend_interval: Duration::from_millis(args.resend_ms),
        ..ServerConfig::default()
    };

    let addr = format!("{}:{}", args.host, args.port);
    info!(
        "Starting relay on {} ({} Hz, room of {})",
        addr, tick_rate, config.max_clients
    );

    let mut server = Server::new(&addr, config).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
