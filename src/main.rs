use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pulse_relay::config::RelayConfig;
use pulse_relay::server;

#[derive(Parser)]
#[command(name = "pulse-relay")]
#[command(version, about = "Real-time notification relay for long-running workflow jobs")]
struct Cli {
    /// Port to listen on (overrides WS_SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "pulse_relay=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = RelayConfig::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
        // Keep the advertised callback URL in sync unless explicitly set.
        if std::env::var("RELAY_PUBLIC_URL").is_err() {
            config.public_base_url = format!("http://localhost:{port}");
        }
    }

    server::start_server(config).await
}
