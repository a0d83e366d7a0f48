use std::io::Result;
use std::net::IpAddr;
use std::sync::Arc;

use clap::Parser;
use env_logger::Builder;
use log::{debug, info, LevelFilter};

use sdnd::{config, serve, ControllerConfig, SessionManager};

#[derive(Parser, Debug)]
#[clap(name = "sdnd", rename_all = "kebab-case")]
/// OpenFlow 1.3 learning-switch controller with time-based meters
pub struct Args {
    /// Path to controller config.toml (defaults used if not provided)
    #[clap(short, long)]
    config: Option<String>,
    /// Listen address for switch connections (overrides config)
    #[clap(short, long)]
    address: Option<IpAddr>,
    /// Listen port for switch connections (overrides config)
    #[clap(short, long)]
    port: Option<u16>,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences))]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (sdnd_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("sdnd"), sdnd_level)
        .filter(None, other_level)
        .init();
    info!("Logging at levels {}/{}", sdnd_level, other_level);

    let mut config = match &args.config {
        Some(path) => {
            let config = config::from_file(path)?;
            debug!("Loaded config from {}", path);
            config
        }
        None => ControllerConfig::default(),
    };
    if let Some(address) = args.address {
        config.listen_address = address;
    }
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    debug!("{:?}", config);

    let config = Arc::new(config);
    let manager = Arc::new(SessionManager::new(Arc::clone(&config)));

    tokio::select! {
        result = serve(config, manager) => result?,
        _ = tokio::signal::ctrl_c() => info!("Stopping sdnd..."),
    }
    Ok(())
}
