use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use netglobe_capture::devices;
use netglobe_config::NetglobeConfig;
use netglobe_engine::{init_telemetry, run_production_mode};

#[derive(Parser)]
#[command(name = "netglobe", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture traffic and serve viewers
    Run(RunArgs),
    /// List capture devices with their addresses
    ListDevices(ListDevicesArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// YAML configuration file; defaults to config/netglobe.yaml when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub interface: Option<String>,

    /// Address classifying flows, instead of the interface's first IPv4
    #[arg(long)]
    pub local_address: Option<Ipv4Addr>,

    #[arg(long)]
    pub geolite2_path: Option<PathBuf>,

    /// Home latitude
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Home longitude
    #[arg(long, allow_negative_numbers = true)]
    pub lng: Option<f64>,

    /// Minimum batch size before broadcasting
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds between broadcasts
    #[arg(long)]
    pub interval: Option<u64>,

    /// Per-packet debug lines for large payloads
    #[arg(long)]
    pub debug: Option<bool>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory of static viewer assets to serve
    #[arg(long)]
    pub frontend_dir: Option<PathBuf>,

    /// Enable periodic snapshot uploads
    #[arg(long)]
    pub snapshots: bool,

    #[arg(long)]
    pub log_level: Option<String>,
}

impl RunArgs {
    /// Applies flags on top of `config`. Unset flags leave it untouched.
    pub fn apply(&self, config: &mut NetglobeConfig) {
        if let Some(interface) = &self.interface {
            config.capture.interface = interface.clone();
        }
        if let Some(address) = self.local_address {
            config.capture.local_address = Some(address);
        }
        if let Some(path) = &self.geolite2_path {
            config.geo.database_path = path.clone();
        }
        if let Some(lat) = self.lat {
            config.pipeline.home.lat = lat;
        }
        if let Some(lng) = self.lng {
            config.pipeline.home.lng = lng;
        }
        if let Some(batch_size) = self.batch_size {
            config.pipeline.batch_size = batch_size;
        }
        if let Some(interval) = self.interval {
            config.pipeline.broadcast_interval_secs = interval;
        }
        if let Some(debug) = self.debug {
            config.pipeline.debug = debug;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.frontend_dir {
            config.server.frontend_dir = Some(dir.clone());
        }
        if self.snapshots {
            config.storage.enabled = true;
        }
        if let Some(level) = &self.log_level {
            config.telemetry.log_level = level.clone();
        }
    }

    pub fn load_config(&self) -> anyhow::Result<NetglobeConfig> {
        let mut config = match &self.config {
            Some(path) => NetglobeConfig::load_from_path(path)?,
            None => NetglobeConfig::load()?,
        };
        self.apply(&mut config);
        Ok(config.revalidate()?)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListDevicesArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.load_config().context("Invalid configuration")?;
    let metrics = init_telemetry(&config.telemetry.log_level)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
        ctrl_c.cancel();
    });

    run_production_mode(&config, metrics, cancel).await?;
    Ok(())
}

pub fn list_devices(args: ListDevicesArgs) -> anyhow::Result<()> {
    let found = devices::list()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        print!("{}", devices::render_text(&found));
    }
    Ok(())
}
