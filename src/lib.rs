use std::env;
use std::path::PathBuf;
use clap::Parser;
use log::info;

use crate::config::io::read_config;
use crate::config::types::SessionConfig;
use crate::console::application::run_console;
use crate::device::btle::BtleTransport;
use crate::device::mock::MockTransport;
use crate::error::AppRunError;

pub mod config;
pub mod console;
pub mod device;
pub mod error;

#[derive(Parser, Debug)]
#[command(version, about = "Read and write the BLE User Data record of a nearby peripheral")]
pub struct Args {
    /// JSON file with session settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// How long a scan runs before it stops, in milliseconds
    #[arg(long)]
    pub scan_dwell_ms: Option<u64>,

    /// Use simulated peripherals instead of the bluetooth adapter
    #[arg(long)]
    pub simulate: bool,
}

pub fn init_logging() {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

async fn load_config(args: &Args) -> Result<SessionConfig, AppRunError> {
    let mut config = match &args.config {
        Some(path) => read_config(path).await?,
        None => SessionConfig::default(),
    };

    if let Some(scan_dwell_ms) = args.scan_dwell_ms {
        config.scan_dwell_ms = scan_dwell_ms;
    }

    Ok(config)
}

pub fn run(args: env::Args) -> Result<(), AppRunError> {
    let args = Args::parse_from(args);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let config = load_config(&args).await?;
        info!("Scan dwell {} ms, service filter {:?}", config.scan_dwell_ms, config.service_filter);

        if args.simulate {
            info!("Using simulated peripherals");
            run_console(MockTransport::with_sample_data(), config).await
        } else {
            run_console(BtleTransport::new(), config).await
        }
    })
}
