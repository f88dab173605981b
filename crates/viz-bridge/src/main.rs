use anyhow::Result;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use viz_bridge::{AudioShmReader, Bridge, Config, Registry};

/// Supervised runtime for visual components. Speaks newline-delimited
/// JSON over stdin/stdout; logs go to stderr or a file.
#[derive(Parser)]
#[command(name = "viz-bridge", version)]
struct Args {
    /// Directory scanned for component plugins
    #[arg(long)]
    plugins_dir: Option<PathBuf>,

    /// Shared-memory region name published by the audio engine
    #[arg(long)]
    shm_name: Option<String>,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));

    // stdout carries the protocol, so logs must never land there.
    match &args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = Config::load();
    let plugins_dir = args.plugins_dir.unwrap_or_else(|| config.plugins_dir());
    let shm_name = args.shm_name.unwrap_or_else(|| config.shm_name());

    info!("Starting viz-bridge (plugins: {plugins_dir:?}, shm: '{shm_name}')");

    let mut registry = Registry::new(plugins_dir);
    registry.scan();

    let mut bridge = Bridge::new(registry, AudioShmReader::new(shm_name));
    let stdin = io::stdin();
    let stdout = io::stdout();
    bridge.run(stdin.lock(), stdout.lock());

    info!("viz-bridge stopped");
    Ok(())
}
