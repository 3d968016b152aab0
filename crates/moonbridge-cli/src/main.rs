use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use moonbridge_host::{setup_reload_signal, take_reload, BridgeConfig, ScriptRunner};

mod logging;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug logging (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory containing top-level scripts
    #[arg(short, long)]
    script_dir: Option<PathBuf>,

    /// Directory containing mods
    #[arg(short, long)]
    mods_dir: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Exit after this many host ticks instead of waiting for Ctrl-C
    #[arg(long)]
    ticks: Option<u64>,
}

fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match BridgeConfig::config_path().filter(|path| path.exists()) {
            Some(path) => BridgeConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => {
                info!("No config found, using defaults");
                BridgeConfig::default()
            }
        },
    };

    // Command line wins over the config file
    if let Some(script_dir) = &cli.script_dir {
        config.script_dir = Some(script_dir.clone());
    }
    if let Some(mods_dir) = &cli.mods_dir {
        config.mods_dir = Some(mods_dir.clone());
    }
    Ok(config)
}

async fn run(config: BridgeConfig, max_ticks: Option<u64>) -> Result<()> {
    let mut runner = ScriptRunner::from_config(&config)?;
    info!(
        "Running {} script(s) from {} every {:?}",
        runner.script_count(),
        config.script_dir().display(),
        config.tick_interval()
    );

    let mut reload_rx = setup_reload_signal();
    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            now = interval.tick() => {
                if take_reload(&mut reload_rx) {
                    if let Err(e) = runner.reload() {
                        error!(target: "scripting", "Script reload failed: {:#}", e);
                    }
                }

                runner.tick(now.into_std());
                for event in runner.scene().borrow_mut().take_events() {
                    info!("Scene event: {:?}", event);
                }
                ticks += 1;
                if max_ticks.is_some_and(|max| ticks >= max) {
                    info!("Reached {} ticks, exiting", ticks);
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init_logging(cli.log_file.as_deref(), cli.debug)
        .context("Failed to initialize logging")?;

    info!("Starting moonbridge...");
    let config = load_config(&cli)?;

    // The script environment is single-threaded, so it runs on the current thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(config, cli.ticks))
}
