//! gEMA command-line interface.
//!
//! # Usage
//!
//! 1. **serve**: Starts the XML-RPC gateway.
//! 2. **signal**: Delivers a message to a running simulator process.
//! 3. **run**: Compiles a configuration file and simulates it in this process.
//!
//! The hidden `worker` subcommand is how the gateway launches simulator
//! processes; it is not meant to be called by hand.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::{fs, process};

use gema::config::{Configuration, ConfigurationData};
use gema::rpc::{self, Gema};
use gema::settings::Settings;
use gema::signal::SignalSender;
use gema::sim::{run_in_process, worker, SimulationManager};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "gEMA simulation control plane")]
struct Args {
    /// Settings file (TOML). Defaults apply to anything it omits.
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the XML-RPC gateway.
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a message to a running simulator process.
    Signal {
        /// Process id of the simulator.
        pid: i32,
        /// Message id, dispatched as the hypercall code.
        id: i64,
        /// JSON object whose keys are identifiers.
        payload: Option<String>,
    },

    /// Simulate a configuration file in this process.
    Run {
        /// JSON file shaped like the `add_config` data argument.
        config: PathBuf,
        #[arg(short, long, default_value = "m5out")]
        outdir: PathBuf,
        #[arg(long, default_value_t = 0)]
        id: i64,
    },

    #[command(hide = true)]
    Worker {
        #[arg(long)]
        job: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("gema: {:#}", err);
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match args.command {
        Command::Serve { port } => serve(settings, port),
        Command::Signal { pid, id, payload } => {
            SignalSender::from_settings(&settings.signal).send(pid, id, payload.as_deref())?;
            println!("Message {} delivered to process {}.", id, pid);
            Ok(())
        }
        Command::Run { config, outdir, id } => {
            let text = fs::read_to_string(&config)
                .with_context(|| format!("failed to read {}", config.display()))?;
            let data: ConfigurationData = serde_json::from_str(&text)
                .with_context(|| format!("invalid configuration in {}", config.display()))?;
            let config = Configuration::from_data(id, data);
            let summary = run_in_process(&config, &outdir, settings.engine.ticks_per_second)?;
            println!(
                "Simulation completed at tick {} with exit cause: {}",
                summary.tick, summary.cause
            );
            Ok(())
        }
        Command::Worker { job } => {
            worker::run_encoded(&job)?;
            Ok(())
        }
    }
}

fn serve(mut settings: Settings, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        settings.server.port = port;
    }
    if settings.server.rpc_path.is_empty() || !settings.server.rpc_path.starts_with('/') {
        bail!("rpc_path must start with '/': {:?}", settings.server.rpc_path);
    }

    let manager = SimulationManager::from_settings(settings.simulation.clone(), &settings.engine)
        .context("failed to locate the worker executable")?;
    let gema = Gema::new(manager);

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    runtime
        .block_on(rpc::serve(&settings.server, gema))
        .context("gateway server failed")?;
    Ok(())
}
