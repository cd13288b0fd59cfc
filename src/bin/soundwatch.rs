use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use soundwatch::audio::InputDeviceInfo;
use soundwatch::engine::CpalBackend;
use soundwatch::{AppConfig, EngineHandle};
use tokio_stream::StreamExt;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "soundwatch",
    about = "Continuous microphone sound-event detection"
)]
struct Cli {
    /// JSON configuration file (defaults are used when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the classification server base URL
    #[arg(long, global = true)]
    server: Option<String>,
    /// Override the directory for persisted state and recordings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture continuously and print every decision as a JSON line
    Listen,
    /// Print the cached recent decisions, newest first
    History,
    /// Submit correctness feedback for a cached decision
    Evaluate(EvaluateArgs),
    /// Print the reference sound classes
    Classes {
        /// Bypass the in-memory snapshot and fetch from the server
        #[arg(long)]
        refresh: bool,
    },
    /// Query the classification server health endpoint
    Health,
    /// List available input devices
    Devices,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    recording_id: String,
    #[arg(long, conflicts_with = "incorrect", required_unless_present = "incorrect")]
    correct: bool,
    #[arg(long)]
    incorrect: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> AppConfig {
    let mut config = cli
        .config
        .as_ref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();
    if let Some(server) = &cli.server {
        config.server.base_url = server.trim_end_matches('/').to_string();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = Some(data_dir.clone());
    }
    config
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli);

    match cli.command {
        Commands::Devices => run_devices(),
        Commands::Listen => run_listen(EngineHandle::from_config(config)).await,
        Commands::History => run_history(&EngineHandle::from_config(config)),
        Commands::Evaluate(args) => {
            run_evaluate(&EngineHandle::from_config(config), &args.recording_id, args.correct)
                .await
        }
        Commands::Classes { refresh } => {
            run_classes(&EngineHandle::from_config(config), refresh).await
        }
        Commands::Health => run_health(&EngineHandle::from_config(config)).await,
    }
}

async fn run_listen(engine: EngineHandle) -> Result<ExitCode> {
    let mut decisions = engine.decision_stream();
    engine
        .start()
        .await
        .context("starting continuous capture")?;
    tracing::info!("Listening; press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                break;
            }
            next = decisions.next() => match next {
                Some(decision) => print_json(&decision)?,
                None => break,
            },
        }
    }

    engine.shutdown().await;
    Ok(ExitCode::from(0))
}

fn run_history(engine: &EngineHandle) -> Result<ExitCode> {
    let loaded = engine
        .results()
        .load_persisted()
        .context("loading cached decisions")?;
    if loaded == 0 {
        eprintln!("No cached decisions");
    }
    for decision in engine.results().entries() {
        print_json(&decision)?;
    }
    Ok(ExitCode::from(0))
}

async fn run_evaluate(engine: &EngineHandle, recording_id: &str, correct: bool) -> Result<ExitCode> {
    engine
        .results()
        .load_persisted()
        .context("loading cached decisions")?;

    match engine.evaluate_recording(recording_id, correct).await {
        Some(true) => {
            println!("Evaluation for {recording_id} submitted");
            Ok(ExitCode::from(0))
        }
        Some(false) => {
            eprintln!("Evaluation for {recording_id} was not accepted");
            Ok(ExitCode::from(2))
        }
        None => {
            eprintln!("No cached decision for recording {recording_id}");
            Ok(ExitCode::from(2))
        }
    }
}

async fn run_classes(engine: &EngineHandle, refresh: bool) -> Result<ExitCode> {
    let classes = engine.reference().get(refresh).await;
    for class in &classes {
        print_json(class)?;
    }
    Ok(ExitCode::from(0))
}

async fn run_health(engine: &EngineHandle) -> Result<ExitCode> {
    let status = engine
        .check_health()
        .await
        .context("querying server health")?;
    print_json(&status)?;
    Ok(if status.is_healthy() {
        ExitCode::from(0)
    } else {
        ExitCode::from(2)
    })
}

fn run_devices() -> Result<ExitCode> {
    let devices = CpalBackend::list_input_devices().context("enumerating input devices")?;
    for device in &devices {
        println!("{}", describe_device(device));
    }
    Ok(ExitCode::from(0))
}

fn describe_device(device: &InputDeviceInfo) -> String {
    let rate = device
        .sample_rate
        .map_or_else(|| "?".to_string(), |rate| rate.to_string());
    let channels = device
        .channels
        .map_or_else(|| "?".to_string(), |channels| channels.to_string());
    format!(
        "{}{} ({} Hz, {} ch)",
        if device.is_default { "* " } else { "  " },
        device.name,
        rate,
        channels
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
