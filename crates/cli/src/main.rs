//! CLI entry point for Media Batch
//!
//! Converts a set of input files with the media tool, two at a time, and
//! prints progress as it goes. Ctrl-C cancels the run and removes partial
//! outputs.

mod inputs;
mod logging;
mod render;

use clap::Parser;
use media_batch::{
    check_tool_available, resolve_tool_path, ChannelSink, Config, ConvertProvider, RunEvent,
    Scheduler,
};
use render::{render_event, Format};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Media Batch - bounded-concurrency media conversion
#[derive(Parser, Debug)]
#[command(name = "media-batch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Media tool binary, overriding the configured location
    #[arg(long)]
    tool: Option<PathBuf>,

    /// Directory receiving the converted files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Target container extension
    #[arg(short, long, default_value = "mp4")]
    extension: String,

    /// Extra argument passed to the tool before the output path (repeatable)
    #[arg(long = "tool-arg", allow_hyphen_values = true)]
    tool_args: Vec<String>,

    /// Print every event as a JSON line
    #[arg(long)]
    json: bool,

    /// Skip the tool availability check
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Input files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&config.logging.filter) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let tool_path = match args.tool.clone() {
        Some(path) => path,
        None => match resolve_tool_path(&config.tool) {
            Ok(path) => path,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    if args.skip_checks {
        warn!("Skipping tool check (--skip-checks enabled)");
    } else {
        match check_tool_available(&tool_path) {
            Ok(version) => info!(tool = %tool_path.display(), version = %version, "tool available"),
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let files = inputs::collect_inputs(&args.inputs);
    if files.is_empty() {
        eprintln!("No input files found");
        return ExitCode::FAILURE;
    }

    let format = if args.json { Format::Json } else { Format::Text };
    let (sink, mut events) = ChannelSink::new();
    let provider = ConvertProvider::new(args.output_dir.clone(), args.extension.as_str())
        .with_extra_args(args.tool_args.clone());
    let mut scheduler = Scheduler::new(&config, tool_path, provider, Arc::new(sink));

    if let Err(e) = scheduler.setup(files).await {
        eprintln!("Cannot prepare run: {}", e);
        return ExitCode::FAILURE;
    }
    let scheduler = Arc::new(scheduler);

    let launcher = match scheduler.start_all("Converting").await {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let interrupt = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling");
                scheduler.cancel("user").await;
            }
        })
    };

    let mut terminal = None;
    while let Some(event) = events.recv().await {
        if let Some(text) = render_event(&event, format) {
            println!("{}", text);
        }
        if event.is_terminal() {
            terminal = Some(event);
            break;
        }
    }
    interrupt.abort();

    match terminal {
        Some(RunEvent::Finished {
            cancelled: false, ..
        }) => {
            // Processes have all exited; let the watchers wind down
            let _ = launcher.await;
            let stats = scheduler.stats().await;
            info!(jobs = stats.finished, peak = stats.peak_running, "all jobs finished");
            ExitCode::SUCCESS
        }
        Some(RunEvent::Finished { cancelled: true, .. }) => {
            let _ = launcher.await;
            ExitCode::FAILURE
        }
        // Leaving the runtime drops the remaining children, which kills them
        _ => ExitCode::FAILURE,
    }
}
