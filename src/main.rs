//! Animatronic head controller: tracks faces, moves its eyes and speaks lines read from stdin.

use animatronic_motion::app::Animatronic;
use animatronic_motion::config::Config;
use animatronic_motion::worker::Shutdown;
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// First camera index to try
    #[arg(long)]
    camera_index: Option<i32>,

    /// Serial port of the servo controller (scanned when omitted)
    #[arg(short, long)]
    port: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(index) = args.camera_index {
        config.camera.index = index;
    }
    if let Some(port) = args.port {
        config.actuator.port = Some(port);
    }

    if args.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let mut head = Animatronic::start(config)?;
    info!(
        "Ready (camera: {}, tracking: {}, actuator: {}). Type text to speak; /stop, /snap, /status, /exit",
        head.camera_active(),
        head.tracking_active(),
        head.actuator_connected()
    );

    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    let pending = rx.clone();
    let exiting = Shutdown::new();
    let speaker_exit = exiting.clone();
    let speech = head.speech();
    let speaker = thread::Builder::new().name("speaker".to_string()).spawn(move || {
        while let Ok(line) = rx.recv() {
            if speaker_exit.is_triggered() {
                break;
            }
            // Feed word by word, the way a streaming text source would
            let spoken = speech.stream_text(line.split_inclusive(' '));
            debug!("Stream finished: {spoken:?}");
        }
    })?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "" => {}
            "/exit" => break,
            "/stop" => {
                let dropped = pending.try_iter().count();
                if dropped > 0 {
                    info!("Discarded {dropped} queued lines");
                }
                head.stop_speech();
            }
            "/snap" => match head.capture_snapshot() {
                Some(path) => println!("{}", path.display()),
                None => println!("No frame available"),
            },
            "/status" => {
                println!(
                    "speaking: {}, camera: {}, tracking: {}, actuator: {}, recording: {}",
                    head.is_speaking(),
                    head.camera_active(),
                    head.tracking_active(),
                    head.actuator_connected(),
                    head.is_recording()
                );
                for (name, state) in head.worker_states() {
                    println!("  {name}: {state:?}");
                }
            }
            text if text.starts_with('/') => warn!("Unknown command: {text}"),
            text => tx.send(text.to_string())?,
        }
    }

    exiting.trigger();
    drop(tx);
    head.stop_speech();
    speaker.join().map_err(|_| anyhow!("speaker thread panicked"))?;
    head.shutdown();

    Ok(())
}
