//! ballpath - terminal front end
//!
//! Binds the two sensors, then drives the session controller from line
//! commands on stdin while a status line refreshes at the display cadence.
//!
//! ```text
//! t  start test        r  start record      s  stop
//! f  feeding on        F  feeding off
//! v  stimulus on       V  stimulus off
//! w  swap sensors      q  quit
//! ```

use ballpath::EventKind;
use ballpath::config::{AppConfig, RecordLayout};
use ballpath::devices::SensorModel;
use ballpath::display::{Viewport, status_line};
use ballpath::error::{Error, Result};
use ballpath::scheduler::PeriodicTask;
use ballpath::sensor::SensorPair;
use ballpath::session::{SessionController, SessionMode, SessionState, SessionSummary};
use clap::Parser;
use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(name = "ballpath")]
#[command(about = "Track an animal on a ball treadmill with two optical sensors")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sensor model (see --list-models)
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling rate (Hz)
    #[arg(long)]
    rate: Option<f64>,

    /// Effective ball radius
    #[arg(long)]
    radius: Option<f64>,

    /// Calibration factor
    #[arg(long)]
    calibration: Option<f64>,

    /// Recording layout (csv or npy)
    #[arg(long)]
    layout: Option<RecordLayout>,

    /// Print supported sensor models and exit
    #[arg(long)]
    list_models: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start(SessionMode),
    Stop,
    Event(EventKind, bool),
    Swap,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "t" => Some(Command::Start(SessionMode::Testing)),
        "r" => Some(Command::Start(SessionMode::Recording)),
        "s" => Some(Command::Stop),
        "f" => Some(Command::Event(EventKind::Feeding, true)),
        "F" => Some(Command::Event(EventKind::Feeding, false)),
        "v" => Some(Command::Event(EventKind::VisualStimulus, true)),
        "V" => Some(Command::Event(EventKind::VisualStimulus, false)),
        "w" => Some(Command::Swap),
        "q" => Some(Command::Quit),
        _ => None,
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    if let Some(model) = &args.model {
        config.sensor.model = model.clone();
    }
    if let Some(rate) = args.rate {
        config.tracking.sample_rate_hz = rate;
    }
    if let Some(radius) = args.radius {
        config.tracking.ball_radius = radius;
    }
    if let Some(calibration) = args.calibration {
        config.tracking.calibration_factor = calibration;
    }
    if let Some(layout) = args.layout {
        config.recording.layout = layout;
    }

    config.validate()?;
    Ok(config)
}

fn spawn_stdin_reader(tx: Sender<Command>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            return;
                        }
                    }
                    None => log::warn!("Unknown command '{}'", line.trim()),
                }
            }
            // EOF behaves like quit
            let _ = tx.send(Command::Quit);
        })
        .map_err(|e| Error::Other(format!("Failed to spawn stdin reader: {}", e)))?;
    Ok(())
}

fn report(summary: &SessionSummary) {
    println!();
    println!(
        "Session ({:?}) finished: {} updates in {:.2}s",
        summary.mode,
        summary.updates,
        summary.duration.as_secs_f64()
    );
    if let Some(dir) = &summary.output_dir {
        println!("  output: {}", dir.display());
    }
    if summary.evicted > 0 || summary.storage_failures > 0 {
        println!(
            "  evicted: {}  storage failures: {}  unflushed: {}",
            summary.evicted, summary.storage_failures, summary.unflushed
        );
    }
}

fn handle(controller: &mut SessionController, command: Command) -> Result<()> {
    match command {
        Command::Start(SessionMode::Testing) => controller.start_test(),
        Command::Start(SessionMode::Recording) => controller.start_record(),
        Command::Stop => controller.stop().map(|summary| report(&summary)),
        Command::Event(kind, on) => controller.mark_event(kind, on).map(|_| ()),
        Command::Swap => controller.swap_sensors(),
        Command::Quit => Ok(()),
    }
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if args.list_models {
        for name in SensorModel::names() {
            println!("{}", name);
        }
        return Ok(());
    }

    log::info!("ballpath v{} starting", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Sensor model: {} (ordinals {} and {})",
        config.sensor.model,
        config.sensor.primary_ordinal,
        config.sensor.secondary_ordinal
    );

    let sensors = SensorPair::bind(&config.sensor)?;
    let mut controller = SessionController::new(sensors, config.clone())?;

    let (tx, rx) = unbounded();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        let _ = ctrlc_tx.send(Command::Quit);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;
    spawn_stdin_reader(tx)?;

    // Display cadence is independent of the sampling cadence
    let state = Arc::new(Mutex::new(SessionState::Idle));
    let display_state = Arc::clone(&state);
    let monitor = controller.monitor();
    let mut viewport = Viewport::new(config.display.canvas_half_size);
    let display = PeriodicTask::spawn("display-refresh", config.display.refresh_period(), move || {
        let state = *display_state.lock();
        if state == SessionState::Idle {
            viewport.reset();
            return;
        }
        let telemetry = monitor.telemetry();
        viewport.follow(telemetry.pose.x, telemetry.pose.y);
        let trail = monitor.trail();
        let visible = viewport.visible(&trail).count();
        print!("\r{}", status_line(state, &telemetry, &viewport, visible));
        let _ = io::stdout().flush();
    })?;

    println!("Commands: t=test r=record s=stop f/F=feeding v/V=stimulus w=swap q=quit");

    for command in rx.iter() {
        if command == Command::Quit {
            break;
        }
        if let Err(e) = handle(&mut controller, command) {
            log::warn!("{:?} rejected: {}", command, e);
        }
        *state.lock() = controller.state();
    }

    display.stop()?;
    if controller.state() != SessionState::Idle {
        let summary = controller.stop()?;
        report(&summary);
    }

    log::info!("ballpath stopped");
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
