//! `radartrack` CLI: live tracking, history replay, scenario runs.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{bounded, RecvTimeoutError};
use ingest::{LinkSink, MqttConfig, MqttLink, SerialConfig, SerialLink, Transport};
use sensor_models::SensorMount;
use serde::{Deserialize, Serialize};
use sim::{drive_pipeline, Recording, ReplayConfig, ReplayPlayer, Scenario, ScenarioKind};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;
use tracker_core::{
    HistoryStore, LiveConfig, LiveTracker, LiveView, Pipeline, PipelineConfig, SmoothingConfig,
    Stamp, DATA_TIMEOUT,
};

#[derive(Parser)]
#[command(name = "radartrack", about = "LD2450 radar target tracker")]
struct Cli {
    /// JSON settings file; missing keys take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track targets from the sensor until stdin closes or the duration ends.
    Live {
        #[arg(long, value_enum)]
        input: Option<InputMode>,
        /// MQTT broker host
        #[arg(long)]
        broker: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        topic: Option<String>,
        /// Serial device
        #[arg(long)]
        serial_port: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,
        /// Status print interval (ms)
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Play back a recorded track history.
    Replay {
        file: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Start at this fraction of the recording (0..1)
        #[arg(long)]
        seek: Option<f64>,
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
    /// Run a simulated scenario through the codec and the tracking engine.
    Simulate {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Write a JSON summary here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List today's most recent recordings.
    Recent {
        #[arg(long)]
        log_dir: Option<PathBuf>,
        #[arg(short, default_value_t = 3)]
        n: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
enum InputMode {
    Mqtt,
    Serial,
}

/// Persistent settings, key-compatible with `radar_config.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct RadarConfig {
    input_mode: InputMode,
    broker: String,
    port: u16,
    topic: String,
    serial_port: String,
    serial_baud: u32,
    /// Sensor position on the site map (mm)
    sensor: [f64; 2],
    /// Sensor heading, degrees clockwise
    heading: f64,
    smoothing_on: bool,
    smooth_level: u8,
    log_dir: PathBuf,
}

impl Default for RadarConfig {
    fn default() -> Self {
        let mqtt = MqttConfig::default();
        let serial = SerialConfig::default();
        Self {
            input_mode: InputMode::Mqtt,
            broker: mqtt.host,
            port: mqtt.port,
            topic: mqtt.topic,
            serial_port: serial.port,
            serial_baud: serial.baud_rate,
            sensor: [0.0, 0.0],
            heading: 0.0,
            smoothing_on: true,
            smooth_level: 0,
            log_dir: PipelineConfig::default().log_dir,
        }
    }
}

impl RadarConfig {
    fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    fn mount(&self) -> SensorMount {
        SensorMount::new(self.sensor, self.heading)
    }

    fn smoothing(&self) -> SmoothingConfig {
        SmoothingConfig {
            enabled: self.smoothing_on,
            level: self.smooth_level,
        }
    }

    fn pipeline(&self, log_dir: Option<PathBuf>) -> PipelineConfig {
        PipelineConfig {
            log_dir: log_dir.unwrap_or_else(|| self.log_dir.clone()),
            smoothing: self.smoothing(),
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = RadarConfig::load(cli.config.as_deref())?;
    debug!(?config, "settings loaded");

    match cli.command {
        Commands::Live {
            input,
            broker,
            port,
            topic,
            serial_port,
            baud,
            log_dir,
            duration,
            interval_ms,
        } => {
            config.input_mode = input.unwrap_or(config.input_mode);
            config.broker = broker.unwrap_or(config.broker);
            config.port = port.unwrap_or(config.port);
            config.topic = topic.unwrap_or(config.topic);
            config.serial_port = serial_port.unwrap_or(config.serial_port);
            config.serial_baud = baud.unwrap_or(config.serial_baud);
            run_live(
                &config,
                log_dir,
                duration.map(Duration::from_secs_f64),
                Duration::from_millis(interval_ms),
            )?;
        }
        Commands::Replay {
            file,
            speed,
            seek,
            interval_ms,
        } => {
            run_replay(&config, &file, speed, seek, Duration::from_millis(interval_ms))?;
        }
        Commands::Simulate {
            scenario,
            seed,
            log_dir,
            output,
        } => {
            run_simulation(&config, scenario, seed, log_dir, output.as_deref())?;
        }
        Commands::Recent { log_dir, n } => {
            list_recent(log_dir.as_deref().unwrap_or(&config.log_dir), n)?;
        }
    }

    Ok(())
}

fn run_live(
    config: &RadarConfig,
    log_dir: Option<PathBuf>,
    duration: Option<Duration>,
    interval: Duration,
) -> Result<()> {
    let pipeline = Pipeline::new(config.pipeline(log_dir))?;
    let tracker = LiveTracker::spawn(
        pipeline,
        LiveConfig {
            data_timeout: DATA_TIMEOUT,
            mount: config.mount(),
            ..Default::default()
        },
    )?;

    let mut transport: Box<dyn Transport> = match config.input_mode {
        InputMode::Mqtt => Box::new(MqttLink::new(MqttConfig {
            host: config.broker.clone(),
            port: config.port,
            topic: config.topic.clone(),
            ..Default::default()
        })),
        InputMode::Serial => Box::new(SerialLink::new(SerialConfig {
            port: config.serial_port.clone(),
            baud_rate: config.serial_baud,
            ..Default::default()
        })),
    };
    transport.start(LinkSink::new(tracker.sink()).with_frame_tick(tracker.frame_tick()))?;
    println!("Tracking via {:?}; close stdin to stop.", config.input_mode);

    let (eof_tx, eof_rx) = bounded::<()>(1);
    thread::Builder::new()
        .name("stdin-watch".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(l) if l.trim() == "q" => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            let _ = eof_tx.send(());
        })?;

    let started = Instant::now();
    loop {
        match eof_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        print_view(&tracker.view(), &transport.stats());
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
    }

    transport.stop();
    let view = tracker.view();
    tracker.shutdown();
    println!(
        "Stopped after {:.1}s: {} batches, {} delivered, {} dropped, {} outages",
        started.elapsed().as_secs_f64(),
        view.batches,
        transport.stats().delivered,
        transport.stats().dropped + view.dropped,
        view.data_losses,
    );
    Ok(())
}

fn print_view(view: &LiveView, stats: &ingest::LinkStats) {
    let status = if view.data_lost { "NO DATA" } else { "live" };
    println!(
        "[{status}] {} tracks, fastest {:.0} mm/s, {} frames delivered",
        view.tracks.len(),
        view.fastest_mm_s,
        stats.delivered,
    );
    for t in &view.tracks {
        println!(
            "  {:>5} slot {} x={:>6.0} y={:>6.0} v={:>6.0} mm/s  world=({:.0}, {:.0}) since {}",
            t.id.to_string(),
            t.slot.0,
            t.smoothed.x_mm,
            t.smoothed.y_mm,
            t.smoothed.speed_mm_s,
            t.world_mm.0,
            t.world_mm.1,
            t.first_seen.format("%H:%M:%S"),
        );
    }
    for r in &view.recent {
        println!(
            "  recent {:>5} slot {} {}s {} hits",
            r.id.to_string(),
            r.slot.0,
            r.duration_secs(),
            r.total_hits
        );
    }
}

fn run_replay(
    config: &RadarConfig,
    file: &Path,
    speed: f64,
    seek: Option<f64>,
    interval: Duration,
) -> Result<()> {
    let recording = Recording::load(file)?;
    let mount = config.mount();
    println!(
        "Replaying {} ({} rows, {:.1}s) at {speed}x",
        file.display(),
        recording.len(),
        recording.duration(),
    );

    let player = ReplayPlayer::start(
        recording,
        ReplayConfig {
            speed,
            ..Default::default()
        },
    )?;
    if let Some(f) = seek {
        player.seek(f);
    }

    loop {
        if let Some(row) = player.latest() {
            let (wx, wy) = mount.local_to_world(row.x_mm, row.y_mm);
            println!(
                "t={:>7.2}s {:>5.1}% x={:>6.0} y={:>6.0} v={} world=({wx:.0}, {wy:.0})",
                row.t_rel,
                player.position_fraction() * 100.0,
                row.x_mm,
                row.y_mm,
                row.speed_mm_s
                    .map_or_else(|| "-".to_owned(), |v| format!("{v:.0}")),
            );
        }
        if player.is_finished() {
            break;
        }
        thread::sleep(interval);
    }
    Ok(())
}

fn run_simulation(
    config: &RadarConfig,
    kind: ScenarioKind,
    seed: u64,
    log_dir: Option<PathBuf>,
    output_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    let transmissions = scenario.transmissions();
    let mut pipeline = Pipeline::new(config.pipeline(log_dir))?;

    println!(
        "Running scenario '{}' (seed={}, duration={:.0}s, {} frames)...",
        scenario.name,
        seed,
        scenario.duration,
        transmissions.len()
    );

    let start = Instant::now();
    let summary = drive_pipeline(&mut pipeline, &transmissions, Stamp::now(), DATA_TIMEOUT);
    let alive = pipeline.tracks().len();
    let index = pipeline.store().map(|s| s.index_path().to_path_buf());
    drop(pipeline);
    let elapsed = start.elapsed();

    println!(
        "Done: {} frames ({} malformed), {} batches, {} births, {} expired, {} data losses, elapsed={:.2}s",
        summary.frames,
        summary.malformed,
        summary.batches,
        summary.births.len(),
        summary.expired.len(),
        summary.data_losses,
        elapsed.as_secs_f64(),
    );
    println!(
        "Fastest {:.0} mm/s, {} bytes discarded, {} tracks closed at exit",
        summary.fastest_mm_s, summary.discarded, alive
    );
    if let Some(index) = &index {
        println!("Index: {}", index.display());
    }

    if let Some(opath) = output_path {
        let json = serde_json::json!({
            "scenario": scenario.name,
            "seed": seed,
            "elapsed_s": elapsed.as_secs_f64(),
            "frames": summary.frames,
            "malformed": summary.malformed,
            "batches": summary.batches,
            "births": summary.births.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "expired": summary.expired.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "data_losses": summary.data_losses,
            "fastest_mm_s": summary.fastest_mm_s,
            "discarded_bytes": summary.discarded,
        });
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
        println!("Summary saved to {}", opath.display());
    }

    Ok(())
}

fn list_recent(log_dir: &Path, n: usize) -> Result<()> {
    let store = HistoryStore::open(log_dir, Local::now().date_naive())?;
    let files = store.recent_recordings(n);
    if files.is_empty() {
        println!("No recordings for {}", store.day());
        return Ok(());
    }
    for path in files {
        match Recording::load(&path) {
            Ok(rec) => println!(
                "{}  {} rows  {:.1}s",
                path.display(),
                rec.len(),
                rec.duration()
            ),
            Err(e) => println!("{}  unreadable: {e}", path.display()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_keys_match_settings_file() {
        let cfg: RadarConfig = serde_json::from_str(
            r#"{"sensor": [1500.0, -200.0], "heading": 90.0, "input_mode": "serial",
                "serial_baud": 115200, "smooth_level": 4, "map": "map.svg", "sound": true}"#,
        )
        .unwrap();
        assert_eq!(cfg.input_mode, InputMode::Serial);
        assert_eq!(cfg.serial_baud, 115_200);
        assert_eq!(cfg.serial_port, "/dev/ttyUSB0");
        assert_eq!(cfg.topic, "PondEyes/raw");
        assert_eq!(cfg.smoothing().window_len(), 3 + 21);
        let (x, y) = cfg.mount().local_to_world(0.0, 1000.0);
        assert!((x - 2500.0).abs() < 1e-6 && (y + 200.0).abs() < 1e-6);
    }

    #[test]
    fn empty_config_is_default() {
        let cfg: RadarConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.port, 1883);
        assert_eq!(cfg.broker, "127.0.0.1");
        assert!(cfg.smoothing_on);
        assert_eq!(cfg.log_dir, PathBuf::from("log"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["radartrack", "replay", "T3_101500.csv", "--speed", "4"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Replay { speed, .. } if speed == 4.0));
        let cli = Cli::try_parse_from(["radartrack", "simulate", "slot-swap", "--seed", "7"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Simulate { scenario: ScenarioKind::SlotSwap, seed: 7, .. }
        ));
    }
}
