// CLI entry point for replaying a Drift Mode tour.
//
// Loads a thought pool (or scatters a synthetic one around the origin),
// plays one tour on the session's millisecond clock with the headless
// viewport, and prints every narrative event the session emits. With
// `--speakers` (needs the `speakers` feature, see `speakers.rs`) clips play
// through the default audio output and the clock follows wall time.
//
// Usage:
//   drift-replay --origin <LAT,LNG> [OPTIONS]
//     --thoughts <PATH>     Thought pool JSON (array of thoughts)
//     --scatter <N>         Without --thoughts: N synthetic thoughts (default: 8)
//     --config <PATH>       DriftConfig JSON; missing fields take defaults
//     --pause-at <MS>       Pause at this tick
//     --resume-at <MS>      Resume at this tick
//     --exit-at <MS>        Exit at this tick
//     --until <MS>          Stop the clock here (default: long enough to finish)
//     --json                One JSON object per event instead of text
//     --log-level <FILTER>  Log filter when RUST_LOG is unset (default: info)
//     --speakers            Play clips on the default output device
//     --clips <DIR>         Directory clip references resolve against (default: .)

#[cfg(feature = "speakers")]
mod speakers;

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use whisperfield_drift::audio::{AudioBackend, HeadlessAudio};
use whisperfield_drift::camera::{HeadlessViewport, Viewport};
use whisperfield_drift::command::{TourAction, TourCommand};
use whisperfield_drift::config::DriftConfig;
use whisperfield_drift::event::{DriftEvent, DriftEventKind};
use whisperfield_drift::session::DriftSession;
use whisperfield_drift::types::{AudioRef, DriftState, Thought, ThoughtId};
use whisperfield_geo::{LatLng, destination_point};

/// Zoom the headless map starts at.
const START_ZOOM: f64 = 15.0;

#[derive(Parser, Debug)]
#[command(name = "drift-replay", version)]
#[command(about = "Replay a Drift Mode tour and print what happens")]
struct Args {
    /// Tour origin as "lat,lng"
    #[arg(long, value_parser = parse_lat_lng, allow_hyphen_values = true)]
    origin: LatLng,

    /// Thought pool JSON file
    #[arg(long)]
    thoughts: Option<PathBuf>,

    /// Number of synthetic thoughts when no pool file is given
    #[arg(long, default_value_t = 8)]
    scatter: usize,

    /// DriftConfig JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_name = "MS")]
    pause_at: Option<u64>,

    #[arg(long, value_name = "MS")]
    resume_at: Option<u64>,

    #[arg(long, value_name = "MS")]
    exit_at: Option<u64>,

    /// Stop the clock at this tick
    #[arg(long, value_name = "MS")]
    until: Option<u64>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Play clips through the default audio output
    #[arg(long)]
    speakers: bool,

    /// Directory clip references are resolved against
    #[arg(long, default_value = ".")]
    clips: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .with_context(|| format!("invalid log filter {:?}", args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => DriftConfig::load(path)?,
        None => DriftConfig::default(),
    };
    let pool = match &args.thoughts {
        Some(path) => load_pool(path)?,
        None => scatter(args.origin, args.scatter),
    };
    tracing::info!(thoughts = pool.len(), origin = %args.origin, "loaded pool");

    let commands = build_commands(&args, &pool);
    let horizon = args
        .until
        .unwrap_or_else(|| default_horizon(&config, &commands));

    let viewport = HeadlessViewport::new(args.origin, START_ZOOM);
    let mut session = DriftSession::new(
        config.clone(),
        audio_backend(&args)?,
        Box::new(|| tracing::info!("tour overlay closed")),
    )?;
    session.attach_viewport(Box::new(viewport.clone()));

    let texts: BTreeMap<ThoughtId, String> = pool
        .iter()
        .map(|t| (t.id.clone(), t.text.clone()))
        .collect();
    let mut out = io::stdout().lock();

    let wall_start = Instant::now();
    let mut next_command = 0;
    let mut now = 0;
    loop {
        let due = commands[next_command..]
            .iter()
            .take_while(|c| c.tick <= now)
            .count();
        let batch = &commands[next_command..next_command + due];
        next_command += due;

        let result = session.step(batch, now);
        for event in &result.events {
            print_event(&mut out, event, &texts, args.json)?;
        }

        let settled = matches!(session.state(), DriftState::Idle | DriftState::Completed);
        if now >= horizon || (next_command == commands.len() && settled) {
            break;
        }
        now = now.saturating_add(config.frame_interval_ms).min(horizon);

        if args.speakers {
            let target = Duration::from_millis(now);
            if let Some(wait) = target.checked_sub(wall_start.elapsed()) {
                thread::sleep(wait);
            }
        }
    }

    tracing::info!(
        tick = session.tick(),
        state = %session.state(),
        camera = %viewport.center(),
        "replay finished"
    );
    Ok(())
}

fn parse_lat_lng(s: &str) -> Result<LatLng, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got {s:?}"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("bad latitude {lat:?}: {e}"))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|e| format!("bad longitude {lng:?}: {e}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(format!("coordinate out of range: {lat},{lng}"));
    }
    Ok(LatLng::new(lat, lng))
}

fn load_pool(path: &Path) -> Result<Vec<Thought>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read thought pool {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse thought pool {}", path.display()))
}

/// Synthetic thoughts on a golden-angle spiral around `origin`, each with
/// a clip reference named after its id.
fn scatter(origin: LatLng, count: usize) -> Vec<Thought> {
    const GOLDEN_ANGLE_DEG: f64 = 137.507_764;
    let now = Utc::now();
    (0..count)
        .map(|i| Thought {
            id: ThoughtId::new(format!("scatter-{i}")),
            text: format!("synthetic thought #{i}"),
            position: destination_point(
                origin,
                GOLDEN_ANGLE_DEG * i as f64,
                0.4 * (i as f64 + 1.0).sqrt(),
            ),
            audio: Some(AudioRef::new(format!("scatter-{i}.ogg"))),
            mood: None,
            created_at: now - TimeDelta::minutes(7 * i as i64),
        })
        .collect()
}

fn build_commands(args: &Args, pool: &[Thought]) -> Vec<TourCommand> {
    let mut commands = vec![TourCommand::new(
        0,
        TourAction::Start {
            origin: args.origin,
            thoughts: pool.to_vec(),
        },
    )];
    let scheduled = [
        (args.pause_at, TourAction::Pause),
        (args.resume_at, TourAction::Resume),
        (args.exit_at, TourAction::Exit),
    ];
    for (tick, action) in scheduled {
        if let Some(tick) = tick {
            commands.push(TourCommand::new(tick, action));
        }
    }
    // Stable: ties keep start, pause, resume, exit order.
    commands.sort_by_key(|c| c.tick);
    commands
}

/// Enough time for a full tour after the last command.
fn default_horizon(config: &DriftConfig, commands: &[TourCommand]) -> u64 {
    let last_command = commands.iter().map(|c| c.tick).max().unwrap_or(0);
    let tour = config.dwell_ms.saturating_mul(config.max_waypoints as u64);
    last_command
        .saturating_add(tour)
        .saturating_add(config.camera_flight_ms)
}

fn audio_backend(args: &Args) -> Result<Box<dyn AudioBackend>> {
    if !args.speakers {
        return Ok(Box::new(HeadlessAudio::new()));
    }
    open_speakers(&args.clips)
}

#[cfg(feature = "speakers")]
fn open_speakers(clips: &Path) -> Result<Box<dyn AudioBackend>> {
    Ok(Box::new(speakers::RodioBackend::open(clips)?))
}

#[cfg(not(feature = "speakers"))]
fn open_speakers(_clips: &Path) -> Result<Box<dyn AudioBackend>> {
    anyhow::bail!("--speakers needs a build with the `speakers` feature")
}

fn describe(event: &DriftEvent, texts: &BTreeMap<ThoughtId, String>) -> String {
    match &event.kind {
        DriftEventKind::StateChanged { from, to } => format!("state {from} -> {to}"),
        DriftEventKind::PathComputed {
            stops,
            hop_distance_km,
        } => format!("path of {stops} stops, {hop_distance_km:.2} km of hops"),
        DriftEventKind::WaypointEntered { index, thought_id } => {
            let text = texts.get(thought_id).map_or("", String::as_str);
            format!("stop {}: {thought_id} {text:?}", index + 1)
        }
        DriftEventKind::AudioUnavailable { thought_id, reason } => {
            format!("silent at {thought_id}: {reason}")
        }
        DriftEventKind::AudioEnded { thought_id } => format!("clip ended at {thought_id}"),
        DriftEventKind::TourCompleted { stops } => format!("tour completed after {stops} stops"),
        DriftEventKind::TourClosed => "tour closed".to_owned(),
    }
}

fn print_event(
    out: &mut impl Write,
    event: &DriftEvent,
    texts: &BTreeMap<ThoughtId, String>,
    json: bool,
) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, event)?;
        writeln!(out)?;
    } else {
        let seconds = event.tick as f64 / 1000.0;
        writeln!(out, "[{seconds:>8.3}s] {}", describe(event, texts))?;
    }
    Ok(())
}
