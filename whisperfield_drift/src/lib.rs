// whisperfield_drift: Drift Mode tour player.
//
// Drift Mode turns the thoughts scattered around a point on the map into a
// short guided tour: the nearest few are chained into a path, and the tour
// visits them one after another, flying the map camera to each stop,
// crossfading its audio clip in, revealing its text, and dwelling a fixed
// time before moving on. The user can pause, resume or exit at any time.
//
// Module overview:
// - `session.rs`:   DriftSession: lifecycle state machine, tick loop, command/timer processing.
// - `planner.rs`:   Nearest-neighbor path construction over a candidate pool.
// - `camera.rs`:    Viewport capability, cubic ease-out flight driver, headless viewport.
// - `crossfade.rs`: Linear volume crossfade between consecutive waypoint clips.
// - `audio.rs`:     AudioBackend / AudioHandle capabilities and the headless mixer.
// - `resources.rs`: Per-tour acquisition and release of audio handles.
// - `event.rs`:     EventQueue (timer priority queue) + narrative DriftEvents.
// - `command.rs`:   TourCommand / TourAction: every user input.
// - `config.rs`:    DriftConfig: durations and path bound, JSON loading and validation.
// - `types.rs`:     Thought, Waypoint, Path, DriftState, TourProgress, ids.
//
// Time is a millisecond counter owned by the session; the host advances it
// with `DriftSession::step`. Nothing here reads the wall clock, spawns
// threads, or touches a real audio device or map widget. Those arrive as
// trait objects, so a whole tour replays deterministically in tests.

pub mod audio;
pub mod camera;
pub mod command;
pub mod config;
pub mod crossfade;
pub mod event;
pub mod planner;
pub mod resources;
pub mod session;
pub mod types;

pub use whisperfield_geo as geo;
