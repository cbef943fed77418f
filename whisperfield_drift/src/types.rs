// Core types shared across Drift Mode.
//
// Defines the thought pool item handed in by the host (`Thought`), the tour
// data model built from it (`Waypoint`, `Path`), the playback state enum
// (`DriftState`), and the progress snapshot the host renders
// (`TourProgress`). All data types derive `Serialize`/`Deserialize` so pools
// and tours can be loaded from JSON fixtures and logged.
//
// See also: `planner.rs` which builds a `Path`, `session.rs` which owns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use whisperfield_geo::LatLng;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a thought, as assigned by the storage backend.
///
/// Opaque to Drift Mode. Ordered so handle maps iterate deterministically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThoughtId(pub String);

impl ThoughtId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThoughtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a thought's voice clip (a URL or a local path, depending on
/// the audio backend that resolves it).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(pub String);

impl AudioRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Thought pool
// ---------------------------------------------------------------------------

/// One item of the thought pool the host has already fetched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: ThoughtId,
    pub text: String,
    pub position: LatLng,
    /// Voice clip, if the author recorded one.
    #[serde(default)]
    pub audio: Option<AudioRef>,
    /// Mood tag assigned upstream. Carried for display only.
    #[serde(default)]
    pub mood: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tour data model
// ---------------------------------------------------------------------------

/// One stop of a tour: a position plus the thought shown there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: LatLng,
    pub thought: Thought,
}

impl Waypoint {
    pub fn from_thought(thought: Thought) -> Self {
        Self {
            position: thought.position,
            thought,
        }
    }

    pub fn thought_id(&self) -> &ThoughtId {
        &self.thought.id
    }

    pub fn audio(&self) -> Option<&AudioRef> {
        self.thought.audio.as_ref()
    }
}

/// Ordered waypoints of one tour. Insertion order is visiting order.
///
/// There is no API to reorder or edit a built path; a new tour builds a new
/// `Path`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    waypoints: Vec<Waypoint>,
}

impl Path {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter()
    }

    /// Sum of the great-circle hops between consecutive waypoints, in km.
    pub fn hop_distance_km(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|pair| pair[0].position.distance_km(pair[1].position))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Playback state
// ---------------------------------------------------------------------------

/// Where a tour session is in its lifecycle.
///
/// `Computing` is only observable through `StateChanged` events: planning is
/// synchronous, so a start command leaves the session in `Playing` or back
/// in `Idle` before it returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriftState {
    #[default]
    Idle,
    Computing,
    Playing,
    Paused,
    Completed,
}

impl DriftState {
    /// Whether a start command is accepted in this state.
    pub fn can_start(self) -> bool {
        matches!(self, DriftState::Idle | DriftState::Completed)
    }
}

impl fmt::Display for DriftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriftState::Idle => "idle",
            DriftState::Computing => "computing",
            DriftState::Playing => "playing",
            DriftState::Paused => "paused",
            DriftState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Progress indicator for the tour overlay ("2 / 5").
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TourProgress {
    /// 1-based position of the waypoint on display.
    pub position: usize,
    pub total: usize,
}

impl TourProgress {
    /// Fraction of the tour reached, in (0, 1].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.position as f64 / self.total as f64
        }
    }
}
