// Commands that drive a Drift Mode session.
//
// All user input reaches the session as a `TourAction`: the host's play,
// pause and exit buttons map onto these. Internal progress (dwell expiry,
// animation frames, crossfade steps) comes from scheduled events instead
// (see `event.rs`).
//
// A `TourCommand` pins an action to the tick it was issued at, so a host can
// hand `DriftSession::step()` a batch of input gathered during a frame. For
// input that should take effect right now, `DriftSession::apply()` takes a
// bare `TourAction`.
//
// Commands issued in a state that does not accept them are ignored (logged
// at debug level), never rejected with an error.

use crate::types::Thought;
use serde::{Deserialize, Serialize};
use whisperfield_geo::LatLng;

/// A user action stamped with the tick it applies at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TourCommand {
    pub tick: u64,
    pub action: TourAction,
}

impl TourCommand {
    pub fn new(tick: u64, action: TourAction) -> Self {
        Self { tick, action }
    }
}

/// The specific action a command performs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TourAction {
    /// Plan a tour from `origin` over `thoughts` and start playing it.
    /// Accepted from `Idle` and `Completed`.
    Start {
        origin: LatLng,
        thoughts: Vec<Thought>,
    },
    /// Freeze the tour on the current waypoint. Accepted from `Playing`.
    Pause,
    /// Continue from the current waypoint with a fresh dwell window.
    /// Accepted from `Paused`.
    Resume,
    /// Tear the tour down and ask the host to close it. Accepted anywhere.
    Exit,
}

impl TourAction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            TourAction::Start { .. } => "start",
            TourAction::Pause => "pause",
            TourAction::Resume => "resume",
            TourAction::Exit => "exit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThoughtId;
    use chrono::DateTime;

    #[test]
    fn command_serialization_roundtrip() {
        let cmd = TourCommand::new(
            250,
            TourAction::Start {
                origin: LatLng::new(40.0, -73.0),
                thoughts: vec![Thought {
                    id: ThoughtId::new("t"),
                    text: "hello".into(),
                    position: LatLng::new(40.01, -73.0),
                    audio: None,
                    mood: Some("calm".into()),
                    created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
                }],
            },
        );

        let json = serde_json::to_string(&cmd).unwrap();
        let restored: TourCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, restored);
    }

    #[test]
    fn action_names() {
        assert_eq!(TourAction::Pause.name(), "pause");
        assert_eq!(TourAction::Exit.name(), "exit");
    }
}
