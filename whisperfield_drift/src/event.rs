// Drift events: the internal timer queue and the host-visible narrative.
//
// Drift Mode is a discrete event simulation on a millisecond clock. Every
// deferred effect (dwell expiry, camera animation frame, crossfade volume
// step) is an entry in a priority queue ordered by `(tick, sequence)`. The
// session pops entries in order, advancing the clock as needed. Idle time
// between entries is free.
//
// This file defines two related but distinct concepts:
// - `ScheduledEvent`: internal timers in the priority queue that drive a tour.
// - `DriftEvent`: narrative events returned to the host (state changes,
//   waypoint reveals, audio problems, completion).
//
// Every timer carries the id of the session that scheduled it and the
// generation of its `TimerKind`. Cancelling a kind bumps that generation
// and purges its queued entries, so at most one timer of each kind is ever
// pending. A popped entry whose session or generation has moved on is
// dropped without effect.
//
// See also: `session.rs` for the loop that processes scheduled events and
// owns the generation counters.

use crate::types::{DriftState, ThoughtId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

// ---------------------------------------------------------------------------
// Internal scheduled events (priority queue)
// ---------------------------------------------------------------------------

/// The three independent timer families a tour runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    Dwell,
    Camera,
    Crossfade,
}

/// A timer scheduled for future processing by the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// The tick (millisecond) at which this timer fires.
    pub tick: u64,
    /// Unique ordering key for deterministic tiebreaking within a tick.
    /// Lower values are processed first.
    pub sequence: u64,
    /// What should happen when this timer fires.
    pub kind: ScheduledEventKind,
}

/// The timers a tour can schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledEventKind {
    /// The current waypoint's dwell window is over.
    DwellExpired { session: u64, generation: u64 },
    /// Apply the next eased camera position.
    CameraFrame { session: u64, generation: u64 },
    /// Apply the next crossfade volume pair.
    CrossfadeTick { session: u64, generation: u64 },
}

impl ScheduledEventKind {
    pub fn timer_kind(&self) -> TimerKind {
        match self {
            ScheduledEventKind::DwellExpired { .. } => TimerKind::Dwell,
            ScheduledEventKind::CameraFrame { .. } => TimerKind::Camera,
            ScheduledEventKind::CrossfadeTick { .. } => TimerKind::Crossfade,
        }
    }
}

// We want a min-heap: lowest (tick, sequence) fires first.
// Rust's BinaryHeap is a max-heap, so we reverse the ordering.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse: smallest (tick, sequence) should be "greatest" for the max-heap.
        other
            .tick
            .cmp(&self.tick)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of scheduled timers. Wraps a `BinaryHeap` with reversed
/// ordering to give us a min-heap (earliest tick fires first).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    /// Monotonic counter for deterministic ordering within a tick.
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timer at the given tick.
    pub fn schedule(&mut self, tick: u64, kind: ScheduledEventKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            tick,
            sequence,
            kind,
        });
    }

    /// Peek at the next timer's tick without removing it.
    pub fn peek_tick(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.tick)
    }

    /// Pop the next timer if its tick is <= `up_to_tick`.
    pub fn pop_if_ready(&mut self, up_to_tick: u64) -> Option<ScheduledEvent> {
        if self.heap.peek().is_some_and(|e| e.tick <= up_to_tick) {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Remove every pending timer of the given kind. Returns how many were
    /// removed.
    pub fn cancel(&mut self, kind: TimerKind) -> usize {
        let before = self.heap.len();
        self.heap.retain(|e| e.kind.timer_kind() != kind);
        before - self.heap.len()
    }

    /// Number of pending timers of the given kind.
    pub fn pending(&self, kind: TimerKind) -> usize {
        self.heap
            .iter()
            .filter(|e| e.kind.timer_kind() == kind)
            .count()
    }

    /// Tick of the earliest pending timer of the given kind.
    pub fn next_tick_of(&self, kind: TimerKind) -> Option<u64> {
        self.heap
            .iter()
            .filter(|e| e.kind.timer_kind() == kind)
            .map(|e| e.tick)
            .min()
    }
}

// ---------------------------------------------------------------------------
// Host-visible narrative events (output)
// ---------------------------------------------------------------------------

/// A narrative event emitted by the session for the tour overlay / log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriftEvent {
    pub tick: u64,
    pub kind: DriftEventKind,
}

/// Types of narrative events visible to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DriftEventKind {
    /// The session moved between lifecycle states.
    StateChanged { from: DriftState, to: DriftState },
    /// A start command produced a non-empty path.
    PathComputed { stops: usize, hop_distance_km: f64 },
    /// The tour arrived at a waypoint; its thought should be displayed.
    WaypointEntered { index: usize, thought_id: ThoughtId },
    /// A waypoint's clip could not be loaded or started; it dwells silently.
    AudioUnavailable { thought_id: ThoughtId, reason: String },
    /// A waypoint's clip played to its end.
    AudioEnded { thought_id: ThoughtId },
    /// The last waypoint's dwell ran out.
    TourCompleted { stops: usize },
    /// An exit command asked the host to close the tour overlay.
    TourClosed,
}
