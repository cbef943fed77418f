// Drift Mode playback session and its tick loop.
//
// `DriftSession` is the single owner of a tour's run-state: lifecycle state,
// the current path and waypoint index, the per-waypoint audio handles, the
// timer queue, and the camera and crossfade drivers. The host feeds it user
// commands and advances its millisecond clock; the session answers with
// narrative events. Apart from the capability objects it was handed (audio
// backend, viewport, close sink) it touches nothing outside itself.
//
// ## State machine
//
//   Idle/Completed --start--> Computing --(empty path)--> Idle
//                                       --(path)--------> Playing
//   Playing --dwell expires, more stops--> Playing (next waypoint)
//   Playing --dwell expires, last stop---> Completed (audio released)
//   Playing --pause--> Paused --resume--> Playing (fresh full dwell)
//   any     --exit---> Idle (everything cancelled and released, host told)
//
// Commands arriving in a state that does not accept them are ignored.
//
// ## Entering a waypoint
//
// Arriving at waypoint `i` does three things at once: the camera starts an
// eased flight to it (`camera.rs`), the crossfade engine fades from the clip
// of waypoint `i - 1` (if any) to the clip of waypoint `i` (`crossfade.rs`),
// and a dwell timer is armed for `dwell_ms` later. A `WaypointEntered` event
// tells the host to reveal the thought.
//
// ## Timers and cancellation
//
// Dwell expiry, camera frames and crossfade ticks are `ScheduledEvent`s in
// the session's `EventQueue` (see `event.rs`). Each carries the session id
// (bumped by every start and exit) and the generation of its kind (bumped
// by every cancel or restart of that kind). Starting any timer first purges
// the pending one of the same kind, so at most one of each is ever queued;
// the id/generation check then makes a stale pop harmless as well.
//
// Pause and exit cancel everything before they return. Within one tick,
// commands are applied before timers fire, so a pause issued on the exact
// tick a dwell would expire wins.
//
// ## Resources
//
// Audio handles are loaded when a path starts playing and released on
// completion, exit, restart and drop (`resources.rs`). Load and start
// failures are logged and reported as `AudioUnavailable`; the waypoint
// dwells silently and the tour keeps its schedule.
//
// See also: `command.rs` for `TourAction`, `planner.rs` for path
// construction, `config.rs` for the durations used here.

use crate::audio::{AudioBackend, HandleMap};
use crate::camera::{CameraDriver, FrameStep, Viewport};
use crate::command::{TourAction, TourCommand};
use crate::config::{ConfigError, DriftConfig};
use crate::crossfade::{CrossfadeEngine, FadeStep};
use crate::event::{DriftEvent, DriftEventKind, EventQueue, ScheduledEventKind, TimerKind};
use crate::planner;
use crate::resources;
use crate::types::{DriftState, Path, Thought, ThoughtId, TourProgress, Waypoint};
use whisperfield_geo::LatLng;

/// Receives the request to close the tour overlay when the user exits.
pub trait CloseSink {
    fn close_tour(&mut self);
}

impl<F: FnMut()> CloseSink for F {
    fn close_tour(&mut self) {
        self()
    }
}

/// The result of processing commands and advancing the clock.
#[derive(Debug, Default)]
pub struct StepResult {
    /// Narrative events emitted during this step, in order.
    pub events: Vec<DriftEvent>,
}

/// One Drift Mode tour player.
pub struct DriftSession {
    /// Current time in milliseconds.
    tick: u64,
    config: DriftConfig,
    state: DriftState,
    path: Path,
    current_index: usize,
    /// Audio handles for the current path only.
    handles: HandleMap,
    /// Bumped on every start and exit. Timers from older sessions are inert.
    session_id: u64,
    dwell_generation: u64,
    event_queue: EventQueue,
    camera: CameraDriver,
    crossfade: CrossfadeEngine,
    audio: Box<dyn AudioBackend>,
    viewport: Option<Box<dyn Viewport>>,
    close_sink: Box<dyn CloseSink>,
}

impl DriftSession {
    /// Create an idle session. The viewport can be attached later.
    pub fn new(
        config: DriftConfig,
        audio: Box<dyn AudioBackend>,
        close_sink: Box<dyn CloseSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tick: 0,
            config,
            state: DriftState::Idle,
            path: Path::default(),
            current_index: 0,
            handles: HandleMap::new(),
            session_id: 0,
            dwell_generation: 0,
            event_queue: EventQueue::new(),
            camera: CameraDriver::new(),
            crossfade: CrossfadeEngine::new(),
            audio,
            viewport: None,
            close_sink,
        })
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn state(&self) -> DriftState {
        self.state
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The waypoint whose thought is on display.
    pub fn current_waypoint(&self) -> Option<&Waypoint> {
        self.path.get(self.current_index)
    }

    /// "n / total" for the overlay, while a path exists.
    pub fn progress(&self) -> Option<TourProgress> {
        if self.path.is_empty() {
            return None;
        }
        Some(TourProgress {
            position: self.current_index + 1,
            total: self.path.len(),
        })
    }

    /// Number of live audio handles.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Whether a live handle exists for `thought_id`.
    pub fn has_handle(&self, thought_id: &ThoughtId) -> bool {
        self.handles.contains_key(thought_id)
    }

    /// Pending timers of one kind (0 or 1).
    pub fn pending_timers(&self, kind: TimerKind) -> usize {
        self.event_queue.pending(kind)
    }

    /// When the pending timer of `kind` fires, if any.
    pub fn next_timer(&self, kind: TimerKind) -> Option<u64> {
        self.event_queue.next_tick_of(kind)
    }

    // -----------------------------------------------------------------------
    // Host inputs
    // -----------------------------------------------------------------------

    /// Apply a batch of commands and advance the clock to `target_tick`,
    /// firing every timer due up to that point.
    ///
    /// Commands must be sorted by tick. Commands with tick > `target_tick`
    /// are ignored (caller error). Commands stamped before the current tick
    /// apply at the current tick.
    pub fn step(&mut self, commands: &[TourCommand], target_tick: u64) -> StepResult {
        let mut events = Vec::new();

        // Index into the sorted command slice.
        let mut cmd_idx = 0;

        loop {
            // Apply commands at this tick, before any timer due now.
            while cmd_idx < commands.len() && commands[cmd_idx].tick <= self.tick {
                let cmd = &commands[cmd_idx];
                cmd_idx += 1;
                self.apply_command(&cmd.action, &mut events);
            }

            // Fire timers at this tick.
            while let Some(event) = self.event_queue.pop_if_ready(self.tick) {
                self.process_event(event.kind, &mut events);
            }

            if self.tick >= target_tick {
                break;
            }

            // Jump to the next command or timer, whichever comes first.
            let next_event_tick = self.event_queue.peek_tick();
            let next_cmd_tick = commands
                .get(cmd_idx)
                .filter(|c| c.tick <= target_tick)
                .map(|c| c.tick);

            self.tick = match (next_event_tick, next_cmd_tick) {
                (Some(et), Some(ct)) => et.min(ct).min(target_tick),
                (Some(et), None) => et.min(target_tick),
                (None, Some(ct)) => ct.min(target_tick),
                (None, None) => target_tick,
            };
        }

        self.poll_audio_endings(&mut events);
        StepResult { events }
    }

    /// Advance the clock to `target_tick` with no new input.
    pub fn advance_to(&mut self, target_tick: u64) -> StepResult {
        self.step(&[], target_tick)
    }

    /// Apply one command right now, at the current tick.
    pub fn apply(&mut self, action: TourAction) -> StepResult {
        let mut events = Vec::new();
        self.apply_command(&action, &mut events);
        self.poll_audio_endings(&mut events);
        StepResult { events }
    }

    /// Install the map viewport. If a tour is playing, the camera flies to
    /// the current waypoint right away.
    pub fn attach_viewport(&mut self, viewport: Box<dyn Viewport>) {
        self.viewport = Some(viewport);
        if self.state == DriftState::Playing {
            if let Some(target) = self.current_waypoint().map(|w| w.position) {
                self.fly_camera_to(target);
            }
        }
    }

    /// Remove the map viewport, cancelling any flight in progress.
    pub fn detach_viewport(&mut self) -> Option<Box<dyn Viewport>> {
        self.cancel_camera();
        self.viewport.take()
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn apply_command(&mut self, action: &TourAction, events: &mut Vec<DriftEvent>) {
        match action {
            TourAction::Start { origin, thoughts } => {
                if self.state.can_start() {
                    self.start_tour(*origin, thoughts, events);
                } else {
                    self.ignore(action);
                }
            }
            TourAction::Pause => {
                if self.state == DriftState::Playing {
                    self.pause(events);
                } else {
                    self.ignore(action);
                }
            }
            TourAction::Resume => {
                if self.state == DriftState::Paused && self.current_index < self.path.len() {
                    self.resume(events);
                } else {
                    self.ignore(action);
                }
            }
            TourAction::Exit => self.exit(events),
        }
    }

    fn ignore(&self, action: &TourAction) {
        tracing::debug!(command = action.name(), state = %self.state, "command ignored in this state");
    }

    fn start_tour(&mut self, origin: LatLng, thoughts: &[Thought], events: &mut Vec<DriftEvent>) {
        self.transition(DriftState::Computing, events);

        let path = planner::compute_path(origin, thoughts, self.config.max_waypoints);
        if path.is_empty() {
            tracing::info!(pool = thoughts.len(), %origin, "no thoughts to drift to");
            self.path = Path::default();
            self.current_index = 0;
            self.transition(DriftState::Idle, events);
            return;
        }

        // Nothing from an earlier tour may leak into this one.
        self.cancel_timers();
        resources::release(&mut self.handles);
        self.session_id += 1;

        tracing::info!(
            stops = path.len(),
            hop_km = path.hop_distance_km(),
            session = self.session_id,
            "drift tour starting"
        );
        self.emit(
            events,
            DriftEventKind::PathComputed {
                stops: path.len(),
                hop_distance_km: path.hop_distance_km(),
            },
        );
        self.path = path;
        self.current_index = 0;

        let acquired = resources::acquire(self.audio.as_mut(), &self.path);
        self.handles = acquired.handles;
        for (thought_id, err) in acquired.failures {
            self.emit(
                events,
                DriftEventKind::AudioUnavailable {
                    thought_id,
                    reason: err.to_string(),
                },
            );
        }

        self.transition(DriftState::Playing, events);
        self.enter_waypoint(0, events);
    }

    fn pause(&mut self, events: &mut Vec<DriftEvent>) {
        self.cancel_timers();
        resources::pause_all(&mut self.handles);
        self.transition(DriftState::Paused, events);
    }

    fn resume(&mut self, events: &mut Vec<DriftEvent>) {
        self.transition(DriftState::Playing, events);

        let Some((thought_id, target)) = self
            .current_waypoint()
            .map(|w| (w.thought_id().clone(), w.position))
        else {
            return;
        };

        if let Err(err) = self.crossfade.settle(&mut self.handles, Some(&thought_id)) {
            tracing::warn!(thought = %thought_id, error = %err, "audio failed to resume, dwelling silently");
            self.emit(
                events,
                DriftEventKind::AudioUnavailable {
                    thought_id,
                    reason: err.to_string(),
                },
            );
        }
        self.fly_camera_to(target);
        // The dwell window restarts in full; time spent before the pause
        // is not credited.
        self.schedule_dwell();
    }

    fn exit(&mut self, events: &mut Vec<DriftEvent>) {
        self.cancel_timers();
        resources::release(&mut self.handles);
        self.session_id += 1;
        self.path = Path::default();
        self.current_index = 0;
        self.transition(DriftState::Idle, events);

        tracing::info!("drift tour closed");
        self.close_sink.close_tour();
        self.emit(events, DriftEventKind::TourClosed);
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn process_event(&mut self, kind: ScheduledEventKind, events: &mut Vec<DriftEvent>) {
        match kind {
            ScheduledEventKind::DwellExpired {
                session,
                generation,
            } => {
                if session != self.session_id
                    || generation != self.dwell_generation
                    || self.state != DriftState::Playing
                {
                    tracing::debug!(session, generation, "stale dwell timer dropped");
                    return;
                }
                self.advance(events);
            }
            ScheduledEventKind::CameraFrame {
                session,
                generation,
            } => {
                if session != self.session_id {
                    return;
                }
                let Some(viewport) = self.viewport.as_deref_mut() else {
                    return;
                };
                match self.camera.frame(generation, viewport, self.tick) {
                    FrameStep::Continue { next_tick } => {
                        self.event_queue.schedule(
                            next_tick,
                            ScheduledEventKind::CameraFrame {
                                session,
                                generation,
                            },
                        );
                    }
                    FrameStep::Arrived => {
                        tracing::trace!(index = self.current_index, "camera arrived");
                    }
                    FrameStep::Stale => {
                        tracing::debug!(generation, "stale camera frame dropped");
                    }
                }
            }
            ScheduledEventKind::CrossfadeTick {
                session,
                generation,
            } => {
                if session != self.session_id {
                    return;
                }
                match self.crossfade.tick(generation, &mut self.handles, self.tick) {
                    FadeStep::Continue { next_tick } => {
                        self.event_queue.schedule(
                            next_tick,
                            ScheduledEventKind::CrossfadeTick {
                                session,
                                generation,
                            },
                        );
                    }
                    FadeStep::Finished => {
                        tracing::trace!(index = self.current_index, "crossfade finished");
                    }
                    FadeStep::Stale => {
                        tracing::debug!(generation, "stale crossfade tick dropped");
                    }
                }
            }
        }
    }

    /// The current waypoint's dwell ran out: move on or finish.
    fn advance(&mut self, events: &mut Vec<DriftEvent>) {
        let next = self.current_index + 1;
        if next < self.path.len() {
            self.current_index = next;
            self.enter_waypoint(next, events);
        } else {
            self.complete(events);
        }
    }

    fn complete(&mut self, events: &mut Vec<DriftEvent>) {
        self.cancel_timers();
        resources::release(&mut self.handles);
        self.transition(DriftState::Completed, events);
        tracing::info!(stops = self.path.len(), "drift tour completed");
        self.emit(
            events,
            DriftEventKind::TourCompleted {
                stops: self.path.len(),
            },
        );
    }

    fn enter_waypoint(&mut self, index: usize, events: &mut Vec<DriftEvent>) {
        let Some(waypoint) = self.path.get(index) else {
            return;
        };
        let thought_id = waypoint.thought_id().clone();
        let target = waypoint.position;
        let outgoing = index
            .checked_sub(1)
            .and_then(|i| self.path.get(i))
            .map(|w| w.thought_id().clone());

        tracing::info!(index, total = self.path.len(), thought = %thought_id, "drifting to waypoint");
        self.emit(
            events,
            DriftEventKind::WaypointEntered {
                index,
                thought_id: thought_id.clone(),
            },
        );

        self.fly_camera_to(target);
        self.start_crossfade(outgoing.as_ref(), &thought_id, events);
        self.schedule_dwell();
    }

    fn fly_camera_to(&mut self, target: LatLng) {
        self.cancel_camera();
        let Some(viewport) = self.viewport.as_deref_mut() else {
            tracing::debug!("no viewport attached, camera stays put");
            return;
        };
        let start = self.camera.animate_to(
            viewport,
            target,
            self.tick,
            self.config.camera_flight_ms,
            self.config.frame_interval_ms,
        );
        if let Some(next_tick) = start.next_tick {
            self.event_queue.schedule(
                next_tick,
                ScheduledEventKind::CameraFrame {
                    session: self.session_id,
                    generation: start.generation,
                },
            );
        }
    }

    fn start_crossfade(
        &mut self,
        outgoing: Option<&ThoughtId>,
        incoming: &ThoughtId,
        events: &mut Vec<DriftEvent>,
    ) {
        self.event_queue.cancel(TimerKind::Crossfade);
        let begin = self.crossfade.begin(
            &mut self.handles,
            outgoing,
            Some(incoming),
            self.tick,
            self.config.crossfade_ms,
            self.config.frame_interval_ms,
        );
        if let Some(err) = begin.start_error {
            tracing::warn!(thought = %incoming, error = %err, "audio failed to start, dwelling silently");
            self.emit(
                events,
                DriftEventKind::AudioUnavailable {
                    thought_id: incoming.clone(),
                    reason: err.to_string(),
                },
            );
        }
        if let Some(next_tick) = begin.next_tick {
            self.event_queue.schedule(
                next_tick,
                ScheduledEventKind::CrossfadeTick {
                    session: self.session_id,
                    generation: begin.generation,
                },
            );
        }
    }

    fn schedule_dwell(&mut self) {
        self.cancel_dwell();
        self.event_queue.schedule(
            self.tick.saturating_add(self.config.dwell_ms),
            ScheduledEventKind::DwellExpired {
                session: self.session_id,
                generation: self.dwell_generation,
            },
        );
    }

    fn cancel_dwell(&mut self) {
        self.dwell_generation += 1;
        self.event_queue.cancel(TimerKind::Dwell);
    }

    fn cancel_camera(&mut self) {
        self.camera.cancel();
        self.event_queue.cancel(TimerKind::Camera);
    }

    fn cancel_crossfade(&mut self) {
        self.crossfade.cancel();
        self.event_queue.cancel(TimerKind::Crossfade);
    }

    fn cancel_timers(&mut self) {
        self.cancel_dwell();
        self.cancel_camera();
        self.cancel_crossfade();
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn transition(&mut self, to: DriftState, events: &mut Vec<DriftEvent>) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!(%from, %to, tick = self.tick, "drift state changed");
        self.emit(events, DriftEventKind::StateChanged { from, to });
    }

    fn poll_audio_endings(&mut self, events: &mut Vec<DriftEvent>) {
        let mut ended = Vec::new();
        for (thought_id, handle) in self.handles.iter_mut() {
            if handle.take_ended() {
                tracing::debug!(thought = %thought_id, "audio ended");
                ended.push(thought_id.clone());
            }
        }
        for thought_id in ended {
            self.emit(events, DriftEventKind::AudioEnded { thought_id });
        }
    }

    fn emit(&self, events: &mut Vec<DriftEvent>, kind: DriftEventKind) {
        events.push(DriftEvent {
            tick: self.tick,
            kind,
        });
    }
}

impl Drop for DriftSession {
    fn drop(&mut self) {
        self.cancel_timers();
        resources::release(&mut self.handles);
    }
}
