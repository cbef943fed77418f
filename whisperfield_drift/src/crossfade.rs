// Linear audio crossfade between consecutive waypoints.
//
// `CrossfadeEngine::begin` starts the incoming clip at volume 0 and records a
// fade; the session then calls `tick` on every crossfade timer until the
// engine reports `Finished`. At each tick both volumes are set from the same
// elapsed fraction `p`: incoming = p, outgoing = 1 - p (linear, not
// equal-power). The last tick always lands exactly on `started + duration`,
// so a completed fade leaves the outgoing clip at 0 and the incoming at 1.
// The outgoing clip is then paused.
//
// Either side may be absent: the first waypoint has no outgoing clip (it
// still ramps 0 -> 1), and a waypoint without a clip has no incoming one (the
// outgoing still ramps 1 -> 0).
//
// Only one fade exists at a time. `begin` and `cancel` bump the engine's
// generation; a `tick` carrying an older generation is stale and does
// nothing. A superseded fade is abandoned where it stands, not finished.
// `DriftConfig::validate` keeps the crossfade shorter than the dwell, so a
// fade always reaches its final tick before the next waypoint begins one.
//
// The engine never owns handles. It looks them up by thought id in the map
// the session passes to each call.

use crate::audio::{AudioError, HandleMap};
use crate::types::ThoughtId;

/// Volumes `(outgoing, incoming)` at fade fraction `progress`.
pub fn fade_volumes(progress: f32) -> (f32, f32) {
    let p = progress.clamp(0.0, 1.0);
    (1.0 - p, p)
}

struct ActiveFade {
    outgoing: Option<ThoughtId>,
    incoming: Option<ThoughtId>,
    started_at: u64,
    duration_ms: u64,
    frame_ms: u64,
}

impl ActiveFade {
    fn progress(&self, now: u64) -> f32 {
        let elapsed = now.saturating_sub(self.started_at);
        (elapsed as f64 / self.duration_ms as f64).min(1.0) as f32
    }

    fn next_tick(&self, now: u64) -> u64 {
        now.saturating_add(self.frame_ms)
            .min(self.started_at.saturating_add(self.duration_ms))
    }
}

/// Result of starting a fade.
#[derive(Debug)]
pub struct FadeBegin {
    /// Generation to stamp on the crossfade timer.
    pub generation: u64,
    /// When to call `tick` next, or `None` if nothing is left to ramp.
    pub next_tick: Option<u64>,
    /// The incoming clip refused to start; it was left out of the fade.
    pub start_error: Option<AudioError>,
}

/// What a crossfade timer did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeStep {
    /// The timer belonged to a cancelled or superseded fade.
    Stale,
    Continue { next_tick: u64 },
    Finished,
}

#[derive(Default)]
pub struct CrossfadeEngine {
    generation: u64,
    active: Option<ActiveFade>,
}

impl CrossfadeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start fading from `outgoing` to `incoming`, abandoning any fade in
    /// flight. Ids without a handle in `handles` are treated as absent.
    pub fn begin(
        &mut self,
        handles: &mut HandleMap,
        outgoing: Option<&ThoughtId>,
        incoming: Option<&ThoughtId>,
        now: u64,
        duration_ms: u64,
        frame_ms: u64,
    ) -> FadeBegin {
        self.cancel();

        let outgoing = outgoing.filter(|id| handles.contains_key(*id)).cloned();
        let mut incoming = incoming.filter(|id| handles.contains_key(*id)).cloned();
        let mut start_error = None;

        if let Some(id) = &incoming {
            if let Some(handle) = handles.get_mut(id) {
                handle.set_volume(0.0);
                if let Err(err) = handle.start() {
                    start_error = Some(err);
                }
            }
            if start_error.is_some() {
                incoming = None;
            }
        }

        if outgoing.is_none() && incoming.is_none() {
            return FadeBegin {
                generation: self.generation,
                next_tick: None,
                start_error,
            };
        }

        let fade = ActiveFade {
            outgoing,
            incoming,
            started_at: now,
            duration_ms,
            frame_ms,
        };

        if duration_ms == 0 {
            apply(handles, &fade, 1.0);
            finish(handles, &fade);
            return FadeBegin {
                generation: self.generation,
                next_tick: None,
                start_error,
            };
        }

        apply(handles, &fade, 0.0);
        let next_tick = fade.next_tick(now);
        self.active = Some(fade);
        FadeBegin {
            generation: self.generation,
            next_tick: Some(next_tick),
            start_error,
        }
    }

    /// Advance the fade to `now`.
    pub fn tick(&mut self, generation: u64, handles: &mut HandleMap, now: u64) -> FadeStep {
        if generation != self.generation {
            return FadeStep::Stale;
        }
        let Some(fade) = &self.active else {
            return FadeStep::Stale;
        };

        let progress = fade.progress(now);
        apply(handles, fade, progress);

        if progress >= 1.0 {
            finish(handles, fade);
            self.active = None;
            FadeStep::Finished
        } else {
            FadeStep::Continue {
                next_tick: fade.next_tick(now),
            }
        }
    }

    /// Abandon the fade in flight, leaving volumes where they are.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.active = None;
    }

    /// Cancel any fade and snap to steady state: `current` at full volume
    /// and playing, every other handle silent.
    pub fn settle(
        &mut self,
        handles: &mut HandleMap,
        current: Option<&ThoughtId>,
    ) -> Result<(), AudioError> {
        self.cancel();
        let mut result = Ok(());
        for (id, handle) in handles.iter_mut() {
            if Some(id) == current {
                handle.set_volume(1.0);
                result = handle.start();
            } else {
                handle.set_volume(0.0);
            }
        }
        result
    }
}

fn apply(handles: &mut HandleMap, fade: &ActiveFade, progress: f32) {
    let (out_volume, in_volume) = fade_volumes(progress);
    if let Some(handle) = fade.outgoing.as_ref().and_then(|id| handles.get_mut(id)) {
        handle.set_volume(out_volume);
    }
    if let Some(handle) = fade.incoming.as_ref().and_then(|id| handles.get_mut(id)) {
        handle.set_volume(in_volume);
    }
    tracing::trace!(progress, out_volume, in_volume, "crossfade step");
}

fn finish(handles: &mut HandleMap, fade: &ActiveFade) {
    if let Some(handle) = fade.outgoing.as_ref().and_then(|id| handles.get_mut(id)) {
        handle.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBackend, HeadlessAudio};
    use crate::types::AudioRef;

    fn id(s: &str) -> ThoughtId {
        ThoughtId::new(s)
    }

    fn setup(ids: &[&str]) -> (HeadlessAudio, HandleMap) {
        let mut audio = HeadlessAudio::new();
        let mut handles = HandleMap::new();
        for s in ids {
            let handle = audio.load(&id(s), &AudioRef::new(format!("{s}.ogg"))).unwrap();
            handles.insert(id(s), handle);
        }
        (audio, handles)
    }

    /// Drive a fade to completion, returning the ticks it fired at.
    fn run(engine: &mut CrossfadeEngine, handles: &mut HandleMap, begin: &FadeBegin) -> Vec<u64> {
        let mut ticks = Vec::new();
        let mut next = begin.next_tick;
        while let Some(t) = next {
            ticks.push(t);
            next = match engine.tick(begin.generation, handles, t) {
                FadeStep::Continue { next_tick } => Some(next_tick),
                FadeStep::Finished => None,
                FadeStep::Stale => panic!("unexpected stale tick"),
            };
        }
        ticks
    }

    #[test]
    fn volumes_are_linear_and_complementary() {
        assert_eq!(fade_volumes(0.0), (1.0, 0.0));
        assert_eq!(fade_volumes(0.25), (0.75, 0.25));
        assert_eq!(fade_volumes(1.0), (0.0, 1.0));
        assert_eq!(fade_volumes(3.0), (0.0, 1.0));
    }

    #[test]
    fn endpoints_are_exact_for_any_duration() {
        for duration in [1, 16, 333, 1000, 1001, 4999] {
            let (audio, mut handles) = setup(&["a", "b"]);
            handles.get_mut(&id("a")).unwrap().start().unwrap();
            handles.get_mut(&id("a")).unwrap().set_volume(1.0);

            let mut engine = CrossfadeEngine::new();
            let begin = engine.begin(&mut handles, Some(&id("a")), Some(&id("b")), 500, duration, 16);
            let ticks = run(&mut engine, &mut handles, &begin);

            assert_eq!(*ticks.last().unwrap(), 500 + duration, "duration={duration}");
            let a = audio.channel(&id("a")).unwrap();
            let b = audio.channel(&id("b")).unwrap();
            assert_eq!(a.volume, 0.0);
            assert_eq!(b.volume, 1.0);
            assert!(!a.playing);
            assert!(b.playing);
            assert_eq!(engine.tick(begin.generation, &mut handles, 600 + duration), FadeStep::Stale);
        }
    }

    #[test]
    fn outgoing_and_incoming_move_in_lockstep() {
        let (audio, mut handles) = setup(&["a", "b"]);
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, Some(&id("a")), Some(&id("b")), 0, 1000, 250);
        assert_eq!(begin.next_tick, Some(250));
        assert_eq!(audio.channel(&id("a")).unwrap().volume, 1.0);
        assert_eq!(audio.channel(&id("b")).unwrap().volume, 0.0);

        let step = engine.tick(begin.generation, &mut handles, 250);
        assert_eq!(step, FadeStep::Continue { next_tick: 500 });
        assert_eq!(audio.channel(&id("a")).unwrap().volume, 0.75);
        assert_eq!(audio.channel(&id("b")).unwrap().volume, 0.25);
    }

    #[test]
    fn first_waypoint_ramps_in_without_partner() {
        let (audio, mut handles) = setup(&["a"]);
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, None, Some(&id("a")), 0, 1000, 16);
        let state = audio.channel(&id("a")).unwrap();
        assert!(state.playing);
        assert_eq!(state.volume, 0.0);

        run(&mut engine, &mut handles, &begin);
        assert_eq!(audio.channel(&id("a")).unwrap().volume, 1.0);
    }

    #[test]
    fn silent_incoming_still_fades_outgoing() {
        let (audio, mut handles) = setup(&["a"]);
        handles.get_mut(&id("a")).unwrap().start().unwrap();
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, Some(&id("a")), Some(&id("no-clip")), 0, 1000, 16);
        run(&mut engine, &mut handles, &begin);
        let a = audio.channel(&id("a")).unwrap();
        assert_eq!(a.volume, 0.0);
        assert!(!a.playing);
    }

    #[test]
    fn nothing_to_fade() {
        let (_audio, mut handles) = setup(&[]);
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, Some(&id("x")), Some(&id("y")), 0, 1000, 16);
        assert_eq!(begin.next_tick, None);
        assert_eq!(engine.tick(begin.generation, &mut handles, 16), FadeStep::Stale);
    }

    #[test]
    fn new_fade_invalidates_previous_ticks() {
        let (audio, mut handles) = setup(&["a", "b", "c"]);
        let mut engine = CrossfadeEngine::new();
        let first = engine.begin(&mut handles, Some(&id("a")), Some(&id("b")), 0, 1000, 16);
        engine.tick(first.generation, &mut handles, 16);
        let second = engine.begin(&mut handles, Some(&id("b")), Some(&id("c")), 20, 1000, 16);
        assert_ne!(first.generation, second.generation);

        let b_before = audio.channel(&id("b")).unwrap().volume;
        assert_eq!(engine.tick(first.generation, &mut handles, 500), FadeStep::Stale);
        assert_eq!(audio.channel(&id("b")).unwrap().volume, b_before);
    }

    #[test]
    fn huge_duration_does_not_overflow() {
        let (audio, mut handles) = setup(&["a"]);
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, None, Some(&id("a")), 5000, u64::MAX, 16);
        assert_eq!(begin.next_tick, Some(5016));
        let quarter = 1u64 << 62;
        let step = engine.tick(begin.generation, &mut handles, quarter);
        assert_eq!(step, FadeStep::Continue { next_tick: quarter + 16 });
        assert!((audio.channel(&id("a")).unwrap().volume - 0.25).abs() < 1e-3);
    }

    #[test]
    fn cancel_leaves_volumes_and_stales_ticks() {
        let (audio, mut handles) = setup(&["a", "b"]);
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, Some(&id("a")), Some(&id("b")), 0, 1000, 500);
        engine.tick(begin.generation, &mut handles, 500);
        engine.cancel();
        engine.cancel();
        assert_eq!(engine.tick(begin.generation, &mut handles, 1000), FadeStep::Stale);
        assert_eq!(audio.channel(&id("b")).unwrap().volume, 0.5);
    }

    #[test]
    fn zero_duration_jumps_to_end() {
        let (audio, mut handles) = setup(&["a", "b"]);
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, Some(&id("a")), Some(&id("b")), 0, 0, 16);
        assert_eq!(begin.next_tick, None);
        assert_eq!(audio.channel(&id("a")).unwrap().volume, 0.0);
        assert_eq!(audio.channel(&id("b")).unwrap().volume, 1.0);
    }

    #[test]
    fn start_failure_is_reported_and_outgoing_still_fades() {
        let (audio, mut handles) = setup(&["a", "b"]);
        audio.fail_start(AudioRef::new("b.ogg"));
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, Some(&id("a")), Some(&id("b")), 0, 100, 16);
        assert!(matches!(begin.start_error, Some(AudioError::Start { .. })));
        run(&mut engine, &mut handles, &begin);
        assert_eq!(audio.channel(&id("a")).unwrap().volume, 0.0);
        assert_eq!(audio.channel(&id("b")).unwrap().volume, 0.0);
    }

    #[test]
    fn settle_snaps_interrupted_fade() {
        let (audio, mut handles) = setup(&["a", "b"]);
        let mut engine = CrossfadeEngine::new();
        let begin = engine.begin(&mut handles, Some(&id("a")), Some(&id("b")), 0, 1000, 500);
        engine.tick(begin.generation, &mut handles, 500);
        for handle in handles.values_mut() {
            handle.pause();
        }

        engine.settle(&mut handles, Some(&id("b"))).unwrap();
        let a = audio.channel(&id("a")).unwrap();
        let b = audio.channel(&id("b")).unwrap();
        assert_eq!(a.volume, 0.0);
        assert!(!a.playing);
        assert_eq!(b.volume, 1.0);
        assert!(b.playing);
        assert_eq!(audio.audible_channels(), 1);
    }
}
