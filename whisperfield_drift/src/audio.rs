// Audio playback capability interfaces and the headless backend.
//
// Drift Mode never talks to an audio library directly. It sees clips through
// two narrow traits:
// - `AudioBackend` resolves an `AudioRef` into a playback handle.
// - `AudioHandle` is one loaded clip: start, pause, stop+dispose, volume,
//   and an edge-triggered end-of-playback notification.
//
// The crossfade engine and the resource manager only use these traits, so
// the same session code runs against a real output device (see the
// `speakers` feature of `whisperfield_replay`) or the in-memory
// `HeadlessAudio` below.
//
// `HeadlessAudio` keeps every channel's state in a shared `Rc<RefCell<_>>`
// mixer. Handles write to it; the host (or a test) keeps a clone of the
// backend to read it back after the session has taken ownership of the
// handles. It can also be told to fail specific loads or starts, and to
// report a clip as finished.
//
// Everything here is single-threaded by construction.

use crate::types::{AudioRef, ThoughtId};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use thiserror::Error;

/// Per-waypoint playback handles for the current path, keyed by thought.
pub type HandleMap = BTreeMap<ThoughtId, Box<dyn AudioHandle>>;

/// Why a clip could not be played.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("failed to load audio {reference}: {reason}")]
    Load { reference: AudioRef, reason: String },
    #[error("failed to start audio {reference}: {reason}")]
    Start { reference: AudioRef, reason: String },
}

/// One loaded clip.
///
/// `stop` must be idempotent and leave the handle inert: after it, no sound,
/// no pending notifications, and every other method is a no-op.
pub trait AudioHandle {
    /// Begin or continue playback at the current volume.
    fn start(&mut self) -> Result<(), AudioError>;
    /// Suspend playback, keeping the position.
    fn pause(&mut self);
    /// Stop playback and release the underlying resources.
    fn stop(&mut self);
    /// Set the volume. Values are clamped to `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
    fn is_playing(&self) -> bool;
    /// Returns true exactly once after the clip plays to its end.
    fn take_ended(&mut self) -> bool;
}

/// Factory for playback handles.
pub trait AudioBackend {
    /// Load the clip for one thought. The returned handle must not be
    /// playing.
    fn load(
        &mut self,
        thought_id: &ThoughtId,
        reference: &AudioRef,
    ) -> Result<Box<dyn AudioHandle>, AudioError>;
}

// ---------------------------------------------------------------------------
// Headless backend
// ---------------------------------------------------------------------------

/// Observable state of one headless channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelState {
    pub thought_id: ThoughtId,
    pub reference: AudioRef,
    pub volume: f32,
    pub playing: bool,
    pub disposed: bool,
    /// How many times `start` succeeded on this channel.
    pub starts: u32,
    ended: bool,
}

#[derive(Debug, Default)]
struct Mixer {
    channels: Vec<ChannelState>,
    failing_loads: BTreeSet<AudioRef>,
    failing_starts: BTreeSet<AudioRef>,
}

/// In-memory audio backend that records what the session does to each clip.
#[derive(Clone, Debug, Default)]
pub struct HeadlessAudio {
    mixer: Rc<RefCell<Mixer>>,
}

impl HeadlessAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future load of `reference` fail.
    pub fn fail_load(&self, reference: AudioRef) {
        self.mixer.borrow_mut().failing_loads.insert(reference);
    }

    /// Make every future start of `reference` fail.
    pub fn fail_start(&self, reference: AudioRef) {
        self.mixer.borrow_mut().failing_starts.insert(reference);
    }

    /// State of the most recently loaded channel for `thought_id`.
    pub fn channel(&self, thought_id: &ThoughtId) -> Option<ChannelState> {
        self.mixer
            .borrow()
            .channels
            .iter()
            .rev()
            .find(|c| &c.thought_id == thought_id)
            .cloned()
    }

    /// Every channel ever loaded, in load order.
    pub fn channels(&self) -> Vec<ChannelState> {
        self.mixer.borrow().channels.clone()
    }

    /// Channels not yet disposed.
    pub fn live_channels(&self) -> usize {
        self.count(|c| !c.disposed)
    }

    /// Channels currently playing, at any volume.
    pub fn playing_channels(&self) -> usize {
        self.count(|c| c.playing)
    }

    /// Channels currently playing at non-zero volume.
    pub fn audible_channels(&self) -> usize {
        self.count(|c| c.playing && c.volume > 0.0)
    }

    /// Simulate the live clip of `thought_id` reaching its end.
    pub fn finish(&self, thought_id: &ThoughtId) {
        let mut mixer = self.mixer.borrow_mut();
        if let Some(channel) = mixer
            .channels
            .iter_mut()
            .rev()
            .find(|c| &c.thought_id == thought_id && !c.disposed)
        {
            channel.playing = false;
            channel.ended = true;
        }
    }

    fn count(&self, pred: impl Fn(&ChannelState) -> bool) -> usize {
        self.mixer.borrow().channels.iter().filter(|c| pred(c)).count()
    }
}

impl AudioBackend for HeadlessAudio {
    fn load(
        &mut self,
        thought_id: &ThoughtId,
        reference: &AudioRef,
    ) -> Result<Box<dyn AudioHandle>, AudioError> {
        let mut mixer = self.mixer.borrow_mut();
        if mixer.failing_loads.contains(reference) {
            return Err(AudioError::Load {
                reference: reference.clone(),
                reason: "clip unavailable".into(),
            });
        }
        let index = mixer.channels.len();
        mixer.channels.push(ChannelState {
            thought_id: thought_id.clone(),
            reference: reference.clone(),
            volume: 0.0,
            playing: false,
            disposed: false,
            starts: 0,
            ended: false,
        });
        Ok(Box::new(HeadlessHandle {
            index,
            mixer: Rc::clone(&self.mixer),
        }))
    }
}

struct HeadlessHandle {
    index: usize,
    mixer: Rc<RefCell<Mixer>>,
}

impl HeadlessHandle {
    fn with_channel<R>(&self, f: impl FnOnce(&mut ChannelState) -> R) -> Option<R> {
        let mut mixer = self.mixer.borrow_mut();
        let channel = &mut mixer.channels[self.index];
        if channel.disposed { None } else { Some(f(channel)) }
    }
}

impl AudioHandle for HeadlessHandle {
    fn start(&mut self) -> Result<(), AudioError> {
        let mut mixer = self.mixer.borrow_mut();
        let Mixer {
            channels,
            failing_starts,
            ..
        } = &mut *mixer;
        let channel = &mut channels[self.index];
        if channel.disposed {
            return Err(AudioError::Start {
                reference: channel.reference.clone(),
                reason: "handle already disposed".into(),
            });
        }
        if failing_starts.contains(&channel.reference) {
            return Err(AudioError::Start {
                reference: channel.reference.clone(),
                reason: "playback refused".into(),
            });
        }
        channel.playing = true;
        channel.starts += 1;
        Ok(())
    }

    fn pause(&mut self) {
        self.with_channel(|c| c.playing = false);
    }

    fn stop(&mut self) {
        let mut mixer = self.mixer.borrow_mut();
        let channel = &mut mixer.channels[self.index];
        channel.playing = false;
        channel.volume = 0.0;
        channel.ended = false;
        channel.disposed = true;
    }

    fn set_volume(&mut self, volume: f32) {
        self.with_channel(|c| c.volume = volume.clamp(0.0, 1.0));
    }

    fn volume(&self) -> f32 {
        self.mixer.borrow().channels[self.index].volume
    }

    fn is_playing(&self) -> bool {
        self.mixer.borrow().channels[self.index].playing
    }

    fn take_ended(&mut self) -> bool {
        self.with_channel(|c| std::mem::take(&mut c.ended))
            .unwrap_or(false)
    }
}
