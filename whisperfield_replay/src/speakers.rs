// Audio backend that plays waypoint clips on the default output device.
//
// Each loaded clip gets its own rodio `Sink`, created paused at volume 0 so
// the session's crossfade decides when it becomes audible. The output
// stream must outlive every sink, so the backend keeps it alive; the
// session drops its handles before the backend.
//
// Clip references are file paths relative to the `--clips` directory.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use whisperfield_drift::audio::{AudioBackend, AudioError, AudioHandle};
use whisperfield_drift::types::{AudioRef, ThoughtId};

pub struct RodioBackend {
    /// rodio output stream (must be kept alive)
    _stream: OutputStream,
    handle: OutputStreamHandle,
    clip_root: PathBuf,
}

impl RodioBackend {
    pub fn open(clip_root: &Path) -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("no audio output device available")?;
        tracing::info!(clips = %clip_root.display(), "audio output initialized");
        Ok(Self {
            _stream: stream,
            handle,
            clip_root: clip_root.to_path_buf(),
        })
    }
}

impl AudioBackend for RodioBackend {
    fn load(
        &mut self,
        thought_id: &ThoughtId,
        reference: &AudioRef,
    ) -> Result<Box<dyn AudioHandle>, AudioError> {
        let load_error = |reason: String| AudioError::Load {
            reference: reference.clone(),
            reason,
        };

        let path = self.clip_root.join(reference.as_str());
        let file = File::open(&path).map_err(|e| load_error(format!("{}: {e}", path.display())))?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| load_error(e.to_string()))?;
        let sink = Sink::try_new(&self.handle).map_err(|e| load_error(e.to_string()))?;

        sink.pause();
        sink.set_volume(0.0);
        sink.append(source);
        tracing::debug!(thought = %thought_id, clip = %path.display(), "clip loaded");

        Ok(Box::new(SinkHandle {
            sink,
            reference: reference.clone(),
            volume: 0.0,
            started: false,
            end_reported: false,
            disposed: false,
        }))
    }
}

struct SinkHandle {
    sink: Sink,
    reference: AudioRef,
    volume: f32,
    started: bool,
    end_reported: bool,
    disposed: bool,
}

impl AudioHandle for SinkHandle {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.disposed {
            return Err(AudioError::Start {
                reference: self.reference.clone(),
                reason: "sink already stopped".into(),
            });
        }
        self.sink.play();
        self.started = true;
        Ok(())
    }

    fn pause(&mut self) {
        if !self.disposed {
            self.sink.pause();
        }
    }

    fn stop(&mut self) {
        if !self.disposed {
            self.sink.stop();
            self.disposed = true;
            self.volume = 0.0;
        }
    }

    fn set_volume(&mut self, volume: f32) {
        if !self.disposed {
            self.volume = volume.clamp(0.0, 1.0);
            self.sink.set_volume(self.volume);
        }
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn is_playing(&self) -> bool {
        !self.disposed && self.started && !self.sink.is_paused() && !self.sink.empty()
    }

    fn take_ended(&mut self) -> bool {
        if self.disposed || !self.started || self.end_reported || !self.sink.empty() {
            return false;
        }
        self.end_reported = true;
        true
    }
}
