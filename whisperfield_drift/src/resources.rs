// Audio resource lifecycle for one tour.
//
// `acquire` loads one handle per waypoint that carries a clip, silent and
// not started. `release` stops and disposes every handle and empties the
// map. The session calls `release` on every way a tour can end (completion,
// exit, restart, drop), and calling it again on an empty map does nothing.
//
// A clip that fails to load is left out of the map and reported back to the
// caller; that waypoint dwells silently. Loading never aborts a tour.

use crate::audio::{AudioBackend, AudioError, HandleMap};
use crate::types::{Path, ThoughtId};
use std::collections::btree_map::Entry;

/// The outcome of loading a path's clips.
pub struct Acquired {
    pub handles: HandleMap,
    /// Waypoints whose clip could not be loaded.
    pub failures: Vec<(ThoughtId, AudioError)>,
}

/// Load a silent, stopped handle for each waypoint with audio.
pub fn acquire(backend: &mut dyn AudioBackend, path: &Path) -> Acquired {
    let mut handles = HandleMap::new();
    let mut failures = Vec::new();

    for waypoint in path.iter() {
        let Some(reference) = waypoint.audio() else {
            continue;
        };
        // A thought listed twice in the pool shares one handle.
        let Entry::Vacant(slot) = handles.entry(waypoint.thought_id().clone()) else {
            continue;
        };
        match backend.load(waypoint.thought_id(), reference) {
            Ok(mut handle) => {
                handle.set_volume(0.0);
                slot.insert(handle);
            }
            Err(err) => {
                tracing::warn!(thought = %waypoint.thought_id(), error = %err, "audio load failed, dwelling silently");
                failures.push((waypoint.thought_id().clone(), err));
            }
        }
    }

    tracing::debug!(
        loaded = handles.len(),
        failed = failures.len(),
        "acquired tour audio"
    );
    Acquired { handles, failures }
}

/// Stop and dispose every handle, leaving the map empty. Returns how many
/// handles were released.
pub fn release(handles: &mut HandleMap) -> usize {
    let released = handles.len();
    for handle in handles.values_mut() {
        handle.stop();
    }
    handles.clear();
    if released > 0 {
        tracing::debug!(released, "released tour audio");
    }
    released
}

/// Pause every handle without disposing it.
pub fn pause_all(handles: &mut HandleMap) {
    for handle in handles.values_mut() {
        handle.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::HeadlessAudio;
    use crate::types::{AudioRef, Thought, Waypoint};
    use chrono::DateTime;
    use whisperfield_geo::LatLng;

    fn waypoint(id: &str, audio: Option<&str>) -> Waypoint {
        Waypoint::from_thought(Thought {
            id: ThoughtId::new(id),
            text: String::new(),
            position: LatLng::new(0.0, 0.0),
            audio: audio.map(AudioRef::new),
            mood: None,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
        })
    }

    #[test]
    fn acquires_only_waypoints_with_audio() {
        let mut audio = HeadlessAudio::new();
        let path = Path::new(vec![
            waypoint("a", Some("a.ogg")),
            waypoint("b", None),
            waypoint("c", Some("c.ogg")),
        ]);
        let acquired = acquire(&mut audio, &path);
        assert_eq!(acquired.handles.len(), 2);
        assert!(acquired.handles.contains_key(&ThoughtId::new("a")));
        assert!(!acquired.handles.contains_key(&ThoughtId::new("b")));
        assert!(acquired.failures.is_empty());
        // Nothing starts at acquisition time.
        assert_eq!(audio.playing_channels(), 0);
        assert!(acquired.handles.values().all(|h| h.volume() == 0.0));
    }

    #[test]
    fn load_failure_is_reported_not_fatal() {
        let mut audio = HeadlessAudio::new();
        audio.fail_load(AudioRef::new("broken.ogg"));
        let path = Path::new(vec![
            waypoint("a", Some("broken.ogg")),
            waypoint("b", Some("b.ogg")),
        ]);
        let acquired = acquire(&mut audio, &path);
        assert_eq!(acquired.handles.len(), 1);
        assert_eq!(acquired.failures.len(), 1);
        assert_eq!(acquired.failures[0].0, ThoughtId::new("a"));
    }

    #[test]
    fn duplicate_thought_gets_one_handle() {
        let mut audio = HeadlessAudio::new();
        let path = Path::new(vec![waypoint("a", Some("a.ogg")), waypoint("a", Some("a.ogg"))]);
        let acquired = acquire(&mut audio, &path);
        assert_eq!(acquired.handles.len(), 1);
        assert_eq!(audio.channels().len(), 1);
    }

    #[test]
    fn release_twice_matches_release_once() {
        let mut audio = HeadlessAudio::new();
        let path = Path::new(vec![waypoint("a", Some("a.ogg")), waypoint("b", Some("b.ogg"))]);
        let mut handles = acquire(&mut audio, &path).handles;
        for handle in handles.values_mut() {
            handle.start().unwrap();
        }

        assert_eq!(release(&mut handles), 2);
        let after_once = audio.channels();
        assert_eq!(release(&mut handles), 0);
        assert_eq!(audio.channels(), after_once);

        assert!(handles.is_empty());
        assert_eq!(audio.live_channels(), 0);
        assert_eq!(audio.playing_channels(), 0);
    }

    #[test]
    fn pause_all_keeps_handles() {
        let mut audio = HeadlessAudio::new();
        let path = Path::new(vec![waypoint("a", Some("a.ogg"))]);
        let mut handles = acquire(&mut audio, &path).handles;
        for handle in handles.values_mut() {
            handle.start().unwrap();
        }
        pause_all(&mut handles);
        assert_eq!(handles.len(), 1);
        assert_eq!(audio.playing_channels(), 0);
        assert_eq!(audio.live_channels(), 1);
    }
}
