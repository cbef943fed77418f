// Map viewport capability and the eased camera flight.
//
// `Viewport` is the slice of a live map object the tour needs: read the
// center and zoom, and set the view. `HeadlessViewport` implements it in
// memory for the replay tool and tests.
//
// `CameraDriver::animate_to` captures the viewport's center at call time as
// the flight's start, then each camera timer calls `frame`, which sets the
// center to
//
//     start + (target - start) * ease(p),   ease(p) = 1 - (1 - p)^3,
//     p = min(elapsed / duration, 1)
//
// at the viewport's current zoom. The final frame is scheduled exactly at
// `started + duration`, where the center lands on the target.
//
// One flight at a time: `animate_to` and `cancel` bump the driver's
// generation, and frames stamped with an older generation are stale. A
// cancelled flight leaves the viewport wherever its last frame put it.

use std::cell::RefCell;
use std::rc::Rc;
use whisperfield_geo::LatLng;

/// The map view a tour pans.
pub trait Viewport {
    fn center(&self) -> LatLng;
    fn zoom(&self) -> f64;
    fn set_view(&mut self, center: LatLng, zoom: f64);

    /// Move the center, keeping the current zoom.
    fn pan_to(&mut self, center: LatLng) {
        let zoom = self.zoom();
        self.set_view(center, zoom);
    }
}

/// Cubic ease-out: fast start, gentle arrival.
pub fn ease_out_cubic(progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - p).powi(3)
}

// ---------------------------------------------------------------------------
// Flight driver
// ---------------------------------------------------------------------------

struct Flight {
    from: LatLng,
    to: LatLng,
    started_at: u64,
    duration_ms: u64,
    frame_ms: u64,
}

impl Flight {
    fn position(&self, now: u64) -> (LatLng, f64) {
        let elapsed = now.saturating_sub(self.started_at);
        let progress = (elapsed as f64 / self.duration_ms as f64).min(1.0);
        if progress >= 1.0 {
            return (self.to, progress);
        }
        (self.from.lerp(self.to, ease_out_cubic(progress)), progress)
    }

    fn next_tick(&self, now: u64) -> u64 {
        now.saturating_add(self.frame_ms)
            .min(self.started_at.saturating_add(self.duration_ms))
    }
}

/// Result of starting a flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlightStart {
    pub generation: u64,
    /// When the first frame is due, or `None` if the camera jumped directly.
    pub next_tick: Option<u64>,
}

/// What a camera timer did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    Stale,
    Continue { next_tick: u64 },
    Arrived,
}

#[derive(Default)]
pub struct CameraDriver {
    generation: u64,
    flight: Option<Flight>,
}

impl CameraDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start flying from the viewport's current center to `target`,
    /// abandoning any flight in progress.
    pub fn animate_to(
        &mut self,
        viewport: &mut dyn Viewport,
        target: LatLng,
        now: u64,
        duration_ms: u64,
        frame_ms: u64,
    ) -> FlightStart {
        self.cancel();

        if duration_ms == 0 {
            viewport.pan_to(target);
            return FlightStart {
                generation: self.generation,
                next_tick: None,
            };
        }

        let flight = Flight {
            from: viewport.center(),
            to: target,
            started_at: now,
            duration_ms,
            frame_ms,
        };
        tracing::trace!(from = %flight.from, to = %target, duration_ms, "camera flight");
        let next_tick = flight.next_tick(now);
        self.flight = Some(flight);
        FlightStart {
            generation: self.generation,
            next_tick: Some(next_tick),
        }
    }

    /// Apply the eased position for `now`.
    pub fn frame(&mut self, generation: u64, viewport: &mut dyn Viewport, now: u64) -> FrameStep {
        if generation != self.generation {
            return FrameStep::Stale;
        }
        let Some(flight) = &self.flight else {
            return FrameStep::Stale;
        };

        let (position, progress) = flight.position(now);
        viewport.pan_to(position);

        if progress >= 1.0 {
            self.flight = None;
            FrameStep::Arrived
        } else {
            FrameStep::Continue {
                next_tick: flight.next_tick(now),
            }
        }
    }

    /// Abandon the flight in progress.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.flight = None;
    }
}

// ---------------------------------------------------------------------------
// Headless viewport
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ViewState {
    center: LatLng,
    zoom: f64,
    updates: u64,
}

/// In-memory viewport. Clones share state, so a host can keep one clone
/// while the session owns another.
#[derive(Clone, Debug)]
pub struct HeadlessViewport {
    state: Rc<RefCell<ViewState>>,
}

impl HeadlessViewport {
    pub fn new(center: LatLng, zoom: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(ViewState {
                center,
                zoom,
                updates: 0,
            })),
        }
    }

    /// How many times the view has been set.
    pub fn updates(&self) -> u64 {
        self.state.borrow().updates
    }
}

impl Viewport for HeadlessViewport {
    fn center(&self) -> LatLng {
        self.state.borrow().center
    }

    fn zoom(&self) -> f64 {
        self.state.borrow().zoom
    }

    fn set_view(&mut self, center: LatLng, zoom: f64) {
        let mut state = self.state.borrow_mut();
        state.center = center;
        state.zoom = zoom;
        state.updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fly(driver: &mut CameraDriver, viewport: &mut HeadlessViewport, start: FlightStart) -> Vec<u64> {
        let mut frames = Vec::new();
        let mut next = start.next_tick;
        while let Some(t) = next {
            frames.push(t);
            next = match driver.frame(start.generation, viewport, t) {
                FrameStep::Continue { next_tick } => Some(next_tick),
                FrameStep::Arrived => None,
                FrameStep::Stale => panic!("unexpected stale frame"),
            };
        }
        frames
    }

    #[test]
    fn ease_out_cubic_shape() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert!((ease_out_cubic(0.5) - 0.875).abs() < 1e-12);
        // Front-loaded: more than half the distance in the first third.
        assert!(ease_out_cubic(1.0 / 3.0) > 0.5);
        assert_eq!(ease_out_cubic(2.0), 1.0);
    }

    #[test]
    fn flight_lands_on_target_at_duration() {
        let mut viewport = HeadlessViewport::new(LatLng::new(40.0, -73.0), 15.0);
        let mut driver = CameraDriver::new();
        let target = LatLng::new(40.01, -73.02);
        let start = driver.animate_to(&mut viewport, target, 1000, 2000, 16);
        let frames = fly(&mut driver, &mut viewport, start);

        assert_eq!(frames.first(), Some(&1016));
        assert_eq!(frames.last(), Some(&3000));
        assert_eq!(viewport.center(), target);
        assert_eq!(viewport.zoom(), 15.0);
        assert_eq!(driver.frame(start.generation, &mut viewport, 3016), FrameStep::Stale);
    }

    #[test]
    fn final_frame_is_the_target_even_when_lerp_rounds() {
        let from = LatLng::new(-70.7202, -74.0007);
        let target = LatLng::new(1.1897, -10.6167);
        assert_ne!(from.lerp(target, 1.0), target);

        let mut viewport = HeadlessViewport::new(from, 3.0);
        let mut driver = CameraDriver::new();
        let start = driver.animate_to(&mut viewport, target, 0, 2000, 16);
        fly(&mut driver, &mut viewport, start);
        assert_eq!(viewport.center(), target);
    }

    #[test]
    fn huge_duration_does_not_overflow() {
        let mut viewport = HeadlessViewport::new(LatLng::new(0.0, 0.0), 10.0);
        let mut driver = CameraDriver::new();
        let start = driver.animate_to(&mut viewport, LatLng::new(1.0, 1.0), 100, u64::MAX, 16);
        assert_eq!(start.next_tick, Some(116));
        let quarter = 1u64 << 62;
        assert_eq!(
            driver.frame(start.generation, &mut viewport, quarter),
            FrameStep::Continue { next_tick: quarter + 16 }
        );
    }

    #[test]
    fn frames_follow_ease_curve() {
        let origin = LatLng::new(0.0, 0.0);
        let mut viewport = HeadlessViewport::new(origin, 12.0);
        let mut driver = CameraDriver::new();
        let start = driver.animate_to(&mut viewport, LatLng::new(1.0, 2.0), 0, 1000, 500);
        assert_eq!(start.next_tick, Some(500));
        driver.frame(start.generation, &mut viewport, 500);
        let c = viewport.center();
        assert!((c.lat - 0.875).abs() < 1e-12);
        assert!((c.lng - 1.75).abs() < 1e-12);
    }

    #[test]
    fn start_point_is_read_at_call_time() {
        let mut viewport = HeadlessViewport::new(LatLng::new(0.0, 0.0), 10.0);
        viewport.pan_to(LatLng::new(5.0, 5.0));
        let mut driver = CameraDriver::new();
        let start = driver.animate_to(&mut viewport, LatLng::new(6.0, 5.0), 0, 100, 50);
        driver.frame(start.generation, &mut viewport, 50);
        assert!((viewport.center().lat - (5.0 + ease_out_cubic(0.5))).abs() < 1e-12);
    }

    #[test]
    fn retarget_stales_old_frames() {
        let mut viewport = HeadlessViewport::new(LatLng::new(0.0, 0.0), 10.0);
        let mut driver = CameraDriver::new();
        let first = driver.animate_to(&mut viewport, LatLng::new(1.0, 0.0), 0, 2000, 16);
        driver.frame(first.generation, &mut viewport, 16);
        let second = driver.animate_to(&mut viewport, LatLng::new(0.0, 1.0), 16, 2000, 16);

        let updates = viewport.updates();
        assert_eq!(driver.frame(first.generation, &mut viewport, 32), FrameStep::Stale);
        assert_eq!(viewport.updates(), updates);

        fly(&mut driver, &mut viewport, second);
        assert_eq!(viewport.center(), LatLng::new(0.0, 1.0));
    }

    #[test]
    fn cancel_freezes_viewport() {
        let mut viewport = HeadlessViewport::new(LatLng::new(0.0, 0.0), 10.0);
        let mut driver = CameraDriver::new();
        let start = driver.animate_to(&mut viewport, LatLng::new(1.0, 0.0), 0, 1000, 100);
        driver.frame(start.generation, &mut viewport, 100);
        let frozen = viewport.center();
        driver.cancel();
        driver.cancel();
        assert_eq!(driver.frame(start.generation, &mut viewport, 200), FrameStep::Stale);
        assert_eq!(viewport.center(), frozen);
    }

    #[test]
    fn zero_duration_jumps() {
        let mut viewport = HeadlessViewport::new(LatLng::new(0.0, 0.0), 9.0);
        let mut driver = CameraDriver::new();
        let start = driver.animate_to(&mut viewport, LatLng::new(3.0, 4.0), 0, 0, 16);
        assert_eq!(start.next_tick, None);
        assert_eq!(viewport.center(), LatLng::new(3.0, 4.0));
        assert_eq!(viewport.zoom(), 9.0);
    }
}
