// Tour path planning over the visible thought pool.
//
// `compute_path` turns an origin and the thoughts the client already holds
// into a short visiting order:
//
//   1. Drop candidates sitting exactly on the origin (no zero-length hop).
//   2. Keep the `max_stops` candidates nearest the origin. The sort is
//      stable, so equal distances keep pool order. A thought listed more
//      than once is kept only at its nearest entry.
//   3. Order them greedily: start at the one nearest the origin, then
//      repeatedly hop to the unvisited candidate nearest the *previous stop*.
//
// Nearest-neighbor is not an optimal tour, only a cheap one that avoids
// obvious back-and-forth. With at most a handful of stops the quadratic
// scan is negligible.
//
// No network, no errors: an empty result is how "nothing to visit" is
// reported. See also: `session.rs`, which calls this on every start command.

use std::collections::BTreeSet;

use crate::types::{Path, Thought, Waypoint};
use whisperfield_geo::{LatLng, haversine_km};

/// Build the visiting order for a tour starting at `center`.
pub fn compute_path(center: LatLng, candidates: &[Thought], max_stops: usize) -> Path {
    let mut nearest: Vec<(&Thought, f64)> = candidates
        .iter()
        .filter(|t| t.position != center)
        .map(|t| (t, haversine_km(center, t.position)))
        .collect();
    // `sort_by` is stable: ties keep their pool order.
    nearest.sort_by(|a, b| a.1.total_cmp(&b.1));
    let mut seen = BTreeSet::new();
    nearest.retain(|(t, _)| seen.insert(&t.id));
    nearest.truncate(max_stops);

    let mut remaining: Vec<&Thought> = nearest.into_iter().map(|(t, _)| t).collect();
    if remaining.is_empty() {
        return Path::default();
    }

    let mut ordered = Vec::with_capacity(remaining.len());
    let mut current = remaining.remove(0);
    ordered.push(Waypoint::from_thought(current.clone()));

    while !remaining.is_empty() {
        let mut best_index = 0;
        let mut best_distance = f64::INFINITY;
        for (i, candidate) in remaining.iter().enumerate() {
            let d = haversine_km(current.position, candidate.position);
            // Strict `<` keeps the earliest candidate on ties.
            if d < best_distance {
                best_distance = d;
                best_index = i;
            }
        }
        current = remaining.remove(best_index);
        ordered.push(Waypoint::from_thought(current.clone()));
    }

    tracing::debug!(
        stops = ordered.len(),
        pool = candidates.len(),
        "computed drift path"
    );
    Path::new(ordered)
}
