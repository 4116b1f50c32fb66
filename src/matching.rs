//! Endpoint matching against the authoritative track index.
//!
//! A course corresponds to an authoritative track when the average distance between
//! their endpoints is within the match threshold. Both orientations are tried, so a
//! course walked in the opposite direction to the recorded track still matches.
//!
//! The trust bonus falls linearly from [`TRUST_BONUS_MAX`] at zero distance to
//! [`TRUST_BONUS_MIN`] at the threshold, and is 0 beyond it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo_utils::haversine_distance;
use crate::index::{AuthoritativeIndex, AuthoritativeTrack};
use crate::GpsPoint;

/// Default match threshold in meters.
pub const DEFAULT_MATCH_THRESHOLD_M: f64 = 250.0;

/// Trust bonus at exactly the threshold distance.
pub const TRUST_BONUS_MIN: f64 = 0.0;

/// Trust bonus for coincident endpoints.
pub const TRUST_BONUS_MAX: f64 = 30.0;

/// Which pairing of endpoints produced the distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchDirection {
    /// start-start and end-end
    Same,
    /// start-end and end-start
    Reverse,
}

impl fmt::Display for MatchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Same => "same",
            Self::Reverse => "reverse",
        })
    }
}

/// Outcome of matching one course against the index.
///
/// The nearest track is reported even when it is too far to match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMatch {
    /// Nearest distance is within the threshold
    pub matched: bool,
    /// Bonus added to the course score, 0 when not matched
    pub trust_score: f64,
    /// Average endpoint distance to the nearest track (infinite for an empty index)
    pub distance_m: f64,
    /// Name of the nearest track
    pub track_name: Option<String>,
    pub direction: MatchDirection,
}

impl TrackMatch {
    /// No track to compare against.
    pub fn none() -> Self {
        Self {
            matched: false,
            trust_score: 0.0,
            distance_m: f64::INFINITY,
            track_name: None,
            direction: MatchDirection::Same,
        }
    }
}

/// Average endpoint distance between a course and a track under the better of
/// the two orientations. Ties go to [`MatchDirection::Same`].
pub fn endpoint_distance(
    start: &GpsPoint,
    end: &GpsPoint,
    track: &AuthoritativeTrack,
) -> (f64, MatchDirection) {
    let same = (haversine_distance(start, &track.start) + haversine_distance(end, &track.end)) / 2.0;
    let reverse = (haversine_distance(start, &track.end) + haversine_distance(end, &track.start)) / 2.0;

    if reverse < same {
        (reverse, MatchDirection::Reverse)
    } else {
        (same, MatchDirection::Same)
    }
}

/// Linear trust bonus for a nearest distance under a threshold.
///
/// ```
/// use trek_courses::{trust_bonus, TRUST_BONUS_MAX};
///
/// assert_eq!(trust_bonus(0.0, 250.0), TRUST_BONUS_MAX);
/// assert_eq!(trust_bonus(125.0, 250.0), 15.0);
/// assert_eq!(trust_bonus(250.0, 250.0), 0.0);
/// assert_eq!(trust_bonus(251.0, 250.0), 0.0);
/// ```
pub fn trust_bonus(distance_m: f64, threshold_m: f64) -> f64 {
    if distance_m.is_nan() || distance_m > threshold_m {
        return 0.0;
    }
    if threshold_m <= 0.0 {
        return TRUST_BONUS_MAX;
    }

    let closeness = 1.0 - (distance_m / threshold_m).clamp(0.0, 1.0);
    TRUST_BONUS_MIN + (TRUST_BONUS_MAX - TRUST_BONUS_MIN) * closeness
}

/// First track with the smallest endpoint distance.
fn nearest_track<'a>(
    start: &GpsPoint,
    end: &GpsPoint,
    tracks: impl Iterator<Item = &'a AuthoritativeTrack>,
) -> Option<(&'a AuthoritativeTrack, f64, MatchDirection)> {
    let mut best: Option<(&AuthoritativeTrack, f64, MatchDirection)> = None;

    for track in tracks {
        let (distance, direction) = endpoint_distance(start, end, track);
        if best.map_or(true, |(_, best_distance, _)| distance < best_distance) {
            best = Some((track, distance, direction));
        }
    }

    best
}

/// Match a course's endpoints against every track in the index.
///
/// The index's endpoint R-tree narrows the search to tracks with an endpoint within
/// twice the threshold of the course start, which always contains any track that
/// can match. If none of those matches, every track is scanned so the nearest one is
/// still reported.
pub fn match_endpoints(
    start: &GpsPoint,
    end: &GpsPoint,
    index: &AuthoritativeIndex,
    threshold_m: f64,
) -> TrackMatch {
    let tracks = index.tracks();

    let within_threshold = index
        .candidates_near(start, 2.0 * threshold_m)
        .and_then(|ids| {
            nearest_track(start, end, ids.into_iter().map(|i| &tracks[i]))
                .filter(|(_, distance, _)| *distance <= threshold_m)
        });

    let nearest = within_threshold.or_else(|| nearest_track(start, end, tracks.iter()));

    match nearest {
        None => TrackMatch::none(),
        Some((track, distance_m, direction)) => TrackMatch {
            matched: distance_m <= threshold_m,
            trust_score: trust_bonus(distance_m, threshold_m),
            distance_m,
            track_name: Some(track.name.clone()),
            direction,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoundingBox;
    use std::path::PathBuf;

    fn track(name: &str, start: GpsPoint, end: GpsPoint) -> AuthoritativeTrack {
        AuthoritativeTrack {
            name: name.to_string(),
            path: PathBuf::from(format!("{}.gpx", name)),
            start,
            end,
            bounds: BoundingBox::new(
                start.latitude.min(end.latitude),
                start.longitude.min(end.longitude),
                start.latitude.max(end.latitude),
                start.longitude.max(end.longitude),
            ),
        }
    }

    /// Exhaustive reference scan with no spatial index.
    fn scan_all(start: &GpsPoint, end: &GpsPoint, index: &AuthoritativeIndex) -> Option<(String, f64)> {
        nearest_track(start, end, index.tracks().iter()).map(|(t, d, _)| (t.name.clone(), d))
    }

    /// Deterministic pseudo-random sequence in [0, 1).
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    fn seoul_index() -> AuthoritativeIndex {
        let s = GpsPoint::new(37.6000, 127.0000);
        let e = GpsPoint::new(37.6200, 127.0100);
        AuthoritativeIndex::from_tracks(vec![
            track("far", GpsPoint::new(37.50, 126.90), GpsPoint::new(37.51, 126.91)),
            track("ridge", s, e),
        ])
    }

    #[test]
    fn test_exact_match_gives_max_trust() {
        let index = seoul_index();
        let m = match_endpoints(&GpsPoint::new(37.6, 127.0), &GpsPoint::new(37.62, 127.01), &index, 250.0);
        assert!(m.matched);
        assert_eq!(m.distance_m, 0.0);
        assert_eq!(m.trust_score, TRUST_BONUS_MAX);
        assert_eq!(m.track_name.as_deref(), Some("ridge"));
        assert_eq!(m.direction, MatchDirection::Same);
    }

    #[test]
    fn test_reversed_course_matches_equally() {
        let index = seoul_index();
        let s = GpsPoint::new(37.6003, 127.0004);
        let e = GpsPoint::new(37.6198, 127.0097);

        let forward = match_endpoints(&s, &e, &index, 250.0);
        let backward = match_endpoints(&e, &s, &index, 250.0);

        assert!(forward.matched && backward.matched);
        assert_eq!(forward.direction, MatchDirection::Same);
        assert_eq!(backward.direction, MatchDirection::Reverse);
        assert!((forward.trust_score - backward.trust_score).abs() < 1e-9);
        assert!((forward.distance_m - backward.distance_m).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_boundary() {
        let index = seoul_index();
        let s = GpsPoint::new(37.6010, 127.0000);
        let e = GpsPoint::new(37.6210, 127.0100);
        let distance = scan_all(&s, &e, &index).unwrap().1;

        let at = match_endpoints(&s, &e, &index, distance);
        assert!(at.matched);
        assert_eq!(at.trust_score, TRUST_BONUS_MIN);

        let beyond = match_endpoints(&s, &e, &index, distance - 1.0);
        assert!(!beyond.matched);
        assert_eq!(beyond.trust_score, 0.0);
        // Diagnostics still name the nearest track
        assert_eq!(beyond.track_name.as_deref(), Some("ridge"));
        assert_eq!(beyond.distance_m, distance);
    }

    #[test]
    fn test_trust_decreases_with_distance() {
        let mut previous = f64::INFINITY;
        for d in [0.0, 10.0, 80.0, 160.0, 249.0, 250.0] {
            let t = trust_bonus(d, 250.0);
            assert!(t < previous);
            previous = t;
        }
        assert_eq!(trust_bonus(f64::INFINITY, 250.0), 0.0);
        assert_eq!(trust_bonus(f64::NAN, 250.0), 0.0);
        assert_eq!(trust_bonus(0.0, 0.0), TRUST_BONUS_MAX);
    }

    #[test]
    fn test_empty_index() {
        let m = match_endpoints(
            &GpsPoint::new(37.6, 127.0),
            &GpsPoint::new(37.62, 127.01),
            &AuthoritativeIndex::empty(),
            250.0,
        );
        assert_eq!(m, TrackMatch::none());
    }

    #[test]
    fn test_first_track_wins_ties() {
        let s = GpsPoint::new(37.6, 127.0);
        let e = GpsPoint::new(37.62, 127.01);
        let index = AuthoritativeIndex::from_tracks(vec![track("first", s, e), track("second", e, s)]);
        let m = match_endpoints(&s, &e, &index, 250.0);
        assert_eq!(m.track_name.as_deref(), Some("first"));
    }

    #[test]
    fn test_indexed_search_agrees_with_full_scan() {
        let mut rng = Lcg(7);
        let mut tracks = Vec::new();
        for i in 0..400 {
            let s = GpsPoint::new(37.45 + rng.next() * 0.3, 126.85 + rng.next() * 0.3);
            let e = GpsPoint::new(s.latitude + (rng.next() - 0.5) * 0.05, s.longitude + (rng.next() - 0.5) * 0.05);
            tracks.push(track(&format!("t{}", i), s, e));
        }
        let index = AuthoritativeIndex::from_tracks(tracks);

        let mut matched = 0;
        for i in 0..300 {
            // Every third probe is a perturbed copy of a real track, some of them reversed
            let (s, e) = if i % 3 == 0 {
                let t = &index.tracks()[i % index.len()];
                let jitter = 0.002 * rng.next();
                let s = GpsPoint::new(t.start.latitude + jitter, t.start.longitude);
                let e = GpsPoint::new(t.end.latitude, t.end.longitude - jitter);
                if i % 2 == 0 { (e, s) } else { (s, e) }
            } else {
                (
                    GpsPoint::new(37.45 + rng.next() * 0.3, 126.85 + rng.next() * 0.3),
                    GpsPoint::new(37.45 + rng.next() * 0.3, 126.85 + rng.next() * 0.3),
                )
            };

            let m = match_endpoints(&s, &e, &index, 250.0);
            let (name, distance) = scan_all(&s, &e, &index).unwrap();
            assert_eq!(m.track_name.as_deref(), Some(name.as_str()));
            assert_eq!(m.distance_m, distance);
            assert_eq!(m.matched, distance <= 250.0);
            if m.matched {
                matched += 1;
            }
        }
        assert!(matched > 0);
    }
}
