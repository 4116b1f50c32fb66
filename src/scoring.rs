//! Course scoring and per-name deduplication.
//!
//! | Score | Formula |
//! |-------|---------|
//! | structural | `ln(1 + members) * 0.8 + ln(1 + length_km) * 0.6` |
//! | final | `structural + trust` |
//!
//! Both are rounded to 3 decimals.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::matching::TrackMatch;
use crate::Route;

/// Weight of the member-count term.
const MEMBER_WEIGHT: f64 = 0.8;

/// Weight of the length term.
const LENGTH_WEIGHT: f64 = 0.6;

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Structural score from the relation's member count and the course length.
///
/// The logarithms keep a relation with fifty members from dominating one with five
/// purely on count.
///
/// ```
/// use trek_courses::structural_score;
///
/// assert_eq!(structural_score(1, 2.0), 1.214);
/// assert_eq!(structural_score(0, 0.0), 0.0);
/// ```
pub fn structural_score(member_count: usize, length_km: f64) -> f64 {
    let members = (member_count as f64).ln_1p() * MEMBER_WEIGHT;
    let length = length_km.max(0.0).ln_1p() * LENGTH_WEIGHT;
    round_to(members + length, 3)
}

pub fn final_score(structural: f64, trust: f64) -> f64 {
    round_to(structural + trust, 3)
}

/// Attach a match result to a freshly assembled course.
///
/// Only a successful match contributes trust or sets the matched track; the
/// nearest miss stays a diagnostic of the [`TrackMatch`].
pub fn apply_track_match(mut route: Route, track_match: &TrackMatch) -> Route {
    if track_match.matched {
        route.trust_score = track_match.trust_score;
        route.matched_track = track_match.track_name.clone();
        route.matched_distance_m = Some(track_match.distance_m);
    } else {
        route.trust_score = 0.0;
        route.matched_track = None;
        route.matched_distance_m = None;
    }
    route.final_score = final_score(route.structural_score, route.trust_score);
    route
}

/// Descending by final score, then by length.
fn by_rank(a: &Route, b: &Route) -> Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| b.length_km.total_cmp(&a.length_km))
}

/// Sort courses best-first and keep only the best course per name.
///
/// The sort runs before the dedup pass, so the first course seen for a name is the
/// one to keep. The sort is stable: exact ties keep their input order.
pub fn rank_courses(mut routes: Vec<Route>) -> Vec<Route> {
    routes.sort_by(by_rank);

    let mut seen: HashSet<String> = HashSet::with_capacity(routes.len());
    routes.retain(|route| seen.insert(route.name.clone()));
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Difficulty, GpsPoint, MatchDirection};

    fn route(name: &str, length_km: f64, member_count: usize, trust: f64) -> Route {
        let structural = structural_score(member_count, length_km);
        Route {
            course_id: format!("{} ({}km)", name, length_km),
            name: name.to_string(),
            points: vec![GpsPoint::new(37.6, 127.0), GpsPoint::new(37.61, 127.0)],
            length_km,
            difficulty: Difficulty::from_length(length_km),
            start: GpsPoint::new(37.6, 127.0),
            end: GpsPoint::new(37.61, 127.0),
            member_count,
            structural_score: structural,
            trust_score: trust,
            final_score: final_score(structural, trust),
            matched_track: None,
            matched_distance_m: None,
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2.2239, 2), 2.22);
        assert_eq!(round_to(1.2346, 3), 1.235);
        assert_eq!(round_to(-1.5, 0), -2.0);
        assert_eq!(round_to(0.125, 2), 0.13);
    }

    #[test]
    fn test_structural_score_values() {
        // ln(4) * 0.8 + ln(9.4) * 0.6
        assert_eq!(structural_score(3, 8.4), 2.453);
        assert_eq!(structural_score(1, 2.0), 1.214);
        assert!(structural_score(10, 5.0) > structural_score(5, 5.0));
        assert!(structural_score(5, 10.0) > structural_score(5, 5.0));
    }

    #[test]
    fn test_final_score_rounds() {
        assert_eq!(final_score(1.214, 20.4), 21.614);
        assert_eq!(final_score(2.453, 0.0), 2.453);
    }

    #[test]
    fn test_apply_match_and_miss() {
        let base = route("Achasan", 4.2, 2, 0.0);
        let hit = TrackMatch {
            matched: true,
            trust_score: 12.0,
            distance_m: 150.0,
            track_name: Some("Achasan Ecological Trail".to_string()),
            direction: MatchDirection::Reverse,
        };
        let matched = apply_track_match(base.clone(), &hit);
        assert_eq!(matched.trust_score, 12.0);
        assert_eq!(matched.final_score, final_score(base.structural_score, 12.0));
        assert_eq!(matched.matched_track.as_deref(), Some("Achasan Ecological Trail"));
        assert_eq!(matched.matched_distance_m, Some(150.0));

        let miss = TrackMatch { matched: false, trust_score: 0.0, distance_m: 900.0, ..hit };
        let unmatched = apply_track_match(base.clone(), &miss);
        assert_eq!(unmatched.trust_score, 0.0);
        assert_eq!(unmatched.final_score, base.structural_score);
        assert!(unmatched.matched_track.is_none());
        assert!(unmatched.matched_distance_m.is_none());
    }

    #[test]
    fn test_rank_orders_by_score_then_length() {
        let ranked = rank_courses(vec![
            route("A", 3.0, 1, 0.0),
            route("B", 3.0, 1, 5.0),
            route("C", 6.0, 1, 0.0),
        ]);
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);

        // Equal final score, longer first
        let mut short = route("Short", 2.0, 1, 0.0);
        let mut long = route("Long", 4.0, 1, 0.0);
        short.final_score = 3.0;
        long.final_score = 3.0;
        let ranked = rank_courses(vec![short, long]);
        assert_eq!(ranked[0].name, "Long");
    }

    #[test]
    fn test_dedup_keeps_best_regardless_of_order() {
        let weak = route("Bugaksan", 8.4, 3, 0.0);
        let strong = route("Bugaksan", 2.0, 1, 20.4);
        let other = route("Inwangsan", 3.1, 2, 0.0);

        for input in [
            vec![weak.clone(), strong.clone(), other.clone()],
            vec![other.clone(), strong.clone(), weak.clone()],
            vec![strong.clone(), other.clone(), weak.clone()],
        ] {
            let ranked = rank_courses(input);
            assert_eq!(ranked.len(), 2);
            assert_eq!(ranked[0], strong);
            assert_eq!(ranked[1], other);
        }
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank_courses(Vec::new()).is_empty());
    }
}
