//! Relation to course assembly.
//!
//! Member ways are concatenated in relation order. When a member starts within the
//! stitch tolerance of the polyline built so far, its first point is treated as the
//! shared joint and dropped. Members are never reordered or reversed.

use log::debug;

use crate::difficulty::classify_difficulty;
use crate::geo_utils::{haversine_distance, polyline_length};
use crate::scoring::{round_to, structural_score};
use crate::{CourseConfig, GpsPoint, RawMember, RawRelation, Route};

/// Concatenate member geometries into one polyline.
///
/// Members with fewer than two points are skipped.
pub fn stitch_members(members: &[RawMember], tolerance_m: f64) -> Vec<GpsPoint> {
    let mut polyline: Vec<GpsPoint> = Vec::new();

    for member in members.iter().filter(|m| m.points.len() >= 2) {
        let joins = polyline
            .last()
            .is_some_and(|last| haversine_distance(last, &member.points[0]) < tolerance_m);

        if joins {
            polyline.extend_from_slice(&member.points[1..]);
        } else {
            polyline.extend_from_slice(&member.points);
        }
    }

    polyline
}

/// Build a course from one relation, or `None` if it is not usable.
///
/// Rejected when the relation has no name, stitches to fewer than two points, or
/// its length (rounded to 2 decimals) falls outside
/// `[config.min_length_km, config.max_length_km]`. The result carries its structural
/// score and no trust bonus yet.
///
/// ```
/// use trek_courses::{assemble_route, CourseConfig, GpsPoint, RawMember, RawRelation};
///
/// let rel = RawRelation::new(42, "Gwanaksan Loop").with_member(RawMember::way(
///     1,
///     vec![GpsPoint::new(37.44, 126.96), GpsPoint::new(37.46, 126.96)],
/// ));
/// let route = assemble_route(&rel, &CourseConfig::default()).unwrap();
/// assert_eq!(route.length_km, 2.22);
/// assert_eq!(route.course_id, "Gwanaksan Loop (2.22km)");
/// ```
pub fn assemble_route(relation: &RawRelation, config: &CourseConfig) -> Option<Route> {
    let Some(name) = relation.name() else {
        debug!("[Assemble] Relation {} has no name, skipping", relation.id);
        return None;
    };

    let points = stitch_members(&relation.members, config.stitch_tolerance_m);
    if points.len() < 2 {
        debug!("[Assemble] {} ({}) has {} usable points, skipping", name, relation.id, points.len());
        return None;
    }

    let length_km = round_to(polyline_length(&points), 2);
    if length_km < config.min_length_km || length_km > config.max_length_km {
        debug!("[Assemble] {} ({}) is {}km, outside limits, skipping", name, relation.id, length_km);
        return None;
    }

    let member_count = relation.members.len();
    let structural = structural_score(member_count, length_km);

    Some(Route {
        course_id: format!("{} ({}km)", name, length_km),
        name: name.to_string(),
        difficulty: classify_difficulty(relation.sac_scale(), length_km),
        start: points[0],
        end: points[points.len() - 1],
        points,
        length_km,
        member_count,
        structural_score: structural,
        trust_score: 0.0,
        final_score: structural,
        matched_track: None,
        matched_distance_m: None,
    })
}
