//! # Trek Courses
//!
//! Trekking course candidates built from OpenStreetMap hiking relations, checked against
//! a local collection of authoritative GPX tracks, and ranked.
//!
//! This library provides:
//! - Overpass relation fetching with endpoint rotation and 429 backoff
//! - Stitching of relation member ways into one polyline per course
//! - Difficulty classification from `sac_scale` or length
//! - A cheap endpoint index over a directory of GPX tracks
//! - Direction-tolerant endpoint matching that turns proximity into a trust bonus
//! - Composite scoring and per-name deduplication
//!
//! ## Features
//!
//! - **`http`** - Overpass HTTP client (enabled by default)
//! - **`parallel`** - Assemble and match relations in parallel with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trek_courses::{
//!     rank_relations, AuthoritativeIndex, CourseConfig, Difficulty, GpsPoint, RawMember, RawRelation,
//! };
//!
//! let relation = RawRelation::new(1, "Inwangsan Trail")
//!     .with_tag("sac_scale", "hiking")
//!     .with_member(RawMember::way(10, vec![
//!         GpsPoint::new(37.5800, 126.9580),
//!         GpsPoint::new(37.5900, 126.9600),
//!     ]))
//!     .with_member(RawMember::way(11, vec![
//!         GpsPoint::new(37.5900, 126.9600),
//!         GpsPoint::new(37.6000, 126.9650),
//!     ]));
//!
//! let courses = rank_relations(&[relation], &AuthoritativeIndex::empty(), &CourseConfig::default());
//! assert_eq!(courses.len(), 1);
//! assert_eq!(courses[0].member_count, 2);
//! assert_eq!(courses[0].difficulty, Difficulty::Easy);
//! assert!(courses[0].length_km > 2.0);
//! ```

use geo::{Coord, LineString, Rect};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

pub mod assemble;
pub mod difficulty;
pub mod error;
pub mod geo_utils;
pub mod index;
pub mod matching;
pub mod overpass;
pub mod places;
pub mod scoring;

// Overpass client (retry, backoff, endpoint rotation)
#[cfg(feature = "http")]
pub mod http;

pub use assemble::{assemble_route, stitch_members};
pub use difficulty::{classify_difficulty, Difficulty};
pub use error::{FetchError, TrackFileError};
pub use index::{AuthoritativeIndex, AuthoritativeTrack, IndexConfig, IndexKey};
pub use matching::{
    match_endpoints, trust_bonus, MatchDirection, TrackMatch, DEFAULT_MATCH_THRESHOLD_M,
    TRUST_BONUS_MAX, TRUST_BONUS_MIN,
};
pub use places::{Place, PlaceCategory};
pub use scoring::{apply_track_match, final_score, rank_courses, structural_score};

#[cfg(feature = "http")]
pub use http::{OverpassClient, OverpassConfig, RetryPolicy};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate.
///
/// # Example
/// ```
/// use trek_courses::GpsPoint;
/// let point = GpsPoint::new(37.5665, 126.9780); // Seoul City Hall
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A `(south, west, north, east)` box in degrees. Antimeridian-crossing boxes are
/// not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self { south, west, north, east }
    }

    /// Finite extents with `south < north` and `west < east`.
    pub fn is_valid(&self) -> bool {
        [self.south, self.west, self.north, self.east].iter().all(|v| v.is_finite())
            && self.south < self.north
            && self.west < self.east
    }

    pub fn contains_point(&self, point: &GpsPoint) -> bool {
        (self.south..=self.north).contains(&point.latitude)
            && (self.west..=self.east).contains(&point.longitude)
    }

    /// True if `other` lies inside `self` without touching any edge.
    pub fn strictly_contains(&self, other: &BoundingBox) -> bool {
        self.south < other.south
            && self.west < other.west
            && self.north > other.north
            && self.east > other.east
    }

    /// As a `geo::Rect` with x = longitude, y = latitude.
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.west, y: self.south },
            Coord { x: self.east, y: self.north },
        )
    }
}

/// One member of a relation, with its resolved point geometry.
///
/// Node members and members outside the query box arrive with fewer than two points
/// and are ignored when stitching, but still count towards the relation's size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMember {
    /// OSM id of the referenced element
    pub ref_id: u64,
    /// Member role ("", "forward", "alternative", ...)
    pub role: String,
    pub points: Vec<GpsPoint>,
}

impl RawMember {
    /// A way member with the given geometry and an empty role.
    pub fn way(ref_id: u64, points: Vec<GpsPoint>) -> Self {
        Self { ref_id, role: String::new(), points }
    }
}

/// A tagged OSM relation as returned by the spatial query service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRelation {
    pub id: u64,
    pub tags: HashMap<String, String>,
    pub members: Vec<RawMember>,
}

impl RawRelation {
    /// A relation with a `name` tag and no members.
    pub fn new(id: u64, name: &str) -> Self {
        Self::default().with_id(id).with_tag("name", name)
    }

    fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_member(mut self, member: RawMember) -> Self {
        self.members.push(member);
        self
    }

    /// Trimmed, non-empty value of a tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.tag("name")
    }

    /// The `sac_scale` technical grade, if tagged.
    pub fn sac_scale(&self) -> Option<&str> {
        self.tag("sac_scale")
    }
}

/// A ranked course candidate.
///
/// Built once per relation by [`assemble_route`], enriched once by
/// [`apply_track_match`], then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Display key, `"{name} ({length_km}km)"`
    pub course_id: String,
    pub name: String,
    /// Stitched polyline, at least two points
    pub points: Vec<GpsPoint>,
    /// Total length in kilometers, rounded to 2 decimals
    pub length_km: f64,
    pub difficulty: Difficulty,
    pub start: GpsPoint,
    pub end: GpsPoint,
    /// Number of members in the source relation (not the number stitched)
    pub member_count: usize,
    /// Segment-count and length term
    pub structural_score: f64,
    /// Bonus for matching an authoritative track
    pub trust_score: f64,
    /// `structural_score + trust_score`, rounded to 3 decimals
    pub final_score: f64,
    /// Name of the matched authoritative track, if within the threshold
    pub matched_track: Option<String>,
    /// Average endpoint distance to the matched track in meters
    pub matched_distance_m: Option<f64>,
}

impl Route {
    /// The polyline as a `geo::LineString` (x = longitude, y = latitude).
    pub fn line_string(&self) -> LineString<f64> {
        self.points
            .iter()
            .map(|p| Coord { x: p.longitude, y: p.latitude })
            .collect()
    }

    /// An identifier that survives renames and distinguishes same-named trails.
    ///
    /// Built from the two endpoints (sorted, so direction does not matter) rounded to
    /// 4 decimals and the length rounded to 0.1 km.
    pub fn stable_id(&self) -> String {
        let a = (round_coord(self.start.latitude), round_coord(self.start.longitude));
        let b = (round_coord(self.end.latitude), round_coord(self.end.longitude));
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!(
            "{}:{}|{}:{}|{:.1}",
            lo.0, lo.1, hi.0, hi.1, self.length_km
        )
    }
}

/// Coordinate in units of 1e-4 degrees.
fn round_coord(value: f64) -> i64 {
    (value * 10_000.0).round() as i64
}

/// Configuration for one course-ranking run.
///
/// Passed explicitly to every stage; nothing reads a global threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseConfig {
    /// Maximum relations requested from the spatial query service.
    /// Default: 50
    pub max_relations: usize,

    /// Average endpoint distance at or below which a course matches an authoritative track.
    /// Default: 250.0 meters
    pub match_threshold_m: f64,

    /// Gap below which consecutive members are treated as sharing a joint point.
    /// Default: 5.0 meters
    pub stitch_tolerance_m: f64,

    /// Shortest accepted course. Default: 1.0 km (inclusive)
    pub min_length_km: f64,

    /// Longest accepted course. Default: 35.0 km (inclusive)
    pub max_length_km: f64,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            max_relations: 50,
            match_threshold_m: DEFAULT_MATCH_THRESHOLD_M,
            stitch_tolerance_m: 5.0,
            min_length_km: 1.0,
            max_length_km: 35.0,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Anything that can resolve hiking/foot relations and their member geometry
/// inside a bounding box.
///
/// Implementations must return relations in the service's order, already
/// post-filtered (named relations preferred) and capped at `max_relations`, or a
/// [`FetchError`] once their retry budget is spent.
pub trait RelationSource {
    fn fetch_relations(
        &self,
        bbox: &BoundingBox,
        max_relations: usize,
    ) -> impl Future<Output = Result<Vec<RawRelation>, FetchError>> + Send;
}

/// Turn raw relations into the ranked, deduplicated course list.
///
/// Relations that do not assemble into a usable course are dropped. Each surviving
/// course is matched against `index` with `config.match_threshold_m`, scored, and
/// the best course per name is kept.
pub fn rank_relations(
    relations: &[RawRelation],
    index: &AuthoritativeIndex,
    config: &CourseConfig,
) -> Vec<Route> {
    let start = Instant::now();

    let build = |relation: &RawRelation| -> Option<Route> {
        let route = assemble_route(relation, config)?;
        let track_match = match_endpoints(&route.start, &route.end, index, config.match_threshold_m);
        if track_match.matched {
            debug!(
                "[Courses] {} matches '{}' at {:.0}m ({}), trust {:.2}",
                route.name,
                track_match.track_name.as_deref().unwrap_or("?"),
                track_match.distance_m,
                track_match.direction,
                track_match.trust_score
            );
        }
        Some(apply_track_match(route, &track_match))
    };

    #[cfg(feature = "parallel")]
    let candidates: Vec<Route> = {
        use rayon::prelude::*;
        relations.par_iter().filter_map(build).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let candidates: Vec<Route> = relations.iter().filter_map(build).collect();

    let candidate_count = candidates.len();
    let ranked = rank_courses(candidates);

    info!(
        "[Courses] {} relations -> {} candidates -> {} courses ({} authoritative tracks) in {:?}",
        relations.len(),
        candidate_count,
        ranked.len(),
        index.len(),
        start.elapsed()
    );

    ranked
}

/// Fetch relations inside `bbox` and rank them.
///
/// Returns `Err` only when the source gives up; an area without usable courses
/// yields `Ok` with an empty list.
pub async fn build_courses<S: RelationSource>(
    source: &S,
    bbox: &BoundingBox,
    index: &AuthoritativeIndex,
    config: &CourseConfig,
) -> Result<Vec<Route>, FetchError> {
    let relations = source.fetch_relations(bbox, config.max_relations).await?;
    Ok(rank_relations(&relations, index, config))
}

/// Synchronous wrapper around [`build_courses`] - runs it on a current-thread tokio runtime.
///
/// For synchronous callers only: calling it from inside a tokio runtime panics.
/// Async code should await [`build_courses`] directly.
#[cfg(feature = "http")]
pub fn build_courses_blocking<S: RelationSource>(
    source: &S,
    bbox: &BoundingBox,
    index: &AuthoritativeIndex,
    config: &CourseConfig,
) -> Result<Vec<Route>, FetchError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| FetchError::Runtime(e.to_string()))?;

    runtime.block_on(build_courses(source, bbox, index, config))
}

// ============================================================================
// Tests
// ============================================================================
