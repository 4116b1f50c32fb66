//! Overpass QL queries and response decoding.
//!
//! Relations are requested with `out body geom`, so every way member arrives with
//! its point list inline and no second query is needed to resolve geometry.

use serde::Deserialize;
use std::collections::HashMap;

use crate::{BoundingBox, GpsPoint, RawMember, RawRelation};

/// Public Overpass API mirrors, tried in order.
pub const DEFAULT_ENDPOINTS: [&str; 3] = [
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
    "https://overpass.nchc.org.tw/api/interpreter",
];

/// Hiking and foot route relations inside `bbox`, with member geometry inlined.
///
/// ```
/// use trek_courses::BoundingBox;
/// use trek_courses::overpass::relations_query;
///
/// let q = relations_query(&BoundingBox::new(37.55, 126.98, 37.7, 127.05));
/// assert!(q.contains(r#"relation["route"="hiking"](37.55,126.98,37.7,127.05);"#));
/// assert!(q.contains("out body geom;"));
/// ```
pub fn relations_query(bbox: &BoundingBox) -> String {
    let area = format!("({},{},{},{})", bbox.south, bbox.west, bbox.north, bbox.east);
    format!(
        "[out:json][timeout:60];\n\
         (\n  \
         relation[\"route\"=\"hiking\"]{area};\n  \
         relation[\"route\"=\"foot\"]{area};\n\
         );\n\
         out body geom;\n"
    )
}

// ============================================================================
// Wire types
// ============================================================================

/// Top-level Overpass JSON document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverpassElement {
    Node {
        id: u64,
        lat: Option<f64>,
        lon: Option<f64>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    Relation {
        id: u64,
        #[serde(default)]
        tags: HashMap<String, String>,
        #[serde(default)]
        members: Vec<RelationMember>,
    },
    /// Ways, areas and anything else this crate does not read
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationMember {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub ref_id: u64,
    #[serde(default)]
    pub role: String,
    /// Present for way members; entries may be null where a vertex is unresolved
    pub geometry: Option<Vec<Option<WirePoint>>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WirePoint {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl RelationMember {
    /// Vertices with both coordinates present and in range.
    fn points(&self) -> Vec<GpsPoint> {
        self.geometry
            .iter()
            .flatten()
            .flatten()
            .filter_map(|p| match (p.lat, p.lon) {
                (Some(lat), Some(lon)) => Some(GpsPoint::new(lat, lon)),
                _ => None,
            })
            .filter(GpsPoint::is_valid)
            .collect()
    }
}

impl From<&RelationMember> for RawMember {
    fn from(member: &RelationMember) -> Self {
        RawMember {
            ref_id: member.ref_id,
            role: member.role.clone(),
            points: member.points(),
        }
    }
}

pub fn parse_response(body: &[u8]) -> Result<OverpassResponse, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Relations in response order, restricted to named ones when any are named, then
/// capped at `max_relations`.
pub fn select_relations(response: &OverpassResponse, max_relations: usize) -> Vec<RawRelation> {
    let relations: Vec<RawRelation> = response
        .elements
        .iter()
        .filter_map(|element| match element {
            OverpassElement::Relation { id, tags, members } => Some(RawRelation {
                id: *id,
                tags: tags.clone(),
                members: members.iter().map(RawMember::from).collect(),
            }),
            _ => None,
        })
        .collect();

    let any_named = relations.iter().any(|r| r.name().is_some());

    relations
        .into_iter()
        .filter(|r| !any_named || r.name().is_some())
        .take(max_relations)
        .collect()
}
