//! Cafés and bars near a course, for the after-hike stop.
//!
//! Candidates are Overpass nodes tagged `amenity=cafe|bar|pub` within a radius.
//! Each gets a 0-5 quality score from how complete its tags are, and a combined
//! score weighting proximity 0.6 and quality 0.4.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::geo_utils::haversine;
use crate::overpass::{OverpassElement, OverpassResponse};
use crate::scoring::round_to;

const DISTANCE_WEIGHT: f64 = 0.6;
const QUALITY_WEIGHT: f64 = 0.4;
const MAX_QUALITY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceCategory {
    Coffee,
    Beer,
}

impl PlaceCategory {
    /// `cafe` is coffee; bars, pubs and anything else are beer.
    pub fn from_amenity(amenity: &str) -> Self {
        if amenity == "cafe" {
            Self::Coffee
        } else {
            Self::Beer
        }
    }
}

impl fmt::Display for PlaceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Coffee => "coffee",
            Self::Beer => "beer",
        })
    }
}

/// A recommended place near a course endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub category: PlaceCategory,
    pub latitude: f64,
    pub longitude: f64,
    /// Whole meters from the search origin, truncated
    pub distance_m: u32,
    /// 0-5: +2 opening hours, +2 website, +1 street address
    pub quality_score: u8,
    /// Empty when untagged
    pub opening_hours: String,
    /// `website`, else `contact:website`, else empty
    pub website: String,
    /// Proximity and quality blend, rounded to 3 decimals
    pub combined_score: f64,
}

/// Named cafe, bar and pub nodes within `radius_m` of a point.
pub fn places_query(lat: f64, lon: f64, radius_m: u32) -> String {
    let around = format!("(around:{},{},{})", radius_m, lat, lon);
    format!(
        "[out:json][timeout:45];\n\
         (\n  \
         node{around}[amenity=cafe];\n  \
         node{around}[amenity=bar];\n  \
         node{around}[amenity=pub];\n\
         );\n\
         out body;\n"
    )
}

fn non_empty<'a>(tags: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Tag completeness, capped at 5.
pub fn quality_score(tags: &HashMap<String, String>) -> u8 {
    let mut quality = 0;
    if non_empty(tags, "opening_hours").is_some() {
        quality += 2;
    }
    if non_empty(tags, "website").or_else(|| non_empty(tags, "contact:website")).is_some() {
        quality += 2;
    }
    if non_empty(tags, "addr:street").or_else(|| non_empty(tags, "addr:full")).is_some() {
        quality += 1;
    }
    quality.min(MAX_QUALITY)
}

/// Turn one element into a place, or `None` for anything that is not a named node
/// with coordinates. The combined score is left at 0 until ranking.
pub fn extract_place(element: &OverpassElement, origin_lat: f64, origin_lon: f64) -> Option<Place> {
    let OverpassElement::Node { lat: Some(lat), lon: Some(lon), tags, .. } = element else {
        return None;
    };
    let name = non_empty(tags, "name")?;

    let distance = haversine(origin_lat, origin_lon, *lat, *lon);

    Some(Place {
        name: name.to_string(),
        category: PlaceCategory::from_amenity(tags.get("amenity").map_or("", String::as_str)),
        latitude: *lat,
        longitude: *lon,
        distance_m: distance as u32,
        quality_score: quality_score(tags),
        opening_hours: non_empty(tags, "opening_hours").unwrap_or_default().to_string(),
        website: non_empty(tags, "website")
            .or_else(|| non_empty(tags, "contact:website"))
            .unwrap_or_default()
            .to_string(),
        combined_score: 0.0,
    })
}

/// `(1 - d / max(1, radius)) * 0.6 + quality / 5 * 0.4`, rounded to 3 decimals.
///
/// ```
/// use trek_courses::places::combined_score;
///
/// assert_eq!(combined_score(0, 5, 800), 1.0);
/// assert_eq!(combined_score(400, 0, 800), 0.3);
/// ```
pub fn combined_score(distance_m: u32, quality: u8, radius_m: u32) -> f64 {
    let proximity = 1.0 - distance_m as f64 / radius_m.max(1) as f64;
    let quality = quality as f64 / MAX_QUALITY as f64;
    round_to(proximity * DISTANCE_WEIGHT + quality * QUALITY_WEIGHT, 3)
}

/// Extract, score and sort the places in a response, best first.
pub fn rank_places(response: &OverpassResponse, lat: f64, lon: f64, radius_m: u32) -> Vec<Place> {
    let mut places: Vec<Place> = response
        .elements
        .iter()
        .filter_map(|element| extract_place(element, lat, lon))
        .map(|mut place| {
            place.combined_score = combined_score(place.distance_m, place.quality_score, radius_m);
            place
        })
        .collect();

    places.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    places
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overpass::parse_response;

    // Origin: Bukhansan Ui trailhead
    const LAT: f64 = 37.6590;
    const LON: f64 = 127.0110;

    fn response() -> OverpassResponse {
        let body = r#"{"elements": [
            {"type": "node", "id": 1, "lat": 37.6595, "lon": 127.0110,
             "tags": {"amenity": "cafe", "name": "Ui Coffee", "opening_hours": "09:00-21:00",
                      "contact:website": "https://example.org", "addr:street": "Samyang-ro"}},
            {"type": "node", "id": 2, "lat": 37.6620, "lon": 127.0110,
             "tags": {"amenity": "pub", "name": "Summit Taproom"}},
            {"type": "node", "id": 3, "lat": 37.6591, "lon": 127.0111,
             "tags": {"amenity": "bar"}},
            {"type": "node", "id": 4, "tags": {"amenity": "cafe", "name": "No Coordinates"}},
            {"type": "relation", "id": 5, "tags": {"name": "Not a node"}}
        ]}"#;
        parse_response(body.as_bytes()).unwrap()
    }

    #[test]
    fn test_query_shape() {
        let q = places_query(37.659, 127.011, 800);
        assert!(q.contains("node(around:800,37.659,127.011)[amenity=cafe];"));
        assert!(q.contains("[amenity=pub]"));
        assert!(q.trim_end().ends_with("out body;"));
    }

    #[test]
    fn test_quality_score() {
        let mut tags = HashMap::new();
        assert_eq!(quality_score(&tags), 0);
        tags.insert("opening_hours".to_string(), "24/7".to_string());
        assert_eq!(quality_score(&tags), 2);
        tags.insert("website".to_string(), "https://a".to_string());
        tags.insert("contact:website".to_string(), "https://b".to_string());
        assert_eq!(quality_score(&tags), 4);
        tags.insert("addr:full".to_string(), "1 Ui-dong".to_string());
        assert_eq!(quality_score(&tags), 5);
        tags.insert("website".to_string(), String::new());
        assert_eq!(quality_score(&tags), 5);
    }

    #[test]
    fn test_rank_places() {
        let places = rank_places(&response(), LAT, LON, 800);
        assert_eq!(places.len(), 2);

        let cafe = &places[0];
        assert_eq!(cafe.name, "Ui Coffee");
        assert_eq!(cafe.category, PlaceCategory::Coffee);
        assert_eq!(cafe.quality_score, 5);
        assert_eq!(cafe.website, "https://example.org");
        assert_eq!(cafe.opening_hours, "09:00-21:00");
        // ~55.6 m north, truncated
        assert_eq!(cafe.distance_m, 55);
        assert_eq!(cafe.combined_score, combined_score(55, 5, 800));

        let pub_ = &places[1];
        assert_eq!(pub_.category, PlaceCategory::Beer);
        assert_eq!(pub_.quality_score, 0);
        assert!(pub_.website.is_empty());
        assert!(cafe.combined_score > pub_.combined_score);
    }

    #[test]
    fn test_combined_score_zero_radius() {
        // Radius floors at 1 m
        assert_eq!(combined_score(0, 0, 0), 0.6);
        assert!(combined_score(2000, 0, 800) < 0.0);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(PlaceCategory::from_amenity("bar").to_string(), "beer");
        assert_eq!(PlaceCategory::from_amenity("cafe").to_string(), "coffee");
    }
}
