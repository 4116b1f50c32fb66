//! Fetch and rank trekking courses around a point, with café and bar picks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example rank_courses -- 37.6588 126.9779 5 ./gpx
//!
//! Arguments: latitude, longitude, radius in km, optional GPX directory.

use std::env;
use std::process::ExitCode;

use trek_courses::geo_utils::bbox_from_center;
use trek_courses::{
    build_courses, AuthoritativeIndex, CourseConfig, IndexConfig, OverpassClient, OverpassConfig,
};

const PLACES_RADIUS_M: u32 = 800;
const TOP_COURSES: usize = 3;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let lat: f64 = args.first().and_then(|v| v.parse().ok()).unwrap_or(37.6588);
    let lon: f64 = args.get(1).and_then(|v| v.parse().ok()).unwrap_or(126.9779);
    let radius_km: f64 = args.get(2).and_then(|v| v.parse().ok()).unwrap_or(5.0);

    let bbox = bbox_from_center(lat, lon, radius_km);
    let config = CourseConfig::default();

    let index = match args.get(3) {
        Some(dir) => AuthoritativeIndex::load(&IndexConfig::new(dir).with_bbox(bbox)),
        None => AuthoritativeIndex::empty(),
    };

    let client = match OverpassClient::new(&OverpassConfig::default()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Cannot create client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let courses = match build_courses(&client, &bbox, &index, &config).await {
        Ok(courses) => courses,
        Err(e) => {
            eprintln!("Overpass is busy, try again in a minute ({})", e);
            return ExitCode::FAILURE;
        }
    };

    if courses.is_empty() {
        println!("No courses found. Try a larger radius.");
        return ExitCode::SUCCESS;
    }

    for (rank, course) in courses.iter().enumerate() {
        println!(
            "{:>2}. {} [{}] score {:.3}{}",
            rank + 1,
            course.course_id,
            course.difficulty,
            course.final_score,
            course
                .matched_track
                .as_deref()
                .map(|t| format!(" (matches {})", t))
                .unwrap_or_default()
        );
    }

    let top = &courses[..courses.len().min(TOP_COURSES)];
    println!("\nAfter the hike:");
    for (course_id, places) in client.places_near_courses(top, PLACES_RADIUS_M).await {
        println!("  {}", course_id);
        match places {
            Ok(places) if places.is_empty() => println!("    nothing nearby"),
            Ok(places) => {
                for place in places.iter().take(3) {
                    println!(
                        "    {} {} - {}m, quality {}/5",
                        place.category, place.name, place.distance_m, place.quality_score
                    );
                }
            }
            Err(e) => println!("    unavailable ({})", e),
        }
    }

    ExitCode::SUCCESS
}
