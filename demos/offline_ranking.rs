//! Rank a handful of hand-written relations against a GPX folder, no network.
//!
//! Run with: cargo run --example offline_ranking

use std::fs;

use trek_courses::geo_utils::bbox_from_center;
use trek_courses::{
    rank_relations, AuthoritativeIndex, CourseConfig, GpsPoint, IndexConfig, RawMember, RawRelation,
};

const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="demo" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><bounds minlat="37.5790" minlon="126.9570" maxlat="37.6010" maxlon="126.9660"/></metadata>
  <wpt lat="37.5801" lon="126.9581"><name>Sajik Park</name></wpt>
  <wpt lat="37.6001" lon="126.9651"><name>Changuimun</name></wpt>
  <trk><trkseg>
    <trkpt lat="37.5801" lon="126.9581"/>
    <trkpt lat="37.5900" lon="126.9600"/>
    <trkpt lat="37.6001" lon="126.9651"/>
  </trkseg></trk>
</gpx>
"#;

fn way(id: u64, points: &[(f64, f64)]) -> RawMember {
    RawMember::way(id, points.iter().map(|&(lat, lon)| GpsPoint::new(lat, lon)).collect())
}

fn main() {
    // Authoritative tracks live in a scratch folder
    let dir = std::env::temp_dir().join("trek_courses_offline_demo");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("inwangsan.gpx"), GPX).unwrap();

    let bbox = bbox_from_center(37.5900, 126.9620, 3.0);
    let index = AuthoritativeIndex::load(&IndexConfig::new(&dir).with_bbox(bbox));
    println!(
        "Index: {} tracks from {} files ({} skipped)\n",
        index.len(),
        index.scanned_files(),
        index.skipped_files()
    );

    let relations = vec![
        RawRelation::new(1, "Inwangsan Trail")
            .with_tag("sac_scale", "hiking")
            .with_member(way(10, &[(37.5800, 126.9580), (37.5900, 126.9600)]))
            .with_member(way(11, &[(37.5900, 126.9600), (37.6000, 126.9650)])),
        RawRelation::new(2, "Inwangsan Trail")
            .with_member(way(20, &[(37.5700, 126.9500), (37.5800, 126.9550)]))
            .with_member(way(21, &[(37.5800, 126.9550), (37.5950, 126.9550)]))
            .with_member(way(22, &[(37.5950, 126.9550), (37.6050, 126.9600)])),
        RawRelation::new(3, "Bugaksan Fortress Wall")
            .with_tag("sac_scale", "mountain_hiking")
            .with_member(way(30, &[(37.5920, 126.9700), (37.5960, 126.9750), (37.5930, 126.9850)])),
        // Too short to be a course
        RawRelation::new(4, "Stairs").with_member(way(40, &[(37.5900, 126.9600), (37.5905, 126.9600)])),
    ];

    let courses = rank_relations(&relations, &index, &CourseConfig::default());

    println!("{:<32} {:>7} {:>9} {:>7} {:>7}  {}", "Course", "km", "level", "trust", "score", "matched");
    for course in &courses {
        println!(
            "{:<32} {:>7.2} {:>9} {:>7.2} {:>7.3}  {}",
            course.course_id,
            course.length_km,
            course.difficulty,
            course.trust_score,
            course.final_score,
            course.matched_track.as_deref().unwrap_or("-")
        );
    }

    println!("\nStable ids:");
    for course in &courses {
        println!("  {} -> {}", course.name, course.stable_id());
    }

    let _ = fs::remove_dir_all(&dir);
}
