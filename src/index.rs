//! Authoritative track index.
//!
//! Builds an in-memory table of endpoint and bounding-box records from a directory
//! tree of GPX files, plus an R-tree over all track endpoints for the matcher.
//!
//! Each file is read once as an event stream: only the metadata `<bounds>`, the
//! first and last `<trkpt>`, and waypoint names are kept, so memory stays flat no
//! matter how large the track is.
//!
//! Files that cannot be read or summarised are skipped and counted, never fatal. A
//! missing root directory produces an empty index.

use log::{debug, info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::TrackFileError;
use crate::geo_utils::bbox_intersects;
use crate::{BoundingBox, GpsPoint};

/// Default cap on the number of files examined per load.
pub const DEFAULT_MAX_FILES: usize = 2000;

/// Meters per degree used to size search envelopes. Slightly below the true value,
/// so envelopes err on the large side.
const SEARCH_METERS_PER_DEGREE: f64 = 110_000.0;

/// Above this latitude the envelope approximation is not trusted.
const MAX_SEARCH_LATITUDE: f64 = 80.0;

// ============================================================================
// Records and configuration
// ============================================================================

/// Endpoint summary of one authoritative track file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoritativeTrack {
    /// "first waypoint → last waypoint", a single waypoint name, or the file stem
    pub name: String,
    pub path: PathBuf,
    pub start: GpsPoint,
    pub end: GpsPoint,
    /// Declared metadata bounds, or the extremes of the track points
    pub bounds: BoundingBox,
}

/// Where and how much to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory walked recursively for `.gpx` files
    pub root: PathBuf,

    /// Keep only tracks whose bounds intersect this box
    pub bbox: Option<BoundingBox>,

    /// Maximum number of files examined (parsed or not).
    /// Default: 2000
    pub max_files: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            bbox: None,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl IndexConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Cache key for an index built from this config and used with `threshold_m`.
    pub fn key(&self, threshold_m: f64) -> IndexKey {
        IndexKey {
            root: self.root.clone(),
            bbox: self
                .bbox
                .map(|b| [b.south.to_bits(), b.west.to_bits(), b.north.to_bits(), b.east.to_bits()]),
            max_files: self.max_files,
            threshold_bits: threshold_m.to_bits(),
        }
    }
}

/// Hashable identity of a loaded index: directory, bbox filter, file cap and match
/// threshold. Floats compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    root: PathBuf,
    bbox: Option<[u64; 4]>,
    max_files: usize,
    threshold_bits: u64,
}

// ============================================================================
// Index
// ============================================================================

/// One track endpoint in the R-tree, x = longitude, y = latitude.
#[derive(Debug, Clone, Copy)]
struct IndexedEndpoint {
    track: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedEndpoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

/// Immutable set of authoritative tracks. Rebuild rather than mutate.
#[derive(Debug, Clone)]
pub struct AuthoritativeIndex {
    tracks: Vec<AuthoritativeTrack>,
    endpoints: RTree<IndexedEndpoint>,
    scanned_files: usize,
    skipped_files: usize,
}

impl Default for AuthoritativeIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl AuthoritativeIndex {
    /// An index with no tracks. Every course gets zero trust.
    pub fn empty() -> Self {
        Self::from_tracks(Vec::new())
    }

    /// Index tracks that are already summarised, keeping their order.
    pub fn from_tracks(tracks: Vec<AuthoritativeTrack>) -> Self {
        let endpoints: Vec<IndexedEndpoint> = tracks
            .iter()
            .enumerate()
            .flat_map(|(i, t)| {
                [t.start, t.end].into_iter().map(move |p| IndexedEndpoint {
                    track: i,
                    lat: p.latitude,
                    lng: p.longitude,
                })
            })
            .collect();

        Self {
            tracks,
            endpoints: RTree::bulk_load(endpoints),
            scanned_files: 0,
            skipped_files: 0,
        }
    }

    /// Walk `config.root` and summarise up to `config.max_files` GPX files.
    ///
    /// Never fails: unreadable files are skipped and a missing directory yields an
    /// empty index, each with a log line.
    pub fn load(config: &IndexConfig) -> Self {
        let start = Instant::now();

        if !config.root.is_dir() {
            warn!(
                "[AuthIndex] {} is not a directory, using an empty index",
                config.root.display()
            );
            return Self::empty();
        }

        let files = find_gpx_files(&config.root, config.max_files);
        let mut tracks = Vec::new();
        let mut skipped = 0;

        for path in &files {
            match read_track_summary(path) {
                Ok(track) => {
                    let wanted = config
                        .bbox
                        .as_ref()
                        .map_or(true, |bbox| bbox_intersects(&track.bounds, bbox));
                    if wanted {
                        tracks.push(track);
                    }
                }
                Err(e) => {
                    debug!("[AuthIndex] Skipping {}: {}", path.display(), e);
                    skipped += 1;
                }
            }
        }

        info!(
            "[AuthIndex] {} tracks from {} files ({} skipped) under {} in {:?}",
            tracks.len(),
            files.len(),
            skipped,
            config.root.display(),
            start.elapsed()
        );

        let mut index = Self::from_tracks(tracks);
        index.scanned_files = files.len();
        index.skipped_files = skipped;
        index
    }

    pub fn tracks(&self) -> &[AuthoritativeTrack] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Files examined by [`AuthoritativeIndex::load`].
    pub fn scanned_files(&self) -> usize {
        self.scanned_files
    }

    /// Files examined but not summarisable.
    pub fn skipped_files(&self) -> usize {
        self.skipped_files
    }

    /// Indices (ascending) of tracks with an endpoint possibly within `radius_m` of
    /// `point`.
    ///
    /// The envelope is a superset of the circle, so no track within the radius is
    /// missed. Returns `None` when the envelope cannot be built safely (near the
    /// poles, across the antimeridian, or for a bad radius); callers then scan
    /// every track.
    pub fn candidates_near(&self, point: &GpsPoint, radius_m: f64) -> Option<Vec<usize>> {
        if !radius_m.is_finite() || radius_m < 0.0 || !point.is_valid() {
            return None;
        }

        let lat_pad = radius_m / SEARCH_METERS_PER_DEGREE;
        let far_lat = point.latitude.abs() + lat_pad;
        if far_lat >= MAX_SEARCH_LATITUDE {
            return None;
        }
        let lng_pad = radius_m / (SEARCH_METERS_PER_DEGREE * far_lat.to_radians().cos());

        let west = point.longitude - lng_pad;
        let east = point.longitude + lng_pad;
        if west < -180.0 || east > 180.0 {
            return None;
        }

        let envelope = AABB::from_corners(
            [west, point.latitude - lat_pad],
            [east, point.latitude + lat_pad],
        );

        let mut ids: Vec<usize> = self
            .endpoints
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.track)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Some(ids)
    }
}

// ============================================================================
// Directory walk
// ============================================================================

fn is_gpx(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"))
}

/// Up to `limit` GPX files under `root`, depth first, each directory's files
/// (sorted by name) before its subdirectories (sorted by name).
fn find_gpx_files(root: &Path, limit: usize) -> Vec<PathBuf> {
    let mut found = Vec::new();
    walk_dir(root, limit, &mut found);
    found
}

fn walk_dir(dir: &Path, limit: usize, found: &mut Vec<PathBuf>) {
    if found.len() >= limit {
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("[AuthIndex] Cannot list {}: {}", dir.display(), e);
            return;
        }
    };

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => subdirs.push(path),
            Ok(_) if is_gpx(&path) => files.push(path),
            _ => {}
        }
    }
    files.sort();
    subdirs.sort();

    for file in files {
        if found.len() >= limit {
            return;
        }
        found.push(file);
    }
    for subdir in subdirs {
        walk_dir(&subdir, limit, found);
    }
}

// ============================================================================
// GPX summary
// ============================================================================

/// What survives from one pass over a GPX document.
#[derive(Debug, Default)]
struct GpxScan {
    declared_bounds: Option<BoundingBox>,
    first: Option<GpsPoint>,
    last: Option<GpsPoint>,
    point_count: usize,
    south: f64,
    west: f64,
    north: f64,
    east: f64,
    waypoint_names: Vec<String>,
    in_waypoint: bool,
    in_waypoint_name: bool,
    pending_name: String,
}

impl GpxScan {
    fn add_point(&mut self, point: GpsPoint) {
        if self.first.is_none() {
            self.first = Some(point);
            self.south = point.latitude;
            self.north = point.latitude;
            self.west = point.longitude;
            self.east = point.longitude;
        } else {
            self.south = self.south.min(point.latitude);
            self.north = self.north.max(point.latitude);
            self.west = self.west.min(point.longitude);
            self.east = self.east.max(point.longitude);
        }
        self.last = Some(point);
        self.point_count += 1;
    }

    fn point_extremes(&self) -> Option<BoundingBox> {
        self.first
            .map(|_| BoundingBox::new(self.south, self.west, self.north, self.east))
    }

    fn start_element(&mut self, e: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        match e.local_name().as_ref() {
            b"bounds" => {
                let bounds = (
                    attr_f64(e, b"minlat")?,
                    attr_f64(e, b"minlon")?,
                    attr_f64(e, b"maxlat")?,
                    attr_f64(e, b"maxlon")?,
                );
                if let (Some(s), Some(w), Some(n), Some(east)) = bounds {
                    self.declared_bounds = Some(BoundingBox::new(s, w, n, east));
                }
            }
            b"trkpt" => {
                if let (Some(lat), Some(lon)) = (attr_f64(e, b"lat")?, attr_f64(e, b"lon")?) {
                    let point = GpsPoint::new(lat, lon);
                    if point.is_valid() {
                        self.add_point(point);
                    }
                }
            }
            b"wpt" => {
                self.in_waypoint = true;
                self.pending_name.clear();
            }
            b"name" if self.in_waypoint => self.in_waypoint_name = true,
            _ => {}
        }
        Ok(())
    }

    fn end_element(&mut self, local_name: &[u8]) {
        match local_name {
            b"name" => self.in_waypoint_name = false,
            b"wpt" => {
                let name = self.pending_name.trim();
                if !name.is_empty() {
                    self.waypoint_names.push(name.to_string());
                }
                self.pending_name.clear();
                self.in_waypoint = false;
            }
            _ => {}
        }
    }
}

/// First attribute named `key` (ignoring any prefix) parsed as a float.
fn attr_f64(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<f64>, quick_xml::Error> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        if attr.key.local_name().as_ref() == key {
            return Ok(attr.unescape_value()?.trim().parse::<f64>().ok());
        }
    }
    Ok(None)
}

/// Bounds that can take part in an intersection test. Zero-width is allowed: a
/// track running due north is still a track.
fn usable_bounds(b: &BoundingBox) -> bool {
    [b.south, b.west, b.north, b.east].iter().all(|v| v.is_finite())
        && b.south <= b.north
        && b.west <= b.east
}

fn track_name(waypoints: &[String], path: &Path) -> String {
    match waypoints {
        [] => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        [only] => only.clone(),
        [first, .., last] => format!("{} → {}", first, last),
    }
}

/// Summarise a GPX document read from `reader`. `path` only feeds the record and
/// the fallback name.
pub fn summarize_gpx<R: BufRead>(reader: R, path: &Path) -> Result<AuthoritativeTrack, TrackFileError> {
    let mut reader = Reader::from_reader(reader);
    reader.trim_text(true);

    let mut scan = GpxScan::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => scan.start_element(&e)?,
            Event::Empty(e) => {
                scan.start_element(&e)?;
                let name = e.local_name();
                scan.end_element(name.as_ref());
            }
            Event::End(e) => scan.end_element(e.local_name().as_ref()),
            Event::Text(t) if scan.in_waypoint_name => match t.unescape() {
                Ok(text) => scan.pending_name.push_str(&text),
                // Unknown entity such as &nbsp;: keep the raw text
                Err(_) => scan.pending_name.push_str(&String::from_utf8_lossy(&t)),
            },
            Event::CData(t) if scan.in_waypoint_name => {
                scan.pending_name.push_str(&String::from_utf8_lossy(&t.into_inner()))
            }
            _ => {}
        }
        buf.clear();
    }

    let (Some(start), Some(end)) = (scan.first, scan.last) else {
        return Err(TrackFileError::TooFewPoints(0));
    };
    if scan.point_count < 2 {
        return Err(TrackFileError::TooFewPoints(scan.point_count));
    }

    let bounds = scan
        .declared_bounds
        .filter(usable_bounds)
        .or_else(|| scan.point_extremes().filter(usable_bounds))
        .ok_or(TrackFileError::NoBounds)?;

    Ok(AuthoritativeTrack {
        name: track_name(&scan.waypoint_names, path),
        path: path.to_path_buf(),
        start,
        end,
        bounds,
    })
}

/// Open and summarise one GPX file.
pub fn read_track_summary(path: &Path) -> Result<AuthoritativeTrack, TrackFileError> {
    let file = File::open(path)?;
    summarize_gpx(BufReader::new(file), path)
}
