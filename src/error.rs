//! Error types.
//!
//! Only two things can fail in a way the caller sees: fetching relations from the
//! spatial query service, and (internally) summarising a single track file. Everything
//! else (degenerate relations, unparseable files, a missing index directory) is a
//! filter, not an error.

use thiserror::Error;

/// The spatial query service could not produce a response.
///
/// Distinct from an empty result: `Ok(vec![])` means the area has no courses,
/// `Err(FetchError)` means "try again later".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no spatial query endpoints configured")]
    NoEndpoints,

    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("failed to create async runtime: {0}")]
    Runtime(String),

    #[error("spatial query failed after {attempts} attempts across {endpoints} endpoints: {last_error}")]
    Exhausted {
        attempts: u32,
        endpoints: usize,
        last_error: String,
    },
}

/// Why a single authoritative track file was skipped.
#[derive(Debug, Error)]
pub enum TrackFileError {
    #[error("cannot read track file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed track XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("track has {0} points, need at least 2")]
    TooFewPoints(usize),

    #[error("track has no usable bounds")]
    NoBounds,
}
