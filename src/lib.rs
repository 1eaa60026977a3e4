//! # Trail Redux
//!
//! Scheduled size reduction of GPS trail recordings stored in a PocketBase
//! backend.
//!
//! Each run selects the trails created or updated since the previous run,
//! simplifies their GPX tracks with Douglas-Peucker under a per-category
//! tolerance in meters, and replaces the stored file only when the result is
//! small enough to be worth it.
//!
//! This library provides:
//! - Track simplification that keeps elevation and non-track content
//! - The accept/reject policy for reduced files
//! - An incremental checkpoint so repeated runs stay cheap
//! - A PocketBase client for listing, downloading and replacing trail files
//!
//! ## Features
//!
//! - **`http`** (default) - PocketBase HTTP client and the `trail-redux` binary
//!
//! ## Quick Start
//!
//! ```rust
//! use trail_redux::{policy, simplify, ReductionDecision};
//!
//! let gpx = br#"<?xml version="1.0"?>
//! <gpx version="1.1" creator="docs" xmlns="http://www.topografix.com/GPX/1/1">
//!   <trk><trkseg>
//!     <trkpt lat="47.0000" lon="11.0000"><ele>500.0</ele></trkpt>
//!     <trkpt lat="47.0000" lon="11.0001"><ele>501.0</ele></trkpt>
//!     <trkpt lat="47.0000" lon="11.0002"><ele>502.0</ele></trkpt>
//!   </trkseg></trk>
//! </gpx>"#;
//!
//! let reduced = simplify::simplify_gpx_bytes(gpx, 20.0).unwrap();
//! let parsed = simplify::parse_gpx(&reduced).unwrap();
//! assert_eq!(parsed.tracks[0].segments[0].points.len(), 2);
//!
//! match policy::should_replace(gpx.len() as u64, reduced.len() as u64, 0, 70) {
//!     ReductionDecision::Accept { retained_percent } => println!("keep {}%", retained_percent),
//!     other => println!("skip: {:?}", other),
//! }
//! ```

// Unified error handling
pub mod error;
pub use error::{OptionExt, ReduxError, Result};

// Geographic utilities (meter/degree conversion, distances)
pub mod geo_utils;

// Douglas-Peucker simplification of GPX tracks
pub mod simplify;
pub use simplify::{simplify_gpx_bytes, GpxSimplifier, TrackSimplifier};

// Category -> minimum distance lookup
pub mod tolerance;
pub use tolerance::ToleranceTable;

// Accept/reject policy for reduced files
pub mod policy;
pub use policy::{should_replace, ReductionDecision, ReductionPolicy};

// Checkpoint and run history
pub mod state;
pub use state::{PipelineState, RunRecord, StateStore};

// Backend records (trails, categories, actors)
pub mod model;
pub use model::{Category, NotificationAuthor, Trail};

// Backend collaborator interface
pub mod backend;
pub use backend::TrailBackend;

// Dated backup copies of replaced files
pub mod backup;
pub use backup::BackupWriter;

// Configuration file
pub mod config;
pub use config::{AppConfig, CommentsConfig, PocketBaseConfig};

// Run orchestration
pub mod pipeline;
pub use pipeline::{run_once, select_candidates, Pipeline, PipelineSettings, RunStats, TrailOutcome};

// HTTP module for the PocketBase backend
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::PocketBaseClient;

// ============================================================================
// Core Types
// ============================================================================

/// A track point with latitude, longitude and optional elevation.
///
/// # Example
/// ```
/// use trail_redux::TrackPoint;
/// let point = TrackPoint::new(47.2692, 11.4041).with_elevation(574.0); // Innsbruck
/// assert_eq!(point.elevation, Some(574.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters, carried through simplification untouched
    pub elevation: Option<f64>,
}

impl TrackPoint {
    /// Create a new track point without elevation.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
        }
    }

    /// Attach an elevation in meters.
    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }
}
