//! Descent drift estimation for payloads released from a high-altitude balloon.
//!
//! The crate turns a tabular wind profile (altitude, direction, speed) into an
//! estimate of how far, and in which direction, a payload drifts while falling
//! under a parachute from a release altitude down to a target altitude.

mod descent;
mod plot;
mod profile;
mod report;

#[cfg(not(feature = "wasm"))]
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use descent::{
    simulate, simulate_with, BearingMean, DataQualityWarning, DescentParameters, DriftResult,
    Trajectory, TrajectoryPoint,
};
pub use plot::{DriftScene, Rgb, Shape};
pub use profile::{
    inspect_profile, normalize_header, parse_profile, parse_profile_csv, resolve_columns,
    ColumnMap, ColumnRole, ColumnStats, ProfileInspection, SpeedUnit, WindProfile, WindSample,
};
pub use report::{
    compute_drop, drop_trajectory, write_trajectory_csv, DropReport, TRAJECTORY_CSV_HEADER,
};

/// Terminal velocity of the reference parachute.
pub const DEFAULT_DESCENT_RATE_MPS: f64 = 10.7;
pub const METERS_PER_FOOT: f64 = 0.3048;

pub fn feet_to_meters(feet: f64) -> f64 {
    feet * METERS_PER_FOOT
}

pub fn meters_to_feet(meters: f64) -> f64 {
    meters / METERS_PER_FOOT
}

/// Input that is syntactically readable but outside the simulator's domain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("sample {index}: {field} is not finite ({value})")]
    NonFinite {
        index: usize,
        field: &'static str,
        value: f64,
    },
    #[error("sample {index}: wind speed must not be negative (got {speed})")]
    NegativeSpeed { index: usize, speed: f64 },
    #[error("line {line}: column '{column}' is not numeric ({raw:?})")]
    NotNumeric {
        line: u64,
        column: String,
        raw: String,
    },
    #[error("descent rate must be a positive finite number (got {0})")]
    InvalidDescentRate(f64),
    #[error("{name} altitude is not finite ({value})")]
    NonFiniteAltitude { name: &'static str, value: f64 },
}

#[derive(Error, Debug)]
pub enum DropError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse wind profile: {0}")]
    ProfileParse(String),
    #[error("missing required columns after normalization: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl DropError {
    /// True for rejections caused by the request content rather than by
    /// unreadable input.
    pub fn is_validation(&self) -> bool {
        matches!(self, DropError::Validation(_))
    }
}

/// Request-level configuration. Heights are in feet MSL, as collected by the
/// upload form; they are converted to meters before simulation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DropParams {
    pub release_height_ft: f64,
    pub target_height_ft: f64,
    pub descent_rate_mps: f64,
    pub speed_unit: SpeedUnit,
    pub bearing_mean: BearingMean,
}

impl Default for DropParams {
    fn default() -> Self {
        Self {
            release_height_ft: 2000.0,
            target_height_ft: 100.0,
            descent_rate_mps: DEFAULT_DESCENT_RATE_MPS,
            speed_unit: SpeedUnit::MetersPerSecond,
            bearing_mean: BearingMean::Naive,
        }
    }
}

impl DropParams {
    /// Parse a JSON object of overrides; absent keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, DropError> {
        serde_json::from_str(text).map_err(|e| DropError::InvalidParameter(e.to_string()))
    }

    #[cfg(not(feature = "wasm"))]
    pub fn load(path: &Path) -> Result<Self, DropError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DropError::InvalidParameter(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn descent_parameters(&self) -> DescentParameters {
        DescentParameters {
            release_altitude_m: feet_to_meters(self.release_height_ft),
            target_altitude_m: feet_to_meters(self.target_height_ft),
            descent_rate_mps: self.descent_rate_mps,
        }
    }
}
