//! Layer-averaged drift integration over a constant-rate descent.
//!
//! The profile window between the release and target altitudes is walked from
//! the top down. Each pair of consecutive samples bounds a layer whose wind is
//! the mean of its two samples; the payload spends `thickness / descent_rate`
//! seconds in the layer and is carried `mean_speed * time` meters along the
//! mean bearing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::profile::{WindProfile, WindSample};
use crate::{DropError, ValidationError, DEFAULT_DESCENT_RATE_MPS};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DescentParameters {
    pub release_altitude_m: f64,
    pub target_altitude_m: f64,
    pub descent_rate_mps: f64,
}

impl DescentParameters {
    pub fn new(release_altitude_m: f64, target_altitude_m: f64) -> Self {
        Self {
            release_altitude_m,
            target_altitude_m,
            descent_rate_mps: DEFAULT_DESCENT_RATE_MPS,
        }
    }

    pub fn with_descent_rate(mut self, descent_rate_mps: f64) -> Self {
        self.descent_rate_mps = descent_rate_mps;
        self
    }

    /// A release below the target is accepted here; it simply yields an empty
    /// window and a warning on the result.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.release_altitude_m.is_finite() {
            return Err(ValidationError::NonFiniteAltitude {
                name: "release",
                value: self.release_altitude_m,
            });
        }
        if !self.target_altitude_m.is_finite() {
            return Err(ValidationError::NonFiniteAltitude {
                name: "target",
                value: self.target_altitude_m,
            });
        }
        if !self.descent_rate_mps.is_finite() || self.descent_rate_mps <= 0.0 {
            return Err(ValidationError::InvalidDescentRate(self.descent_rate_mps));
        }
        Ok(())
    }
}

/// How the bearing of a layer is derived from its two bounding samples.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BearingMean {
    /// Arithmetic mean of the two bearings. Does not account for the 0/360
    /// wrap: 350 and 10 average to 180.
    Naive,
    /// Direction of the summed unit vectors: 350 and 10 average to 0.
    Circular,
}

impl Default for BearingMean {
    fn default() -> Self {
        BearingMean::Naive
    }
}

impl BearingMean {
    pub fn mean(self, a_deg: f64, b_deg: f64) -> f64 {
        let naive = (a_deg + b_deg) / 2.0;
        match self {
            BearingMean::Naive => naive,
            BearingMean::Circular => {
                let (sa, ca) = a_deg.to_radians().sin_cos();
                let (sb, cb) = b_deg.to_radians().sin_cos();
                let (s, c) = (sa + sb, ca + cb);
                // opposite bearings cancel; there is no meaningful mean
                if s.hypot(c) < 1e-12 {
                    naive
                } else {
                    normalize_bearing(s.atan2(c).to_degrees())
                }
            }
        }
    }
}

/// Wrap into [0, 360). `rem_euclid` can round tiny negatives up to exactly 360.
fn normalize_bearing(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Cumulative state after descending through one layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryPoint {
    pub layer: usize,
    pub altitude_m: f64,
    pub elapsed_s: f64,
    pub easting_m: f64,
    pub northing_m: f64,
}

/// Lazily integrates a window that is already sorted by descending altitude.
#[derive(Clone, Debug)]
pub struct Trajectory<'a> {
    window: &'a [WindSample],
    descent_rate_mps: f64,
    bearing_mean: BearingMean,
    next_layer: usize,
    elapsed_s: f64,
    easting_m: f64,
    northing_m: f64,
}

impl<'a> Trajectory<'a> {
    pub fn new(window: &'a [WindSample], descent_rate_mps: f64, bearing_mean: BearingMean) -> Self {
        Self {
            window,
            descent_rate_mps,
            bearing_mean,
            next_layer: 1,
            elapsed_s: 0.0,
            easting_m: 0.0,
            northing_m: 0.0,
        }
    }
}

impl Iterator for Trajectory<'_> {
    type Item = TrajectoryPoint;

    fn next(&mut self) -> Option<TrajectoryPoint> {
        let upper = self.window.get(self.next_layer - 1)?;
        let lower = self.window.get(self.next_layer)?;

        let delta_h = upper.altitude_m - lower.altitude_m;
        if delta_h > 0.0 {
            let t = delta_h / self.descent_rate_mps;
            let dir_avg = self
                .bearing_mean
                .mean(upper.direction_deg, lower.direction_deg)
                .to_radians();
            let spd_avg = (upper.speed_mps + lower.speed_mps) / 2.0;
            let drift = spd_avg * t;
            self.easting_m += drift * dir_avg.sin();
            self.northing_m += drift * dir_avg.cos();
            self.elapsed_s += t;
        }

        let point = TrajectoryPoint {
            layer: self.next_layer,
            altitude_m: lower.altitude_m,
            elapsed_s: self.elapsed_s,
            easting_m: self.easting_m,
            northing_m: self.northing_m,
        };
        self.next_layer += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.window.len().saturating_sub(self.next_layer);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Trajectory<'_> {}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    TargetAboveRelease,
    InsufficientSamples { in_window: usize },
    /// Every sample in the window sits at the same altitude.
    ZeroThickness,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::TargetAboveRelease => {
                write!(f, "target altitude is above the release altitude")
            }
            DataQualityWarning::InsufficientSamples { in_window } => write!(
                f,
                "only {in_window} wind sample(s) between target and release altitude; at least 2 are needed"
            ),
            DataQualityWarning::ZeroThickness => write!(
                f,
                "all wind samples in the window share one altitude; no descent was integrated"
            ),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DriftResult {
    pub easting_m: f64,
    pub northing_m: f64,
    pub distance_m: f64,
    /// Compass bearing of travel from release point to landing point.
    pub heading_deg: f64,
    pub descent_time_s: f64,
    pub layers: usize,
    pub samples_in_window: usize,
    pub warnings: Vec<DataQualityWarning>,
}

impl DriftResult {
    fn from_displacement(
        easting_m: f64,
        northing_m: f64,
        descent_time_s: f64,
        layers: usize,
        samples_in_window: usize,
        warnings: Vec<DataQualityWarning>,
    ) -> Self {
        let distance_m = easting_m.hypot(northing_m);
        let heading_deg = if distance_m > 0.0 {
            let deg = (easting_m.atan2(northing_m).to_degrees() + 360.0) % 360.0;
            if deg >= 360.0 {
                0.0
            } else {
                deg
            }
        } else {
            0.0
        };
        Self {
            easting_m,
            northing_m,
            distance_m,
            heading_deg,
            descent_time_s,
            layers,
            samples_in_window,
            warnings,
        }
    }

    /// Fewer than two samples fell inside the descent window, or the window
    /// has no vertical extent, so the result is the zero vector and carries
    /// no information about the wind.
    pub fn is_degenerate(&self) -> bool {
        self.samples_in_window < 2 || self.warnings.contains(&DataQualityWarning::ZeroThickness)
    }
}

/// Simulate a descent with the naive bearing mean.
pub fn simulate(
    profile: &WindProfile,
    release_altitude_m: f64,
    target_altitude_m: f64,
    descent_rate_mps: f64,
) -> Result<DriftResult, DropError> {
    let params = DescentParameters::new(release_altitude_m, target_altitude_m)
        .with_descent_rate(descent_rate_mps);
    simulate_with(profile, &params, BearingMean::Naive)
}

pub fn simulate_with(
    profile: &WindProfile,
    params: &DescentParameters,
    bearing_mean: BearingMean,
) -> Result<DriftResult, DropError> {
    params.validate()?;
    profile.validate()?;

    let window = profile.window(params.release_altitude_m, params.target_altitude_m);

    let mut warnings = Vec::new();
    if params.release_altitude_m < params.target_altitude_m {
        warnings.push(DataQualityWarning::TargetAboveRelease);
    }
    match (window.first(), window.last()) {
        (Some(top), Some(bottom)) if window.len() >= 2 => {
            if top.altitude_m <= bottom.altitude_m {
                warnings.push(DataQualityWarning::ZeroThickness);
            }
        }
        _ => warnings.push(DataQualityWarning::InsufficientSamples {
            in_window: window.len(),
        }),
    }

    let trajectory = Trajectory::new(&window, params.descent_rate_mps, bearing_mean);
    let layers = trajectory.len();
    let (easting, northing, elapsed) = trajectory
        .last()
        .map(|p| (p.easting_m, p.northing_m, p.elapsed_s))
        .unwrap_or((0.0, 0.0, 0.0));

    Ok(DriftResult::from_displacement(
        easting,
        northing,
        elapsed,
        layers,
        window.len(),
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn profile(rows: &[(f64, f64, f64)]) -> WindProfile {
        rows.iter()
            .map(|&(alt, dir, spd)| WindSample::new(alt, dir, spd))
            .collect()
    }

    #[test]
    fn test_two_layer_reference_value() {
        let p = profile(&[(2000.0, 90.0, 10.0), (1000.0, 90.0, 10.0)]);
        let result = simulate(&p, 2000.0, 1000.0, 10.0).unwrap();
        assert!((result.easting_m - 1000.0).abs() < TOL);
        assert!(result.northing_m.abs() < TOL);
        assert!((result.distance_m - 1000.0).abs() < TOL);
        assert!((result.heading_deg - 90.0).abs() < TOL);
        assert!((result.descent_time_s - 100.0).abs() < TOL);
        assert_eq!(result.layers, 1);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_constant_north_wind() {
        let p = profile(&[(3000.0, 0.0, 5.0), (2000.0, 0.0, 5.0), (1000.0, 0.0, 5.0)]);
        let result = simulate(&p, 3000.0, 1000.0, 10.7).unwrap();
        assert!(result.northing_m > 0.0);
        assert!(result.easting_m.abs() < TOL);
        assert!(result.heading_deg.abs() < TOL);
        assert!((result.distance_m - 5.0 * 2000.0 / 10.7).abs() < 1e-6);
    }

    #[test]
    fn test_unsorted_input_matches_sorted() {
        let sorted = profile(&[(3000.0, 40.0, 5.0), (2000.0, 80.0, 7.0), (1000.0, 120.0, 3.0)]);
        let shuffled = profile(&[(1000.0, 120.0, 3.0), (3000.0, 40.0, 5.0), (2000.0, 80.0, 7.0)]);
        let a = simulate(&sorted, 3000.0, 1000.0, 10.7).unwrap();
        let b = simulate(&shuffled, 3000.0, 1000.0, 10.7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_samples_outside_window_are_ignored() {
        let p = profile(&[
            (5000.0, 0.0, 50.0),
            (2000.0, 90.0, 10.0),
            (1000.0, 90.0, 10.0),
            (10.0, 180.0, 50.0),
        ]);
        let result = simulate(&p, 2000.0, 1000.0, 10.0).unwrap();
        assert!((result.easting_m - 1000.0).abs() < TOL);
        assert_eq!(result.samples_in_window, 2);
    }

    #[test]
    fn test_naive_mean_reproduces_wraparound() {
        assert_eq!(BearingMean::Naive.mean(350.0, 10.0), 180.0);
        let p = profile(&[(2000.0, 350.0, 10.0), (1000.0, 10.0, 10.0)]);
        let result = simulate(&p, 2000.0, 1000.0, 10.0).unwrap();
        // carried due south by the unwrapped mean
        assert!((result.heading_deg - 180.0).abs() < 1e-6);
        assert!(result.northing_m < 0.0);
    }

    #[test]
    fn test_circular_mean_handles_wraparound() {
        let wrapped = BearingMean::Circular.mean(350.0, 10.0);
        assert!(wrapped < TOL || wrapped > 360.0 - TOL);
        assert!(wrapped < 360.0);
        assert!((BearingMean::Circular.mean(80.0, 100.0) - 90.0).abs() < TOL);
        assert_eq!(BearingMean::Circular.mean(0.0, 180.0), 90.0);
        let p = profile(&[(2000.0, 350.0, 10.0), (1000.0, 10.0, 10.0)]);
        let params = DescentParameters::new(2000.0, 1000.0).with_descent_rate(10.0);
        let result = simulate_with(&p, &params, BearingMean::Circular).unwrap();
        assert!(result.northing_m > 999.0);
        assert!(result.heading_deg < 1e-6 || result.heading_deg > 360.0 - 1e-6);
    }

    #[test]
    fn test_single_sample_is_degenerate() {
        let p = profile(&[(1500.0, 90.0, 10.0), (500.0, 90.0, 10.0)]);
        let result = simulate(&p, 2000.0, 1000.0, 10.7).unwrap();
        assert!(result.is_degenerate());
        assert_eq!(result.distance_m, 0.0);
        assert_eq!(result.heading_deg, 0.0);
        assert_eq!(
            result.warnings,
            vec![DataQualityWarning::InsufficientSamples { in_window: 1 }]
        );
    }

    #[test]
    fn test_empty_profile_is_degenerate() {
        let result = simulate(&WindProfile::default(), 2000.0, 1000.0, 10.7).unwrap();
        assert!(result.is_degenerate());
        assert_eq!((result.easting_m, result.northing_m), (0.0, 0.0));
        assert_eq!(result.layers, 0);
    }

    #[test]
    fn test_release_below_target_warns() {
        let p = profile(&[(2000.0, 90.0, 10.0), (1000.0, 90.0, 10.0)]);
        let result = simulate(&p, 1000.0, 2000.0, 10.7).unwrap();
        assert!(result.is_degenerate());
        assert_eq!(
            result.warnings,
            vec![
                DataQualityWarning::TargetAboveRelease,
                DataQualityWarning::InsufficientSamples { in_window: 0 }
            ]
        );
    }

    #[test]
    fn test_equal_release_and_target() {
        let p = profile(&[(1000.0, 90.0, 10.0), (1000.0, 90.0, 10.0)]);
        let result = simulate(&p, 1000.0, 1000.0, 10.7).unwrap();
        // both samples sit on the bounds; the layer has zero thickness
        assert_eq!(result.samples_in_window, 2);
        assert_eq!(result.layers, 1);
        assert_eq!(result.distance_m, 0.0);
        assert_eq!(result.heading_deg, 0.0);
        assert_eq!(result.warnings, vec![DataQualityWarning::ZeroThickness]);
        assert!(result.is_degenerate());
    }

    #[test]
    fn test_duplicate_rows_with_thickness_are_not_degenerate() {
        let p = profile(&[(1000.0, 90.0, 10.0), (1000.0, 90.0, 10.0), (900.0, 90.0, 10.0)]);
        let result = simulate(&p, 1000.0, 900.0, 10.0).unwrap();
        assert!(result.warnings.is_empty());
        assert!(!result.is_degenerate());
        assert!((result.easting_m - 100.0).abs() < TOL);
    }

    #[test]
    fn test_huge_components_keep_finite_distance() {
        let p = profile(&[(1001.0, 90.0, 1e200), (1000.0, 90.0, 1e200)]);
        let result = simulate(&p, 1001.0, 1000.0, 1.0).unwrap();
        assert!(result.easting_m.is_finite());
        assert!(result.distance_m.is_finite());
        assert!((result.distance_m / result.easting_m - 1.0).abs() < 1e-12);
        assert!((result.heading_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_speed_rejected() {
        let p = profile(&[(2000.0, 90.0, 10.0), (1500.0, 90.0, -5.0), (1000.0, 90.0, 10.0)]);
        let err = simulate(&p, 2000.0, 1000.0, 10.7).unwrap_err();
        assert!(err.is_validation());
        assert!(matches!(
            err,
            DropError::Validation(ValidationError::NegativeSpeed { index: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let p = profile(&[(2000.0, 90.0, 10.0), (1000.0, 90.0, 10.0)]);
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = simulate(&p, 2000.0, 1000.0, rate).unwrap_err();
            assert!(err.is_validation());
        }
        let err = simulate(&p, f64::NAN, 1000.0, 10.7).unwrap_err();
        assert!(matches!(
            err,
            DropError::Validation(ValidationError::NonFiniteAltitude { name: "release", .. })
        ));
    }

    #[test]
    fn test_trajectory_is_lazy_and_cumulative() {
        let window = [
            WindSample::new(3000.0, 90.0, 10.0),
            WindSample::new(2000.0, 90.0, 10.0),
            WindSample::new(1000.0, 0.0, 10.0),
        ];
        let mut trajectory = Trajectory::new(&window, 10.0, BearingMean::Naive);
        assert_eq!(trajectory.len(), 2);
        let first = trajectory.next().unwrap();
        assert_eq!(first.layer, 1);
        assert_eq!(first.altitude_m, 2000.0);
        assert!((first.easting_m - 1000.0).abs() < TOL);
        assert!((first.elapsed_s - 100.0).abs() < TOL);
        let second = trajectory.next().unwrap();
        assert_eq!(second.layer, 2);
        assert!((second.elapsed_s - 200.0).abs() < TOL);
        // 45 degree mean bearing on the second layer
        let leg = 1000.0 * std::f64::consts::FRAC_1_SQRT_2;
        assert!((second.easting_m - (1000.0 + leg)).abs() < 1e-6);
        assert!((second.northing_m - leg).abs() < 1e-6);
        assert!(trajectory.next().is_none());
    }

    #[test]
    fn test_trajectory_on_short_windows() {
        assert_eq!(Trajectory::new(&[], 10.0, BearingMean::Naive).count(), 0);
        let one = [WindSample::new(1.0, 0.0, 1.0)];
        assert_eq!(Trajectory::new(&one, 10.0, BearingMean::Naive).count(), 0);
    }

    #[test]
    fn test_doubling_descent_rate_reduces_distance() {
        let p = profile(&[(3000.0, 200.0, 12.0), (2200.0, 230.0, 9.0), (900.0, 250.0, 4.0)]);
        let slow = simulate(&p, 3000.0, 900.0, 5.0).unwrap();
        let fast = simulate(&p, 3000.0, 900.0, 10.0).unwrap();
        assert!(fast.distance_m < slow.distance_m);
        assert!((slow.distance_m / fast.distance_m - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_warning_display() {
        let text = DataQualityWarning::InsufficientSamples { in_window: 1 }.to_string();
        assert!(text.contains("only 1 wind sample"));
    }
}
