use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::io;

use crate::descent::{simulate_with, DriftResult, Trajectory, TrajectoryPoint};
use crate::profile::WindProfile;
use crate::{DropError, DropParams};

/// One answered drop request: the inputs as the user gave them plus the
/// simulated drift.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DropReport {
    pub params: DropParams,
    pub release_altitude_m: f64,
    pub target_altitude_m: f64,
    pub result: DriftResult,
    /// SHA-256 over the parameters and samples; equal hashes mean equal inputs.
    pub input_hash: String,
}

/// Convert the request heights, validate, simulate.
pub fn compute_drop(profile: &WindProfile, params: &DropParams) -> Result<DropReport, DropError> {
    let descent = params.descent_parameters();
    let result = simulate_with(profile, &descent, params.bearing_mean)?;
    let input_hash = input_hash_sha256(profile, params)?;
    Ok(DropReport {
        params: params.clone(),
        release_altitude_m: descent.release_altitude_m,
        target_altitude_m: descent.target_altitude_m,
        result,
        input_hash,
    })
}

impl DropReport {
    pub fn is_low_confidence(&self) -> bool {
        !self.result.warnings.is_empty()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Release height: {} ft MSL", self.params.release_height_ft),
            format!("Target height: {} ft MSL", self.params.target_height_ft),
            format!("Descent rate: {} m/s", self.params.descent_rate_mps),
            format!(
                "Drift heading: {:.1}° (direction of travel)",
                self.result.heading_deg
            ),
            format!(
                "Total drift distance: {:.1} meters",
                self.result.distance_m
            ),
        ];
        for warning in &self.result.warnings {
            lines.push(format!("Low confidence: {warning}"));
        }
        lines
    }

    pub fn to_json_pretty(&self) -> Result<String, DropError> {
        serde_json::to_string_pretty(self).map_err(|e| DropError::InvalidParameter(e.to_string()))
    }
}

/// Cumulative trajectory for a request, starting with the release point at
/// the top of the window. Empty when the window holds no samples. Inputs are
/// validated exactly as in [`compute_drop`].
pub fn drop_trajectory(
    profile: &WindProfile,
    params: &DropParams,
) -> Result<Vec<TrajectoryPoint>, DropError> {
    let descent = params.descent_parameters();
    descent.validate()?;
    profile.validate()?;
    let window = profile.window(descent.release_altitude_m, descent.target_altitude_m);
    let mut points = Vec::with_capacity(window.len());
    if let Some(top) = window.first() {
        points.push(TrajectoryPoint {
            layer: 0,
            altitude_m: top.altitude_m,
            elapsed_s: 0.0,
            easting_m: 0.0,
            northing_m: 0.0,
        });
    }
    points.extend(Trajectory::new(
        &window,
        descent.descent_rate_mps,
        params.bearing_mean,
    ));
    Ok(points)
}

pub const TRAJECTORY_CSV_HEADER: [&str; 6] = [
    "layer",
    "altitude_m",
    "elapsed_s",
    "easting_m",
    "northing_m",
    "distance_m",
];

pub fn write_trajectory_csv<W: io::Write>(
    points: &[TrajectoryPoint],
    writer: W,
) -> Result<(), DropError> {
    let csv_err = |e: csv::Error| DropError::InvalidParameter(format!("csv write: {e}"));
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(TRAJECTORY_CSV_HEADER).map_err(csv_err)?;
    for point in points {
        writer
            .write_record([
                point.layer.to_string(),
                format!("{:.3}", point.altitude_m),
                format!("{:.3}", point.elapsed_s),
                format!("{:.3}", point.easting_m),
                format!("{:.3}", point.northing_m),
                format!("{:.3}", point.easting_m.hypot(point.northing_m)),
            ])
            .map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| DropError::InvalidParameter(format!("csv write: {e}")))
}

fn input_hash_sha256(profile: &WindProfile, params: &DropParams) -> Result<String, DropError> {
    let bytes = serde_json::to_vec(&(params, profile.samples()))
        .map_err(|e| DropError::InvalidParameter(e.to_string()))?;
    let digest = Sha256::digest(&bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{parse_profile_csv, SpeedUnit, WindSample};
    use crate::{feet_to_meters, BearingMean, ValidationError};

    fn profile() -> WindProfile {
        let csv = "altitude,heading,speed\n600,270,6\n400,260,4\n200,250,3\n20,240,2\n";
        parse_profile_csv(csv.as_bytes(), SpeedUnit::MetersPerSecond).unwrap()
    }

    #[test]
    fn test_compute_drop_converts_feet() {
        let report = compute_drop(&profile(), &DropParams::default()).unwrap();
        assert!((report.release_altitude_m - feet_to_meters(2000.0)).abs() < 1e-9);
        assert!((report.target_altitude_m - feet_to_meters(100.0)).abs() < 1e-9);
        // 600, 400, 200 fall inside [30.48, 609.6]; 20 does not
        assert_eq!(report.result.samples_in_window, 3);
        assert!(!report.is_low_confidence());
        // bearings are applied as given: ~260 degrees moves the payload west
        assert!(report.result.easting_m < 0.0);
        assert!(report.result.heading_deg > 225.0 && report.result.heading_deg < 295.0);
    }

    #[test]
    fn test_summary_lines() {
        let report = compute_drop(&profile(), &DropParams::default()).unwrap();
        let lines = report.summary_lines();
        assert_eq!(lines[0], "Release height: 2000 ft MSL");
        assert_eq!(lines[1], "Target height: 100 ft MSL");
        assert_eq!(lines[2], "Descent rate: 10.7 m/s");
        assert!(lines[3].starts_with("Drift heading: "));
        assert!(lines[3].ends_with("° (direction of travel)"));
        assert!(lines[4].ends_with(" meters"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_degenerate_report_is_flagged() {
        let params = DropParams {
            release_height_ft: 100.0,
            target_height_ft: 2000.0,
            ..DropParams::default()
        };
        let report = compute_drop(&profile(), &params).unwrap();
        assert!(report.is_low_confidence());
        assert!(report.result.is_degenerate());
        let lines = report.summary_lines();
        assert!(lines.iter().any(|l| l.starts_with("Low confidence: target altitude")));
    }

    #[test]
    fn test_input_hash_is_stable_and_sensitive() {
        let params = DropParams::default();
        let a = compute_drop(&profile(), &params).unwrap();
        let b = compute_drop(&profile(), &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.input_hash.len(), 64);

        let circular = DropParams {
            bearing_mean: BearingMean::Circular,
            ..params
        };
        let c = compute_drop(&profile(), &circular).unwrap();
        assert_ne!(a.input_hash, c.input_hash);

        let mut samples = profile().samples().to_vec();
        samples.push(WindSample::new(10.0, 0.0, 0.0));
        let d = compute_drop(&WindProfile::new(samples), &params).unwrap();
        assert_ne!(a.input_hash, d.input_hash);
    }

    #[test]
    fn test_report_json_round_trip() {
        let report = compute_drop(&profile(), &DropParams::default()).unwrap();
        let text = report.to_json_pretty().unwrap();
        assert!(text.contains("\"heading_deg\""));
        let back: DropReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back.input_hash, report.input_hash);
    }

    #[test]
    fn test_drop_trajectory_ends_at_result() {
        let params = DropParams::default();
        let report = compute_drop(&profile(), &params).unwrap();
        let points = drop_trajectory(&profile(), &params).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].layer, 0);
        assert_eq!((points[0].easting_m, points[0].northing_m), (0.0, 0.0));
        let last = points.last().unwrap();
        assert_eq!(last.easting_m, report.result.easting_m);
        assert_eq!(last.northing_m, report.result.northing_m);
        assert!((last.elapsed_s - report.result.descent_time_s).abs() < 1e-9);
    }

    #[test]
    fn test_trajectory_csv_layout() {
        let points = drop_trajectory(&profile(), &DropParams::default()).unwrap();
        let mut buf = Vec::new();
        write_trajectory_csv(&points, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("layer,altitude_m,elapsed_s,easting_m,northing_m,distance_m")
        );
        assert_eq!(lines.next(), Some("0,600.000,0.000,0.000,0.000,0.000"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_empty_window_has_no_trajectory() {
        let params = DropParams {
            release_height_ft: 10.0,
            target_height_ft: 5.0,
            ..DropParams::default()
        };
        assert!(drop_trajectory(&profile(), &params).unwrap().is_empty());
    }

    #[test]
    fn test_drop_trajectory_rejects_invalid_input() {
        let zero_rate = DropParams {
            descent_rate_mps: 0.0,
            ..DropParams::default()
        };
        let err = drop_trajectory(&profile(), &zero_rate).unwrap_err();
        assert!(matches!(
            err,
            DropError::Validation(ValidationError::InvalidDescentRate(_))
        ));

        let negative = WindProfile::new(vec![
            WindSample::new(600.0, 90.0, -5.0),
            WindSample::new(100.0, 90.0, 5.0),
        ]);
        let err = drop_trajectory(&negative, &DropParams::default()).unwrap_err();
        assert!(matches!(
            err,
            DropError::Validation(ValidationError::NegativeSpeed { index: 0, .. })
        ));
    }

    #[test]
    fn test_validation_error_propagates() {
        let bad = WindProfile::new(vec![WindSample::new(300.0, 0.0, -1.0)]);
        let err = compute_drop(&bad, &DropParams::default()).unwrap_err();
        assert!(err.is_validation());
    }
}
