use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{DropError, ValidationError};

/// One row of a wind profile. Direction is in degrees clockwise from north
/// and is used unmodified as the bearing along which the layer drifts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct WindSample {
    pub altitude_m: f64,
    pub direction_deg: f64,
    pub speed_mps: f64,
}

impl WindSample {
    pub fn new(altitude_m: f64, direction_deg: f64, speed_mps: f64) -> Self {
        Self {
            altitude_m,
            direction_deg,
            speed_mps,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    MetersPerSecond,
    KilometersPerHour,
}

impl Default for SpeedUnit {
    fn default() -> Self {
        SpeedUnit::MetersPerSecond
    }
}

impl SpeedUnit {
    pub fn to_mps(self, value: f64) -> f64 {
        match self {
            SpeedUnit::MetersPerSecond => value,
            SpeedUnit::KilometersPerHour => value * 1000.0 / 3600.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpeedUnit::MetersPerSecond => "m/s",
            SpeedUnit::KilometersPerHour => "km/h",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Altitude,
    Direction,
    Speed,
}

impl ColumnRole {
    const ALL: [ColumnRole; 3] = [ColumnRole::Altitude, ColumnRole::Direction, ColumnRole::Speed];

    /// Canonical column name after normalization.
    pub fn name(self) -> &'static str {
        match self {
            ColumnRole::Altitude => "Altitude",
            ColumnRole::Direction => "WindDirection",
            ColumnRole::Speed => "WindSpeed",
        }
    }
}

/// Header positions of the three required columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnMap {
    pub altitude: usize,
    pub direction: usize,
    pub speed: usize,
}

/// Classify a header by substring, case-insensitively. Altitude is checked
/// first so that e.g. "Altitude speed" still names the altitude column.
pub fn normalize_header(name: &str) -> Option<ColumnRole> {
    let lower = name.trim().to_lowercase();
    if lower.contains("altitude") {
        Some(ColumnRole::Altitude)
    } else if lower.contains("heading") || lower.contains("direction") {
        Some(ColumnRole::Direction)
    } else if lower.contains("speed") {
        Some(ColumnRole::Speed)
    } else {
        None
    }
}

/// Role per header; only the first header claiming a role keeps it.
fn assign_roles<'a, I>(headers: I) -> Vec<Option<ColumnRole>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut taken = Vec::with_capacity(ColumnRole::ALL.len());
    headers
        .into_iter()
        .map(|header| match normalize_header(header) {
            Some(role) if !taken.contains(&role) => {
                taken.push(role);
                Some(role)
            }
            _ => None,
        })
        .collect()
}

pub fn resolve_columns<'a, I>(headers: I) -> Result<ColumnMap, DropError>
where
    I: IntoIterator<Item = &'a str>,
{
    let roles = assign_roles(headers);
    let find = |role: ColumnRole| roles.iter().position(|r| *r == Some(role));
    match (
        find(ColumnRole::Altitude),
        find(ColumnRole::Direction),
        find(ColumnRole::Speed),
    ) {
        (Some(altitude), Some(direction), Some(speed)) => Ok(ColumnMap {
            altitude,
            direction,
            speed,
        }),
        _ => Err(DropError::MissingColumns(
            ColumnRole::ALL
                .iter()
                .filter(|role| find(**role).is_none())
                .map(|role| role.name())
                .collect(),
        )),
    }
}

/// Ordered wind samples as read; not necessarily sorted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WindProfile {
    samples: Vec<WindSample>,
}

impl WindProfile {
    pub fn new(samples: Vec<WindSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[WindSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Reject non-finite values and negative speeds anywhere in the profile.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (index, sample) in self.samples.iter().enumerate() {
            for (field, value) in [
                ("altitude", sample.altitude_m),
                ("direction", sample.direction_deg),
                ("speed", sample.speed_mps),
            ] {
                if !value.is_finite() {
                    return Err(ValidationError::NonFinite {
                        index,
                        field,
                        value,
                    });
                }
            }
            if sample.speed_mps < 0.0 {
                return Err(ValidationError::NegativeSpeed {
                    index,
                    speed: sample.speed_mps,
                });
            }
        }
        Ok(())
    }

    /// Samples with `target <= altitude <= release`, highest first. The sort
    /// is stable, so samples sharing an altitude keep their file order.
    pub fn window(&self, release_altitude_m: f64, target_altitude_m: f64) -> Vec<WindSample> {
        let mut window: Vec<WindSample> = self
            .samples
            .iter()
            .filter(|s| s.altitude_m <= release_altitude_m && s.altitude_m >= target_altitude_m)
            .copied()
            .collect();
        window.sort_by_key(|s| Reverse(OrderedFloat(s.altitude_m)));
        window
    }
}

impl FromIterator<WindSample> for WindProfile {
    fn from_iter<T: IntoIterator<Item = WindSample>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Parse a wind profile from bytes using the provided format hint (extension).
pub fn parse_profile(
    input: &[u8],
    format: &str,
    speed_unit: SpeedUnit,
) -> Result<WindProfile, DropError> {
    let delimiter = delimiter_for(format)?;
    parse_delimited(input, delimiter, speed_unit)
}

/// Parse comma-separated text whose header names an altitude, a
/// direction/heading and a speed column.
pub fn parse_profile_csv(input: &[u8], speed_unit: SpeedUnit) -> Result<WindProfile, DropError> {
    parse_delimited(input, b',', speed_unit)
}

fn delimiter_for(format: &str) -> Result<u8, DropError> {
    let format_lc = format.to_ascii_lowercase();
    let is = |ext: &str| format_lc == ext || format_lc.ends_with(&format!(".{ext}"));
    if is("csv") || is("txt") {
        Ok(b',')
    } else if is("tsv") {
        Ok(b'\t')
    } else {
        Err(DropError::UnsupportedFormat(format.to_string()))
    }
}

fn reader(input: &[u8], delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input)
}

fn parse_delimited(
    input: &[u8],
    delimiter: u8,
    speed_unit: SpeedUnit,
) -> Result<WindProfile, DropError> {
    let mut reader = reader(input, delimiter);
    let headers = reader
        .headers()
        .map_err(|e| DropError::ProfileParse(e.to_string()))?
        .clone();
    let columns = resolve_columns(headers.iter())?;

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DropError::ProfileParse(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let cell = |idx: usize| -> Result<f64, ValidationError> {
            let raw = record.get(idx).unwrap_or("");
            raw.parse::<f64>().map_err(|_| ValidationError::NotNumeric {
                line,
                column: headers.get(idx).unwrap_or("").to_string(),
                raw: raw.to_string(),
            })
        };
        let altitude = cell(columns.altitude)?;
        let direction = cell(columns.direction)?;
        let speed = cell(columns.speed)?;
        samples.push(WindSample::new(altitude, direction, speed_unit.to_mps(speed)));
    }

    Ok(WindProfile::new(samples))
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ColumnStats {
    pub header: String,
    pub role: Option<ColumnRole>,
    pub count: usize,
    pub numeric: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProfileInspection {
    pub rows: usize,
    pub columns: Vec<ColumnStats>,
    pub missing_roles: Vec<ColumnRole>,
}

impl ProfileInspection {
    pub fn is_usable(&self) -> bool {
        self.missing_roles.is_empty()
    }
}

/// Per-column summary of a profile file, without requiring it to be usable.
pub fn inspect_profile(input: &[u8], format: &str) -> Result<ProfileInspection, DropError> {
    let mut reader = reader(input, delimiter_for(format)?);
    let headers = reader
        .headers()
        .map_err(|e| DropError::ProfileParse(e.to_string()))?
        .clone();
    let roles = assign_roles(headers.iter());
    let mut columns: Vec<ColumnStats> = headers
        .iter()
        .zip(roles.iter())
        .map(|(header, role)| ColumnStats {
            header: header.to_string(),
            role: *role,
            ..ColumnStats::default()
        })
        .collect();

    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| DropError::ProfileParse(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows += 1;
        for (stats, raw) in columns.iter_mut().zip(record.iter()) {
            if raw.is_empty() {
                continue;
            }
            stats.count += 1;
            if let Ok(val) = raw.parse::<f64>() {
                if val.is_finite() {
                    stats.numeric += 1;
                    stats.min = Some(stats.min.map_or(val, |m| m.min(val)));
                    stats.max = Some(stats.max.map_or(val, |m| m.max(val)));
                }
            }
        }
    }

    let missing_roles = ColumnRole::ALL
        .iter()
        .copied()
        .filter(|role| !roles.contains(&Some(*role)))
        .collect();

    Ok(ProfileInspection {
        rows,
        columns,
        missing_roles,
    })
}
