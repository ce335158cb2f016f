//! Drawing commands for the drift diagram.
//!
//! The scene is plain data built from a [`DriftResult`]; each front end owns
//! its own canvas and replays the shapes onto it.

use serde::Serialize;

use crate::descent::DriftResult;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

pub const TARGET_COLOR: Rgb = Rgb(220, 20, 60);
pub const RING_COLOR: Rgb = Rgb(128, 128, 128);
pub const ARROW_COLOR: Rgb = Rgb(0, 0, 255);

const RING_SEGMENTS: usize = 96;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    /// Point marker drawn at a fixed pixel size.
    Marker {
        at: (f64, f64),
        radius_px: u32,
        color: Rgb,
    },
    /// Closed polyline in data coordinates.
    Ring {
        points: Vec<(f64, f64)>,
        dashed: bool,
        color: Rgb,
    },
    Arrow {
        from: (f64, f64),
        to: (f64, f64),
        head: [(f64, f64); 3],
        color: Rgb,
    },
    Label {
        at: (f64, f64),
        lines: Vec<String>,
    },
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DriftScene {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub shapes: Vec<Shape>,
}

impl DriftScene {
    /// Target at the origin, a ring at the drift distance and an arrow from
    /// the release-relative offset back onto the target.
    pub fn from_result(result: &DriftResult) -> Self {
        let (x, y) = (result.easting_m, result.northing_m);
        let distance = result.distance_m;
        let margin = (distance * 1.2).max(1.0);

        let mut shapes = vec![Shape::Marker {
            at: (0.0, 0.0),
            radius_px: 5,
            color: TARGET_COLOR,
        }];

        if distance > 0.0 {
            shapes.push(Shape::Ring {
                points: ring_points((0.0, 0.0), distance, RING_SEGMENTS),
                dashed: true,
                color: RING_COLOR,
            });
            let from = (-x, -y);
            let to = (0.0, 0.0);
            shapes.push(Shape::Arrow {
                from,
                to,
                head: arrow_head(from, to, margin * 0.06),
                color: ARROW_COLOR,
            });
        }

        shapes.push(Shape::Label {
            at: (x / 2.0, y / 2.0),
            lines: vec![
                format!("{:.0}°", result.heading_deg),
                format!("{:.0} m", distance),
            ],
        });

        Self {
            x_range: (-margin, margin),
            y_range: (-margin, margin),
            x_label: "East",
            y_label: "North",
            shapes,
        }
    }
}

/// Closed polygon approximating a circle; the first point is repeated last.
fn ring_points(center: (f64, f64), radius: f64, segments: usize) -> Vec<(f64, f64)> {
    let segments = segments.max(3);
    (0..=segments)
        .map(|i| {
            let theta = std::f64::consts::TAU * i as f64 / segments as f64;
            (center.0 + radius * theta.cos(), center.1 + radius * theta.sin())
        })
        .collect()
}

/// Triangle with its tip on `to`, `length` long and 0.75 * `length` wide.
fn arrow_head(from: (f64, f64), to: (f64, f64), length: f64) -> [(f64, f64); 3] {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let norm = dx.hypot(dy);
    if norm <= 0.0 {
        return [to, to, to];
    }
    let (ux, uy) = (dx / norm, dy / norm);
    let length = length.min(norm);
    let half_width = length * 0.375;
    let base = (to.0 - ux * length, to.1 - uy * length);
    [
        to,
        (base.0 - uy * half_width, base.1 + ux * half_width),
        (base.0 + uy * half_width, base.1 - ux * half_width),
    ]
}
