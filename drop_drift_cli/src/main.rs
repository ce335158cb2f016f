use std::fs::{self, File};
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use drop_drift::{
    compute_drop, drop_trajectory, inspect_profile, meters_to_feet, parse_profile,
    write_trajectory_csv, BearingMean, DropParams, DropReport, DriftScene, Shape, SpeedUnit,
    TrajectoryPoint,
};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Balloon drop drift estimation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate where a payload released at altitude lands for one or more wind profiles
    Drop(DropArgs),
    /// Inspect wind profile files for recognised columns and value ranges
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct DropArgs {
    /// Wind profile files (CSV/TSV with altitude, heading/direction and speed columns)
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Release height (ft MSL)
    #[arg(long)]
    release_ft: Option<f64>,

    /// Target height (ft MSL)
    #[arg(long)]
    target_ft: Option<f64>,

    /// Parachute descent rate (m/s)
    #[arg(long)]
    descent_rate: Option<f64>,

    /// Unit of the speed column
    #[arg(long, value_enum)]
    speed_unit: Option<SpeedUnitOpt>,

    /// Average layer bearings on the circle instead of arithmetically
    #[arg(long, action = ArgAction::SetTrue)]
    circular_mean: bool,

    /// JSON file with parameter overrides (flags take precedence)
    #[arg(long, value_hint = ValueHint::FilePath)]
    params: Option<PathBuf>,

    /// Output trajectory CSV path (`-` for stdout)
    #[arg(short, long, default_value = "drift.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output JSON report path
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Output PNG figure path (defaults next to CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable plot generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Wind profile files to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "profile_report.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SpeedUnitOpt {
    Mps,
    Kmh,
}

impl From<SpeedUnitOpt> for SpeedUnit {
    fn from(value: SpeedUnitOpt) -> Self {
        match value {
            SpeedUnitOpt::Mps => SpeedUnit::MetersPerSecond,
            SpeedUnitOpt::Kmh => SpeedUnit::KilometersPerHour,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Drop(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Drop(args) => handle_drop(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn build_params(args: &DropArgs) -> Result<DropParams> {
    let mut params = match args.params.as_ref() {
        Some(path) => DropParams::load(path)
            .with_context(|| format!("failed to load parameters from {}", path.display()))?,
        None => DropParams::default(),
    };
    if let Some(release) = args.release_ft {
        params.release_height_ft = release;
    }
    if let Some(target) = args.target_ft {
        params.target_height_ft = target;
    }
    if let Some(rate) = args.descent_rate {
        params.descent_rate_mps = rate;
    }
    if let Some(unit) = args.speed_unit {
        params.speed_unit = unit.into();
    }
    if args.circular_mean {
        params.bearing_mean = BearingMean::Circular;
    }
    Ok(params)
}

#[derive(Debug)]
struct DropOutcome {
    input: PathBuf,
    report: DropReport,
    trajectory: Vec<TrajectoryPoint>,
}

fn handle_drop(args: DropArgs) -> Result<()> {
    if args.inputs.is_empty() {
        return Err(anyhow!("no input files supplied"));
    }
    let params = build_params(&args)?;
    if params.bearing_mean == BearingMean::Circular {
        info!("Using circular bearing mean (differs from the reference naive average)");
    }
    debug!("Speed column unit: {}", params.speed_unit.label());

    let t_compute = Instant::now();
    let outcomes: Vec<DropOutcome> = args
        .inputs
        .par_iter()
        .map(|path| run_drop(path, &params))
        .collect::<Result<Vec<_>>>()?;
    if args.profile || args.verbose {
        info!(
            "Parse + simulate stage: {:.1} ms ({} profiles)",
            t_compute.elapsed().as_secs_f64() * 1000.0,
            outcomes.len()
        );
    }

    let multi = outcomes.len() > 1;
    for outcome in &outcomes {
        log_outcome(outcome);
        write_outputs(outcome, &args, multi)?;
    }

    Ok(())
}

fn run_drop(path: &Path, params: &DropParams) -> Result<DropOutcome> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("csv");
    let profile = parse_profile(&data, hint, params.speed_unit)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let report = compute_drop(&profile, params)
        .with_context(|| format!("rejected wind profile {}", path.display()))?;

    let trajectory = drop_trajectory(&profile, params)
        .with_context(|| format!("rejected wind profile {}", path.display()))?;

    Ok(DropOutcome {
        input: path.to_path_buf(),
        report,
        trajectory,
    })
}

fn log_outcome(outcome: &DropOutcome) {
    info!("{}:", outcome.input.display());
    for line in outcome.report.summary_lines() {
        info!("  {}", line);
    }
    for point in &outcome.trajectory {
        debug!(
            "  layer {} at {:.0} m ({:.0} ft): t={:.1} s, e={:.1} m, n={:.1} m",
            point.layer,
            point.altitude_m,
            meters_to_feet(point.altitude_m),
            point.elapsed_s,
            point.easting_m,
            point.northing_m
        );
    }
    if outcome.report.is_low_confidence() {
        warn!(
            "{}: drift estimate has very low confidence (wind profile does not cover the descent)",
            outcome.input.display()
        );
    }
}

fn write_outputs(outcome: &DropOutcome, args: &DropArgs, multi: bool) -> Result<()> {
    let csv_path = output_path_for(&args.output, &outcome.input, multi);
    if csv_path.as_os_str() == "-" {
        write_trajectory_stdout(&outcome.trajectory)?;
    } else {
        write_trajectory_file(&outcome.trajectory, &csv_path)?;
        info!("Wrote trajectory CSV: {}", csv_path.display());
    }

    if let Some(json) = args.json.as_ref() {
        let path = output_path_for(json, &outcome.input, multi);
        let text = outcome.report.to_json_pretty()?;
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote report: {}", path.display());
    }

    if args.no_plot {
        return Ok(());
    }

    let scene = DriftScene::from_result(&outcome.report.result);
    let t_plot = Instant::now();
    let png_path = match args.png.as_ref() {
        Some(path) => Some(output_path_for(path, &outcome.input, multi)),
        None if csv_path.as_os_str() != "-" => Some(csv_path.with_extension("png")),
        None => None,
    };
    if let Some(path) = png_path {
        match render_scene_guard(&scene, &path, ChartKind::Png) {
            Ok(()) => info!("Wrote plot: {}", path.display()),
            Err(err) => warn!("Skipping PNG render ({}): {}", path.display(), err),
        }
    }
    if let Some(svg) = args.svg.as_ref() {
        let path = output_path_for(svg, &outcome.input, multi);
        match render_scene_guard(&scene, &path, ChartKind::Svg) {
            Ok(()) => info!("Wrote plot: {}", path.display()),
            Err(err) => warn!("Skipping SVG render ({}): {}", path.display(), err),
        }
    }
    if args.profile || args.verbose {
        info!(
            "Plot stage: {:.1} ms",
            t_plot.elapsed().as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

/// With several inputs, suffix each output stem with the input's stem so
/// results don't overwrite each other.
fn output_path_for(base: &Path, input: &Path, multi: bool) -> PathBuf {
    if !multi || base.as_os_str() == "-" {
        return base.to_path_buf();
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("drift");
    let input_stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("profile");
    let name = match base.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, input_stem, ext),
        None => format!("{}_{}", stem, input_stem),
    };
    base.with_file_name(name)
}

fn write_trajectory_stdout(points: &[TrajectoryPoint]) -> Result<()> {
    let stdout = io::stdout();
    write_trajectory_csv(points, stdout.lock())?;
    Ok(())
}

fn write_trajectory_file(points: &[TrajectoryPoint], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_trajectory_csv(points, file)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let mut report = String::new();

    for path in &args.inputs {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let hint = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("csv");
        let inspection = inspect_profile(&data, hint)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        report.push_str(&format!("FILE: {}\n", path.display()));
        report.push_str(&format!("  rows: {}\n", inspection.rows));
        if inspection.is_usable() {
            report.push_str("  usable: yes\n");
        } else {
            let missing: Vec<&str> = inspection.missing_roles.iter().map(|r| r.name()).collect();
            report.push_str(&format!("  usable: no (missing {})\n", missing.join(", ")));
            warn!("{} is missing required columns", path.display());
        }

        report.push_str("  columns:\n");
        for column in &inspection.columns {
            let role = column.role.map_or("-", |r| r.name());
            report.push_str(&format!(
                "    - {:?} -> {}: count={}, numeric={}, min={}, max={}\n",
                column.header,
                role,
                column.count,
                column.numeric,
                column.min.map_or("n/a".into(), |v| format!("{:.3}", v)),
                column.max.map_or("n/a".into(), |v| format!("{:.3}", v))
            ));
        }
        report.push('\n');
    }

    if args.output.as_os_str() == "-" {
        io::stdout().lock().write_all(report.as_bytes())?;
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Profile report written: {}", args.output.display());
    }
    Ok(())
}

enum ChartKind {
    Png,
    Svg,
}

fn render_scene_guard(scene: &DriftScene, path: &Path, kind: ChartKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        match kind {
            ChartKind::Png => {
                let root = BitMapBackend::new(path, (760, 760)).into_drawing_area();
                draw_scene(root, scene)
            }
            ChartKind::Svg => {
                let root = SVGBackend::new(path, (760, 760)).into_drawing_area();
                draw_scene(root, scene)
            }
        }
        .map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn rgb(color: drop_drift::Rgb) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

fn draw_scene<DB>(root: DrawingArea<DB, plotters::coord::Shift>, scene: &DriftScene) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let area = root;
    area.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&area)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(
            scene.x_range.0..scene.x_range.1,
            scene.y_range.0..scene.y_range.1,
        )?;

    chart
        .configure_mesh()
        .x_desc(scene.x_label)
        .y_desc(scene.y_label)
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(FontDesc::new(
            FontFamily::SansSerif,
            16.0,
            FontStyle::Normal,
        ))
        .draw()?;

    for shape in &scene.shapes {
        match shape {
            Shape::Marker {
                at,
                radius_px,
                color,
            } => {
                chart.draw_series(std::iter::once(Circle::new(
                    *at,
                    *radius_px,
                    rgb(*color).filled(),
                )))?;
            }
            Shape::Ring {
                points,
                dashed,
                color,
            } => {
                let style = rgb(*color);
                if *dashed {
                    // every other segment of the polygon
                    for (idx, pair) in points.windows(2).enumerate() {
                        if idx % 2 == 0 {
                            chart.draw_series(LineSeries::new(pair.iter().copied(), &style))?;
                        }
                    }
                } else {
                    chart.draw_series(LineSeries::new(points.iter().copied(), &style))?;
                }
            }
            Shape::Arrow {
                from,
                to,
                head,
                color,
            } => {
                let style = ShapeStyle {
                    color: rgb(*color).to_rgba(),
                    filled: false,
                    stroke_width: 2,
                };
                chart.draw_series(LineSeries::new([*from, *to], style))?;
                chart.draw_series(std::iter::once(Polygon::new(
                    head.to_vec(),
                    rgb(*color).filled(),
                )))?;
            }
            Shape::Label { at, lines } => {
                let font = FontDesc::new(FontFamily::SansSerif, 20.0, FontStyle::Normal);
                let line_px = 22;
                for (idx, line) in lines.iter().enumerate() {
                    let offset = (idx as i32) * line_px;
                    chart.draw_series(std::iter::once(
                        EmptyElement::at(*at)
                            + Text::new(line.clone(), (8, offset), font.clone().color(&BLACK)),
                    ))?;
                }
            }
        }
    }

    area.present()?;
    Ok(())
}
