use leptos::*;

use drop_drift::{BearingMean, DropError, DropParams, SpeedUnit};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_COMMIT: &str = env!("GIT_COMMIT_HASH");

#[cfg(feature = "chart_plotly")]
use wasm_bindgen::{JsCast, JsValue};

#[cfg(feature = "chart_plotly")]
use wasm_bindgen_futures::JsFuture;

#[cfg(feature = "chart_plotly")]
use serde_wasm_bindgen::to_value as to_js;

#[cfg(feature = "chart_plotly")]
use web_sys::{Blob, FileList, HtmlInputElement, HtmlSelectElement};

#[cfg(feature = "chart_plotly")]
use drop_drift::{
    compute_drop, drop_trajectory, parse_profile, write_trajectory_csv, DriftScene, DropReport,
    Shape,
};

#[cfg(feature = "chart_plotly")]
#[derive(Clone)]
struct FileBytes {
    name: String,
    ext: String,
    bytes: Vec<u8>,
}

fn ext_from_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => "csv".to_string(),
    }
}

/// Form values as entered; heights in feet MSL.
#[derive(Clone, Debug, PartialEq)]
struct FormInput {
    release_ft: f64,
    target_ft: f64,
    descent_rate_mps: f64,
    speed_unit: String,
    circular_mean: bool,
}

impl Default for FormInput {
    fn default() -> Self {
        let defaults = DropParams::default();
        Self {
            release_ft: defaults.release_height_ft,
            target_ft: defaults.target_height_ft,
            descent_rate_mps: defaults.descent_rate_mps,
            speed_unit: "mps".to_string(),
            circular_mean: false,
        }
    }
}

impl FormInput {
    fn params(&self) -> DropParams {
        DropParams {
            release_height_ft: self.release_ft,
            target_height_ft: self.target_ft,
            descent_rate_mps: self.descent_rate_mps,
            speed_unit: match self.speed_unit.as_str() {
                "kmh" => SpeedUnit::KilometersPerHour,
                _ => SpeedUnit::MetersPerSecond,
            },
            bearing_mean: if self.circular_mean {
                BearingMean::Circular
            } else {
                BearingMean::Naive
            },
        }
    }
}

/// Status line for a failed request. Validation failures are the user's to
/// fix; anything else means the file could not be read as a profile.
fn error_status(err: &DropError) -> String {
    if err.is_validation() {
        format!("Rejected: {err}")
    } else {
        format!("Could not read wind profile: {err}")
    }
}

fn file_read_status(read_ok: bool) -> String {
    if read_ok {
        "Profile ready. Click Compute.".to_string()
    } else {
        "Could not read the selected file.".to_string()
    }
}

#[cfg(feature = "chart_plotly")]
async fn read_file_bytes(file: web_sys::File) -> Option<FileBytes> {
    let name = file.name();
    let ext = ext_from_name(&name);
    let buf = JsFuture::from(file.array_buffer()).await.ok()?;
    let u8arr = js_sys::Uint8Array::new(&buf);
    let mut bytes = vec![0u8; u8arr.length() as usize];
    u8arr.copy_to(&mut bytes[..]);
    Some(FileBytes { name, ext, bytes })
}

#[cfg(feature = "chart_plotly")]
async fn read_first_file(list: &FileList) -> Option<FileBytes> {
    read_file_bytes(list.item(0)?).await
}

#[cfg(feature = "chart_plotly")]
fn plot_xy(div_id: &str, traces: &js_sys::Array, layout: &JsValue) {
    if let Some(window) = web_sys::window() {
        if let Some(document) = window.document() {
            if let Some(div) = document.get_element_by_id(div_id) {
                let plotly = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("Plotly"))
                    .unwrap_or(JsValue::UNDEFINED);
                if let Ok(func) = js_sys::Reflect::get(&plotly, &JsValue::from_str("react"))
                    .or_else(|_| js_sys::Reflect::get(&plotly, &JsValue::from_str("newPlot")))
                    .and_then(|v| v.dyn_into::<js_sys::Function>())
                {
                    let div_val = JsValue::from(div);
                    let traces_val = JsValue::from(traces.clone());
                    let _ = func.call3(&JsValue::NULL, &div_val, &traces_val, layout);
                }
            }
        }
    }
}

#[cfg(feature = "chart_plotly")]
fn build_scatter_trace(
    name: &str,
    mode: &str,
    points: &[(f64, f64)],
    style: serde_json::Value,
) -> JsValue {
    let trace = js_sys::Object::new();
    js_sys::Reflect::set(&trace, &JsValue::from_str("type"), &JsValue::from_str("scatter")).ok();
    js_sys::Reflect::set(&trace, &JsValue::from_str("name"), &JsValue::from_str(name)).ok();
    js_sys::Reflect::set(&trace, &JsValue::from_str("mode"), &JsValue::from_str(mode)).ok();
    js_sys::Reflect::set(&trace, &JsValue::from_str("showlegend"), &JsValue::from_bool(false))
        .ok();
    let x_arr = js_sys::Array::new();
    let y_arr = js_sys::Array::new();
    for (x, y) in points {
        x_arr.push(&JsValue::from_f64(*x));
        y_arr.push(&JsValue::from_f64(*y));
    }
    js_sys::Reflect::set(&trace, &JsValue::from_str("x"), &x_arr.into()).ok();
    js_sys::Reflect::set(&trace, &JsValue::from_str("y"), &y_arr.into()).ok();
    if let serde_json::Value::Object(entries) = style {
        for (key, value) in entries {
            if let Ok(js) = to_js(&value) {
                js_sys::Reflect::set(&trace, &JsValue::from_str(&key), &js).ok();
            }
        }
    }
    trace.into()
}

#[cfg(feature = "chart_plotly")]
fn render_drift_plot(scene: &DriftScene) {
    let traces = js_sys::Array::new();
    let mut annotations = Vec::new();

    for shape in &scene.shapes {
        match shape {
            Shape::Marker {
                at,
                radius_px,
                color,
            } => {
                traces.push(&build_scatter_trace(
                    "Target",
                    "markers",
                    &[*at],
                    serde_json::json!({
                        "marker": { "size": radius_px * 2, "color": color.hex() }
                    }),
                ));
            }
            Shape::Ring {
                points,
                dashed,
                color,
            } => {
                let dash = if *dashed { "dash" } else { "solid" };
                traces.push(&build_scatter_trace(
                    "Drift radius",
                    "lines",
                    points,
                    serde_json::json!({
                        "hoverinfo": "skip",
                        "line": {
                            "dash": dash,
                            "color": color.hex(),
                            "width": 1
                        }
                    }),
                ));
            }
            Shape::Arrow {
                from,
                to,
                head,
                color,
            } => {
                traces.push(&build_scatter_trace(
                    "Release point",
                    "lines",
                    &[*from, *to],
                    serde_json::json!({ "line": { "color": color.hex(), "width": 2 } }),
                ));
                let mut tri = head.to_vec();
                tri.push(head[0]);
                traces.push(&build_scatter_trace(
                    "",
                    "lines",
                    &tri,
                    serde_json::json!({
                        "fill": "toself",
                        "fillcolor": color.hex(),
                        "hoverinfo": "skip",
                        "line": { "color": color.hex(), "width": 1 }
                    }),
                ));
            }
            Shape::Label { at, lines } => {
                annotations.push(serde_json::json!({
                    "x": at.0,
                    "y": at.1,
                    "text": lines.join("<br>"),
                    "showarrow": false,
                    "font": { "size": 14 },
                }));
            }
        }
    }

    let layout = serde_json::json!({
        "margin": { "t": 20, "r": 20, "b": 50, "l": 60 },
        "xaxis": { "title": scene.x_label, "range": [scene.x_range.0, scene.x_range.1], "zeroline": false },
        "yaxis": { "title": scene.y_label, "range": [scene.y_range.0, scene.y_range.1], "scaleanchor": "x", "zeroline": false },
        "annotations": annotations,
    });
    if let Ok(layout_js) = to_js(&layout) {
        plot_xy("drift_plot", &traces, &layout_js);
    }
}

#[cfg(feature = "chart_plotly")]
fn blob_url_from_str(s: &str) -> Option<String> {
    let arr = js_sys::Array::new();
    arr.push(&JsValue::from_str(s));
    let blob = Blob::new_with_str_sequence(&arr).ok()?;
    web_sys::Url::create_object_url_with_blob(&blob).ok()
}

#[cfg(feature = "chart_plotly")]
fn replace_blob(old: &str, contents: &str) -> String {
    if !old.is_empty() {
        let _ = web_sys::Url::revoke_object_url(old);
    }
    blob_url_from_str(contents).unwrap_or_default()
}

#[cfg(feature = "chart_plotly")]
fn trajectory_csv_text(
    profile: &drop_drift::WindProfile,
    params: &DropParams,
) -> Result<String, DropError> {
    let points = drop_trajectory(profile, params)?;
    let mut buf = Vec::new();
    write_trajectory_csv(&points, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(feature = "chart_plotly")]
#[component]
pub fn App() -> impl IntoView {
    let (file, set_file) = create_signal(Option::<FileBytes>::None);
    let (busy, set_busy) = create_signal(false);
    let (status, set_status) = create_signal(String::from("No wind profile selected."));
    let (form, set_form) = create_signal(FormInput::default());
    let (report, set_report) = create_signal(Option::<DropReport>::None);
    let (csv_href, set_csv_href) = create_signal(String::new());
    let (json_href, set_json_href) = create_signal(String::new());

    let on_file = move |ev: leptos::ev::Event| {
        if let Some(target) = ev.target() {
            if let Ok(input) = target.dyn_into::<HtmlInputElement>() {
                if let Some(list) = input.files() {
                    set_status.set("Reading file…".to_string());
                    spawn_local(async move {
                        let picked = read_first_file(&list).await;
                        input.set_value("");
                        set_status.set(file_read_status(picked.is_some()));
                        set_file.set(picked);
                    });
                }
            }
        }
    };

    create_effect(move |_| {
        if let Some(report) = report.get() {
            render_drift_plot(&DriftScene::from_result(&report.result));
        }
    });

    let on_compute = move |_ev: leptos::ev::MouseEvent| {
        if busy.get_untracked() {
            return;
        }
        let Some(fb) = file.get_untracked() else {
            set_status.set("Select a wind profile first.".to_string());
            return;
        };
        let params = form.get_untracked().params();
        set_busy.set(true);
        set_report.set(None);

        let profile = match parse_profile(&fb.bytes, &fb.ext, params.speed_unit) {
            Ok(profile) => profile,
            Err(err) => {
                set_status.set(error_status(&err));
                set_busy.set(false);
                return;
            }
        };
        let result = compute_drop(&profile, &params)
            .and_then(|report| Ok((trajectory_csv_text(&profile, &params)?, report)))
            .and_then(|(csv, report)| Ok((csv, report.to_json_pretty()?, report)));
        match result {
            Ok((csv, json, report)) => {
                set_csv_href.set(replace_blob(&csv_href.get_untracked(), &csv));
                set_json_href.set(replace_blob(&json_href.get_untracked(), &json));
                let mut msg = format!(
                    "{}: {} samples, {} in window.",
                    fb.name,
                    profile.len(),
                    report.result.samples_in_window
                );
                if report.is_low_confidence() {
                    msg.push_str(" Low confidence result, see warnings below.");
                }
                set_status.set(msg);
                set_report.set(Some(report));
            }
            Err(err) => set_status.set(error_status(&err)),
        }
        set_busy.set(false);
    };

    let summary_view = move || {
        report
            .get()
            .map(|r| r.summary_lines())
            .unwrap_or_default()
            .into_iter()
            .map(|line| view! { <li>{line}</li> })
            .collect_view()
    };

    let number_input = move |ev: leptos::ev::Event| -> Option<f64> {
        let target = ev.target()?;
        let input = target.dyn_into::<HtmlInputElement>().ok()?;
        input.value().trim().parse::<f64>().ok()
    };

    view! {
        <main class="tufte" on:dragover=move |e| { e.prevent_default(); } on:drop=move |e| {
            e.prevent_default();
            if let Ok(de) = e.dyn_into::<web_sys::DragEvent>() {
                if let Some(dt) = de.data_transfer() { if let Some(list) = dt.files() {
                    spawn_local(async move {
                        let picked = read_first_file(&list).await;
                        set_status.set(file_read_status(picked.is_some()));
                        set_file.set(picked);
                    });
                }}
            }
        }>
            <header>
                <h1>"Balloon Drop Drift"</h1>
                <p class="subtitle">"Upload a wind profile to estimate where a payload lands after release."</p>
                <p class="note">{"Web version "}{APP_VERSION}{" ("}{APP_COMMIT}{")"}</p>
            </header>
            <section class="controls">
                <label class="dropzone">
                    <span>"Drag & drop or click to choose a CSV wind profile"</span>
                    <input id="file_input" type="file" accept=".csv,.txt,.tsv" on:change=on_file />
                </label>
                <p class="note">{move || file.get().map(|f| f.name).unwrap_or_default()}</p>
                <div class="control-row">
                    <label>"Release height (ft MSL): "<input type="number" step="any" value=move || form.get().release_ft.to_string()
                        on:change=move |ev| { if let Some(v) = number_input(ev) { set_form.update(|f| f.release_ft = v); } }/></label>
                    <label>"Target height (ft MSL): "<input type="number" step="any" value=move || form.get().target_ft.to_string()
                        on:change=move |ev| { if let Some(v) = number_input(ev) { set_form.update(|f| f.target_ft = v); } }/></label>
                    <label>"Descent rate (m/s): "<input type="number" step="any" min="0" value=move || form.get().descent_rate_mps.to_string()
                        on:change=move |ev| { if let Some(v) = number_input(ev) { set_form.update(|f| f.descent_rate_mps = v); } }/></label>
                </div>
                <div class="control-row">
                    <label class="note">"Speed unit:"</label>
                    <select on:change=move |ev| {
                        if let Some(t)=ev.target(){ if let Ok(sel)=t.dyn_into::<HtmlSelectElement>(){ set_form.update(|f| f.speed_unit = sel.value()); }}
                    } prop:value=move || form.get().speed_unit>
                        <option value="mps">"m/s"</option>
                        <option value="kmh">"km/h"</option>
                    </select>
                    <label><input type="checkbox" prop:checked=move || form.get().circular_mean on:change=move |ev| {
                        if let Some(t)=ev.target(){ if let Ok(inp)=t.dyn_into::<HtmlInputElement>(){ set_form.update(|f| f.circular_mean = inp.checked()); }}
                    }/>" Circular bearing mean"</label>
                </div>
                <button class="btn" on:click=on_compute disabled=move || busy.get()>"Compute"</button>
                <span class="note">{move || status.get()}</span>
            </section>
            <section class="results">
                <ul>{summary_view}</ul>
            </section>
            <section class="plots">
                <div id="drift_plot" class="plot"></div>
            </section>
            <section class="files">
                <p class="note">"The arrow runs from the release point to the target; release upwind by the drift distance along the reversed heading."</p>
                <p class="note">"Nothing leaves your device. All processing happens locally in your browser."</p>
            </section>
            <section class="downloads">
                <a id="dl_csv" href=move || csv_href.get() download="drift.csv" style=move || if csv_href.get().is_empty() {"display:none;".to_string()} else {"display:inline;".to_string()}>"Download drift.csv"</a>
                <a id="dl_json" href=move || json_href.get() download="drift_report.json" style=move || if json_href.get().is_empty() {"display:none;".to_string()} else {"display:inline;".to_string()}>"Download drift_report.json"</a>
            </section>
        </main>
    }
}

#[cfg(all(target_arch = "wasm32", feature = "chart_plotly"))]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    leptos::mount_to_body(|| view! { <App/> });
}
