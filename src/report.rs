//! SVG learning curves.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::metric::TrainingHistory;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_TRAIN: &str = "#1f77b4";
const COLOR_VALIDATION: &str = "#ff7f0e";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

pub const ACCURACY_CHART: &str = "accuracy.svg";
pub const LOSS_CHART: &str = "loss.svg";
pub const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone)]
pub struct DataSeries<'a> {
    pub name: &'a str,
    pub values: &'a [f64],
    pub color: &'a str,
}

/// Writes the accuracy and loss curves (train vs validation) into `dir`.
pub fn plot_history(history: &TrainingHistory, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let charts = [
        (
            ACCURACY_CHART,
            "Model accuracy",
            "Accuracy",
            &history.accuracy,
            &history.val_accuracy,
        ),
        (LOSS_CHART, "Model loss", "Loss", &history.loss, &history.val_loss),
    ];

    let mut written = Vec::with_capacity(charts.len());
    for (file, title, y_label, train, validation) in charts {
        let series = [
            DataSeries {
                name: "Train",
                values: train,
                color: COLOR_TRAIN,
            },
            DataSeries {
                name: "Validation",
                values: validation,
                color: COLOR_VALIDATION,
            },
        ];
        let path = dir.join(file);
        fs::write(&path, line_chart(title, "Epoch", y_label, &series))?;
        info!("wrote {:?}", path);
        written.push(path);
    }

    Ok(written)
}

/// Writes the per-epoch metrics as JSON. `NaN` entries come out as `null`.
pub fn save_history(history: &TrainingHistory, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(HISTORY_FILE);
    fs::write(&path, serde_json::to_string_pretty(history)?)?;
    info!("wrote {:?}", path);
    Ok(path)
}

/// Renders one line chart; x is the 1-based index of each value.
pub fn line_chart(title: &str, x_label: &str, y_label: &str, series: &[DataSeries<'_>]) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let epochs = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    let (x_min, x_max) = (1.0, (epochs.max(2)) as f64);
    let (y_min, y_max) = y_range(series);

    let to_x = |x: f64| MARGIN_LEFT + (x - x_min) / (x_max - x_min) * plot_width;
    let to_y = |y: f64| MARGIN_TOP + plot_height - (y - y_min) / (y_max - y_min) * plot_height;

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}">"#,
        w = CHART_WIDTH,
        h = CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0,
        COLOR_TEXT,
        escape_xml(title)
    ));

    for i in 0..=5 {
        let value = y_min + (i as f64 / 5.0) * (y_max - y_min);
        let y = to_y(value);
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{y}" x2="{}" y2="{y}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT,
            MARGIN_LEFT + plot_width,
            COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.3}</text>"#,
            MARGIN_LEFT - 10.0,
            y + 4.0,
            COLOR_TEXT,
            value
        ));
    }

    for epoch in 1..=epochs {
        let x = to_x(epoch as f64);
        svg.push_str(&format!(
            r#"<text x="{x}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{}">{epoch}</text>"#,
            MARGIN_TOP + plot_height + 20.0,
            COLOR_TEXT
        ));
    }

    svg.push_str(&format!(
        r#"<line x1="{l}" y1="{b}" x2="{r}" y2="{b}" stroke="{c}" stroke-width="2"/>"#,
        l = MARGIN_LEFT,
        r = MARGIN_LEFT + plot_width,
        b = MARGIN_TOP + plot_height,
        c = COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{l}" y1="{t}" x2="{l}" y2="{b}" stroke="{c}" stroke-width="2"/>"#,
        l = MARGIN_LEFT,
        t = MARGIN_TOP,
        b = MARGIN_TOP + plot_height,
        c = COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        CHART_HEIGHT - 20.0,
        COLOR_TEXT,
        escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{h}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {h})">{}</text>"#,
        COLOR_TEXT,
        escape_xml(y_label),
        h = CHART_HEIGHT / 2.0
    ));

    for s in series {
        let points: Vec<String> = s
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, &v)| format!("{:.2},{:.2}", to_x((i + 1) as f64), to_y(v)))
            .collect();
        if points.is_empty() {
            continue;
        }
        svg.push_str(&format!(
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2.5"/>"#,
            points.join(" "),
            s.color
        ));
    }

    // Legend, upper left.
    for (i, s) in series.iter().enumerate() {
        let y = MARGIN_TOP + 15.0 + i as f64 * 20.0;
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{y}" x2="{}" y2="{y}" stroke="{}" stroke-width="2.5"/>"#,
            MARGIN_LEFT + 10.0,
            MARGIN_LEFT + 35.0,
            s.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            MARGIN_LEFT + 42.0,
            y + 4.0,
            COLOR_TEXT,
            escape_xml(s.name)
        ));
    }

    svg.push_str("</svg>");
    svg
}

fn y_range(series: &[DataSeries<'_>]) -> (f64, f64) {
    let finite = series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 0.5, max + 0.5);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
