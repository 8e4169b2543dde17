//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual checks in a terminal
//! - deterministic output (golden tests)
//!
//! Gauge cells: `.` low, `=` moderate, `#` high; `^` marks the risk value.
//! History series use one letter per metric (see [`metric_symbol`]).

use chrono::NaiveDate;

use crate::domain::{Metric, ProcessedRecord, RiskLevel};

/// Render the risk gauge:
///
/// ```text
/// Risk: 42.00% (Moderate)
/// [...===####]
///      ^
/// ```
pub fn render_gauge(risk_percent: f64, width: usize) -> String {
    let width = width.max(10);
    let risk = if risk_percent.is_finite() {
        risk_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let level = RiskLevel::from_percent(risk);

    let bar: String = (0..width)
        .map(|i| {
            let p = i as f64 * 100.0 / width as f64;
            match RiskLevel::from_percent(p) {
                RiskLevel::Low => '.',
                RiskLevel::Moderate => '=',
                RiskLevel::High => '#',
            }
        })
        .collect();

    let marker = (risk / 100.0 * (width as f64 - 1.0)).round() as usize;

    let mut out = String::new();
    out.push_str(&format!("Risk: {risk_percent:.2}% ({})\n", level.display_name()));
    out.push_str(&format!("[{bar}]\n"));
    out.push_str(&" ".repeat(marker + 1));
    out.push_str("^\n");
    out
}

pub fn metric_symbol(metric: Metric) -> char {
    match metric {
        Metric::Sst => 's',
        Metric::Hotspot => 'h',
        Metric::Dhw => 'd',
        Metric::SstAnomaly => 'a',
        Metric::Baa => 'b',
        Metric::Baa7dMax => 'm',
        Metric::Risk => 'r',
    }
}

/// Render selected metrics of a location's history on a shared y-axis.
///
/// `records` should be sorted by time. Metrics are drawn in the given order;
/// earlier series win where lines overlap.
pub fn render_history_plot(records: &[&ProcessedRecord], metrics: &[Metric], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return "No data to plot.\n".to_string();
    };
    if metrics.is_empty() {
        return "No metrics selected.\n".to_string();
    }

    let first_date = first.date();
    let last_date = last.date();
    let t_min = 0.0;
    let t_max = ((last_date - first_date).num_days() as f64).max(1.0);

    let (y_min, y_max) = y_range(records, metrics);
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    for &metric in metrics {
        let points: Vec<(f64, f64)> = records
            .iter()
            .map(|r| (days_since(first_date, r.date()), metric.value(r)))
            .collect();
        draw_series(&mut grid, &points, t_min, t_max, y_min, y_max, metric_symbol(metric));
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {first_date}..{last_date} | y=[{y_min:.2}, {y_max:.2}]\n"
    ));
    let legend: Vec<String> = metrics
        .iter()
        .map(|m| format!("{}={}", metric_symbol(*m), m.column_name()))
        .collect();
    out.push_str(&format!("Legend: {}\n", legend.join(" ")));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn days_since(origin: NaiveDate, date: NaiveDate) -> f64 {
    (date - origin).num_days() as f64
}

fn y_range(records: &[&ProcessedRecord], metrics: &[Metric]) -> (f64, f64) {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for r in records {
        for m in metrics {
            let v = m.value(r);
            if v.is_finite() {
                min_y = min_y.min(v);
                max_y = max_y.max(v);
            }
        }
    }

    if !(min_y.is_finite() && max_y.is_finite()) {
        (0.0, 1.0)
    } else if max_y > min_y {
        (min_y, max_y)
    } else {
        (min_y - 1.0, max_y + 1.0)
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y max maps to row 0.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_series(grid: &mut [Vec<char>], points: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64, ch: char) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in points {
        if !y.is_finite() {
            prev = None;
            continue;
        }
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, yy, ch),
            None => {
                if grid[yy][x] == ' ' {
                    grid[yy][x] = ch;
                }
            }
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham). Only fills empty cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
