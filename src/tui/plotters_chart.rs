//! Plotters-powered history chart widget for Ratatui.
//!
//! Plotters output is rendered into the Ratatui buffer via
//! `plotters-ratatui-backend`.

use chrono::{Datelike, NaiveDate};
use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

use crate::domain::{Metric, ProcessedRecord};

/// One line per selected metric over time.
///
/// All series and bounds are computed outside the render call so `render()`
/// only draws.
pub struct HistoryChart<'a> {
    pub series: &'a [MetricSeries],
    /// X bounds in days since 0001-01-01 (CE).
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub metric: Metric,
    pub points: Vec<(f64, f64)>,
}

impl<'a> Widget for HistoryChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters cannot lay out a chart in a tiny area.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.x_bounds;
        let [y0, y1] = self.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            // Mesh lines are noise at terminal resolution.
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| fmt_axis_date(*v))
                .y_label_formatter(&|v| format!("{v:.1}"))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            for s in self.series {
                let (r, g, b) = metric_rgb(s.metric);
                chart.draw_series(LineSeries::new(s.points.iter().copied(), &RGBColor(r, g, b)))?;
            }

            Ok(())
        });

        widget.render(area, buf);
    }
}

/// High-contrast palette, one colour per metric.
pub fn metric_rgb(metric: Metric) -> (u8, u8, u8) {
    match metric {
        Metric::Sst => (0, 255, 255),
        Metric::Hotspot => (255, 128, 0),
        Metric::Dhw => (255, 255, 0),
        Metric::SstAnomaly => (255, 0, 255),
        Metric::Baa => (0, 128, 255),
        Metric::Baa7dMax => (128, 255, 128),
        Metric::Risk => (255, 64, 64),
    }
}

pub fn metric_color(metric: Metric) -> Color {
    let (r, g, b) = metric_rgb(metric);
    Color::Rgb(r, g, b)
}

pub fn date_to_x(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

pub fn fmt_axis_date(v: f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(v.round() as i32)
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_default()
}

/// Build per-metric series and shared bounds for rows sorted by time.
///
/// Returns `None` when there is nothing to draw.
pub fn history_series(rows: &[&ProcessedRecord], metrics: &[Metric]) -> Option<(Vec<MetricSeries>, [f64; 2], [f64; 2])> {
    let first = rows.first()?;
    let last = rows.last()?;
    if metrics.is_empty() {
        return None;
    }

    let series: Vec<MetricSeries> = metrics
        .iter()
        .map(|&metric| MetricSeries {
            metric,
            points: rows
                .iter()
                .map(|r| (date_to_x(r.date()), metric.value(r)))
                .filter(|(_, y)| y.is_finite())
                .collect(),
        })
        .collect();

    let mut x0 = date_to_x(first.date());
    let mut x1 = date_to_x(last.date());
    if x1 <= x0 {
        x0 -= 1.0;
        x1 += 1.0;
    }

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for s in &series {
        for &(_, y) in &s.points {
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
    }
    if !y_min.is_finite() || !y_max.is_finite() {
        return None;
    }
    if y_max <= y_min {
        y_min -= 1.0;
        y_max += 1.0;
    }
    let pad = ((y_max - y_min) * 0.05).max(1e-12);

    Some((series, [x0, x1], [y_min - pad, y_max + pad]))
}
