//! Ratatui-based dashboard.
//!
//! Layout: a reef list on the left, three tabs on the right (live risk,
//! what-if simulator, historical explorer), status line at the bottom.
//! Live readings go through the shared [`LiveLookup`] cache, so switching
//! between reefs does not refetch within the TTL.

use std::io;
use std::time::Duration;

use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Tabs},
};

use crate::app::pipeline::{LiveLookup, assess_reef};
use crate::config::Settings;
use crate::domain::{Metric, ProcessedRecord, ReefLocation, RiskLevel};
use crate::error::AppError;
use crate::models::GradientBoostingModel;
use crate::risk::{Baseline, DataSource, RiskAssessment, SimBounds, Simulation};

mod plotters_chart;

use plotters_chart::{HistoryChart, MetricSeries, history_series, metric_color};

/// Start the dashboard.
pub fn run(
    settings: Settings,
    model: GradientBoostingModel,
    history: Vec<ProcessedRecord>,
    lookup: LiveLookup,
) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(settings.reefs, model, history, lookup);
    app.load_selected();
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Live,
    WhatIf,
    History,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Live, Tab::WhatIf, Tab::History];

    fn title(self) -> &'static str {
        match self {
            Tab::Live => "Live Risk Assessment",
            Tab::WhatIf => "What-If Simulator",
            Tab::History => "Historical Explorer",
        }
    }

    fn index(self) -> usize {
        Tab::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    fn prev(self) -> Self {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slider {
    Sst,
    Dhw,
}

/// Everything shown for the active reef.
struct ReefView {
    baseline: Baseline,
    assessment: RiskAssessment,
    bounds: SimBounds,
    sim_sst: f64,
    sim_dhw: f64,
    simulation: Option<Simulation>,
}

struct ChartData {
    series: Vec<MetricSeries>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

struct App {
    reefs: Vec<ReefLocation>,
    model: GradientBoostingModel,
    history: Vec<ProcessedRecord>,
    lookup: LiveLookup,
    last_updated: Option<NaiveDate>,
    /// Highlighted row in the reef list.
    cursor: usize,
    /// Reef whose data is shown.
    active: usize,
    tab: Tab,
    slider: Slider,
    metrics: Vec<Metric>,
    view: Option<ReefView>,
    chart: Option<ChartData>,
    insight: String,
    status: String,
}

impl App {
    fn new(
        reefs: Vec<ReefLocation>,
        model: GradientBoostingModel,
        history: Vec<ProcessedRecord>,
        lookup: LiveLookup,
    ) -> Self {
        let last_updated = crate::risk::last_updated(&history);
        let status = if lookup.is_offline() {
            "Offline: using historical data only.".to_string()
        } else {
            String::new()
        };
        Self {
            reefs,
            model,
            history,
            lookup,
            last_updated,
            cursor: 0,
            active: 0,
            tab: Tab::Live,
            slider: Slider::Sst,
            metrics: Metric::DEFAULT_SELECTION.to_vec(),
            view: None,
            chart: None,
            insight: String::new(),
            status,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down => {
                if self.cursor + 1 < self.reefs.len() {
                    self.cursor += 1;
                }
            }
            KeyCode::Enter => {
                self.active = self.cursor;
                self.load_selected();
            }
            KeyCode::Tab => self.tab = self.tab.next(),
            KeyCode::BackTab => self.tab = self.tab.prev(),
            KeyCode::Char('r') => {
                if let Some(reef) = self.reefs.get(self.active) {
                    self.lookup.refresh(reef);
                }
                self.load_selected();
            }
            KeyCode::Char('s') => self.slider = Slider::Sst,
            KeyCode::Char('d') => self.slider = Slider::Dhw,
            KeyCode::Left => self.adjust_slider(-1),
            KeyCode::Right => self.adjust_slider(1),
            KeyCode::Char(c @ '1'..='7') => {
                let idx = (c as u8 - b'1') as usize;
                if let Some(&metric) = Metric::ALL.get(idx) {
                    if toggle_metric(&mut self.metrics, metric) {
                        self.rebuild_chart();
                    } else {
                        self.status = "At least one metric must stay selected.".to_string();
                    }
                }
            }
            _ => {}
        }
        false
    }

    /// Assess the active reef and reset the simulator to its baseline.
    fn load_selected(&mut self) {
        let Some(reef) = self.reefs.get(self.active).cloned() else {
            return;
        };

        match assess_reef(&mut self.lookup, &self.model, &reef, &self.history) {
            Ok((baseline, assessment)) => {
                let bounds = SimBounds::around(&baseline.features);
                let (sim_sst, sim_dhw) = (baseline.features.sst(), baseline.features.dhw());
                self.status = match assessment.source {
                    DataSource::Live => format!("{}: live data.", reef.display_name()),
                    DataSource::HistoricalFallback { date } => {
                        format!("{}: live data unavailable, using {date}.", reef.display_name())
                    }
                };
                let mut view = ReefView {
                    baseline,
                    assessment,
                    bounds,
                    sim_sst,
                    sim_dhw,
                    simulation: None,
                };
                self.resimulate(&mut view);
                self.view = Some(view);
            }
            Err(err) => {
                self.status = err.to_string();
                self.view = None;
            }
        }

        self.insight = crate::report::format_insight(
            &reef.name,
            crate::risk::historical_insight(&self.history, &reef.name).as_ref(),
        )
        .trim_end()
        .to_string();
        self.rebuild_chart();
    }

    fn adjust_slider(&mut self, direction: i32) {
        if self.tab != Tab::WhatIf {
            return;
        }
        let Some(mut view) = self.view.take() else {
            return;
        };
        match self.slider {
            Slider::Sst => {
                view.sim_sst = step_value(view.sim_sst, direction, view.bounds.sst_min, view.bounds.sst_max);
            }
            Slider::Dhw => {
                view.sim_dhw = step_value(view.sim_dhw, direction, view.bounds.dhw_min, view.bounds.dhw_max);
            }
        }
        self.resimulate(&mut view);
        self.view = Some(view);
    }

    fn resimulate(&mut self, view: &mut ReefView) {
        match crate::risk::simulate(&self.model, &view.baseline, view.sim_sst, view.sim_dhw) {
            Ok(sim) => view.simulation = Some(sim),
            Err(err) => {
                view.simulation = None;
                self.status = err.to_string();
            }
        }
    }

    fn rebuild_chart(&mut self) {
        let Some(reef) = self.reefs.get(self.active) else {
            self.chart = None;
            return;
        };
        let rows = crate::risk::history_for_location(&self.history, &reef.name);
        self.chart = history_series(&rows, &self.metrics).map(|(series, x_bounds, y_bounds)| ChartData {
            series,
            x_bounds,
            y_bounds,
        });
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
            .split(frame.area());

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let updated = self
            .last_updated
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mode = if self.lookup.is_offline() { "offline" } else { "live" };
        let line = Line::from(vec![
            Span::styled("coral", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw(" bleaching risk dashboard"),
            Span::styled(
                format!("  | data last updated: {updated} | mode: {mode}"),
                Style::default().fg(Color::Gray),
            ),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(0)])
            .split(area);

        self.draw_reefs(frame, chunks[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(chunks[1]);

        let titles: Vec<Line> = Tab::ALL.iter().map(|t| Line::from(t.title())).collect();
        let tabs = Tabs::new(titles)
            .select(self.tab.index())
            .block(Block::default().borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, right[0]);

        match self.tab {
            Tab::Live => self.draw_live(frame, right[1]),
            Tab::WhatIf => self.draw_what_if(frame, right[1]),
            Tab::History => self.draw_history(frame, right[1]),
        }
    }

    fn draw_reefs(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .reefs
            .iter()
            .enumerate()
            .map(|(i, reef)| {
                let marker = if i == self.active { "● " } else { "  " };
                ListItem::new(format!("{marker}{}", reef.display_name()))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Reefs").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.cursor));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_live(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("Current conditions").borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(view) = &self.view else {
            frame.render_widget(waiting(), inner);
            return;
        };
        let a = &view.assessment;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)])
            .split(inner);

        let mut lines = Vec::new();
        lines.push(Line::from(Span::styled(
            a.reef.display_name(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        if let DataSource::HistoricalFallback { date } = a.source {
            lines.push(Line::from(Span::styled(
                format!("Live data unavailable; using most recent historical data from {date}."),
                Style::default().fg(Color::Yellow),
            )));
        }
        lines.push(Line::from(format!("Data date        : {}", a.time.date_naive())));
        lines.push(Line::from(vec![
            Span::raw("Bleaching risk   : "),
            Span::styled(
                format!("{:.2}% ({})", a.risk_percent, a.level.display_name()),
                Style::default().fg(level_color(a.level)).add_modifier(Modifier::BOLD),
            ),
        ]));
        lines.push(Line::from(format!("Sea surface temp : {:.2} °C", a.sst)));
        lines.push(Line::from(format!("Degree heating   : {:.2} °C-weeks", a.dhw)));
        frame.render_widget(Paragraph::new(Text::from(lines)), chunks[0]);

        frame.render_widget(risk_gauge("Risk", a.risk_percent, a.level), chunks[1]);
    }

    fn draw_what_if(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("What-if").borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(view) = &self.view else {
            frame.render_widget(waiting(), inner);
            return;
        };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
            .split(inner);

        let b = &view.bounds;
        frame.render_widget(
            slider_gauge("SST (°C)", view.sim_sst, b.sst_min, b.sst_max, self.slider == Slider::Sst),
            chunks[0],
        );
        frame.render_widget(
            slider_gauge("DHW (°C-weeks)", view.sim_dhw, b.dhw_min, b.dhw_max, self.slider == Slider::Dhw),
            chunks[1],
        );

        let base = &view.baseline.features;
        let mut lines = vec![Line::from(Span::styled(
            format!("Baseline: SST {:.2} °C, DHW {:.2} °C-weeks", base.sst(), base.dhw()),
            Style::default().fg(Color::Gray),
        ))];
        if let Some(sim) = &view.simulation {
            lines.push(Line::from(vec![
                Span::raw("Simulated risk: "),
                Span::styled(
                    format!("{:.2}% ({})", sim.risk_percent, sim.level.display_name()),
                    Style::default().fg(level_color(sim.level)).add_modifier(Modifier::BOLD),
                ),
            ]));
        }
        frame.render_widget(Paragraph::new(Text::from(lines)), chunks[2]);

        if let Some(sim) = &view.simulation {
            frame.render_widget(risk_gauge("Simulated risk", sim.risk_percent, sim.level), chunks[3]);
        }
    }

    fn draw_history(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(4)])
            .split(area);

        let block = Block::default().title("History").borders(Borders::ALL);
        let inner = block.inner(chunks[0]);
        frame.render_widget(block, chunks[0]);
        frame.render_widget(Clear, inner);

        match &self.chart {
            Some(chart) => {
                let widget = HistoryChart {
                    series: &chart.series,
                    x_bounds: chart.x_bounds,
                    y_bounds: chart.y_bounds,
                };
                frame.render_widget(widget, chart_area(inner));
            }
            None => {
                let msg = Paragraph::new("No historical rows for this reef.").style(Style::default().fg(Color::Yellow));
                frame.render_widget(msg, inner);
            }
        }

        let lines = vec![legend_line(&self.metrics), Line::from(self.insight.as_str())];
        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, chunks[1]);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = match self.tab {
            Tab::Live => "↑/↓ reef  Enter select  Tab switch  r refresh  q quit",
            Tab::WhatIf => "s/d slider  ←/→ adjust  Tab switch  q quit",
            Tab::History => "1-7 toggle metric  Tab switch  q quit",
        };
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

fn waiting() -> Paragraph<'static> {
    Paragraph::new("No assessment available.").style(Style::default().fg(Color::Yellow))
}

fn level_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::Low => Color::Green,
        RiskLevel::Moderate => Color::Yellow,
        RiskLevel::High => Color::Red,
    }
}

fn risk_gauge(title: &str, risk_percent: f64, level: RiskLevel) -> Gauge<'_> {
    Gauge::default()
        .block(Block::default().title(title).borders(Borders::ALL))
        .gauge_style(Style::default().fg(level_color(level)))
        .ratio(gauge_ratio(risk_percent, 0.0, 100.0))
        .label(format!("{risk_percent:.1}%"))
}

fn slider_gauge(title: &str, value: f64, lo: f64, hi: f64, active: bool) -> Gauge<'_> {
    let border = if active {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Gauge::default()
        .block(Block::default().title(title).borders(Borders::ALL).border_style(border))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(gauge_ratio(value, lo, hi))
        .label(format!("{value:.2}  [{lo:.2} .. {hi:.2}]"))
}

/// Position of `value` in `[lo, hi]` as a ratio in `[0, 1]`.
fn gauge_ratio(value: f64, lo: f64, hi: f64) -> f64 {
    if !(value.is_finite() && hi > lo) {
        return 0.0;
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Move `value` by one slider step and clamp to `[lo, hi]`.
fn step_value(value: f64, direction: i32, lo: f64, hi: f64) -> f64 {
    (value + direction as f64 * SimBounds::STEP).clamp(lo, hi)
}

/// Toggle a metric, keeping `Metric::ALL` order. Refuses to remove the last one.
fn toggle_metric(selected: &mut Vec<Metric>, metric: Metric) -> bool {
    if selected.contains(&metric) {
        if selected.len() == 1 {
            return false;
        }
        selected.retain(|m| *m != metric);
    } else {
        selected.push(metric);
        selected.sort_by_key(|m| Metric::ALL.iter().position(|a| a == m));
    }
    true
}

fn legend_line(selected: &[Metric]) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, metric) in Metric::ALL.iter().enumerate() {
        let on = selected.contains(metric);
        let style = if on {
            Style::default().fg(metric_color(*metric)).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let mark = if on { "x" } else { " " };
        spans.push(Span::styled(format!("{}[{mark}] {}  ", i + 1, metric.column_name()), style));
    }
    Line::from(spans)
}

/// Leave a small margin so plotters' tick labels do not touch the border.
fn chart_area(inner: Rect) -> Rect {
    if inner.width <= 4 || inner.height <= 2 {
        return inner;
    }
    Rect {
        x: inner.x + 1,
        y: inner.y,
        width: inner.width - 2,
        height: inner.height - 1,
    }
}
