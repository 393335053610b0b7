//! Ratatui-based terminal UI.
//!
//! The TUI fits once (same pipeline as `sirfit fit`), then lets the user flip
//! between the cases and SIR views and stretch the forecast horizon without
//! refitting.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Duration as Days, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use plotters::style::RGBColor;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};
use tracing::info;

use crate::app::pipeline::{self, RunOutput};
use crate::cli::{FitArgs, PlotView};
use crate::error::AppError;
use crate::forecast::{Forecast, ForecastRow};

mod plotters_chart;

use plotters_chart::{ChartSeries, ForecastChart, SeriesStyle};

/// Days added or removed per `+`/`-` key press.
const HORIZON_STEP: usize = 10;

/// Fit, then start the TUI.
///
/// The fit runs before the terminal is switched to raw mode so that load and
/// calibration errors are reported like in `sirfit fit`.
pub fn run(args: FitArgs) -> Result<(), AppError> {
    let settings = crate::app::settings_from_args(&args.model);
    let source = crate::app::source_from_args(&args.source);
    let run = pipeline::run_fit(&source, &crate::app::column_map(&args.source), &settings)?;

    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(2, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(run, args.output.view, args.output.export_fit);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(2, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(2, format!("Failed to enter alternate screen: {e}")));
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

struct App {
    run: RunOutput,
    view: PlotView,
    export_fit: Option<PathBuf>,
    status: String,
}

impl App {
    fn new(run: RunOutput, view: PlotView, export_fit: Option<PathBuf>) -> Self {
        let status = format!(
            "Fitted {} delay candidates; best delay {} days.",
            run.search.candidates.len(),
            run.search.best.delay
        );
        Self {
            run,
            view,
            export_fit,
            status,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(2, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(2, format!("Event poll error: {e}")))? {
                continue;
            }

            match event::read().map_err(|e| AppError::new(2, format!("Event read error: {e}")))? {
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

    /// Returns `true` when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('v') | KeyCode::Tab => {
                self.view = self.view.toggled();
                self.status = format!("view: {}", self.view.title());
            }
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Right => {
                let horizon = self.run.config.horizon_days.saturating_add(HORIZON_STEP);
                self.set_horizon(horizon);
            }
            KeyCode::Char('-') | KeyCode::Left => {
                let horizon = self.run.config.horizon_days.saturating_sub(HORIZON_STEP);
                self.set_horizon(horizon);
            }
            KeyCode::Char('e') => self.export(),
            _ => {}
        }
        false
    }

    fn set_horizon(&mut self, horizon: usize) {
        if horizon == self.run.config.horizon_days {
            return;
        }
        self.status = match self.run.reforecast(horizon) {
            Ok(()) => format!("horizon: {horizon} days"),
            Err(err) => format!("Forecast failed: {err}"),
        };
    }

    fn export(&mut self) {
        let Some(path) = &self.export_fit else {
            self.status = "No --export-fit path given.".to_string();
            return;
        };
        self.status = match crate::io::write_fit_json(path, &self.run.fit_file()) {
            Ok(()) => {
                info!(path = %path.display(), "wrote fit JSON");
                format!("Wrote {}", path.display())
            }
            Err(err) => format!("Export failed: {err}"),
        };
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let run = &self.run;
        let best = &run.search.best;
        let gray = Style::default().fg(Color::Gray);

        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("sirfit", Style::default().fg(Color::Cyan)),
            Span::raw(format!(" - {} | {}", run.config.model.display_name(), run.source)),
        ]));

        let delta = best
            .params
            .delta
            .map(|d| format!(" delta={d:.4}"))
            .unwrap_or_default();
        lines.push(Line::from(Span::styled(
            format!(
                "N={:.0} beta={:.4} gamma={:.4}{delta} R0={:.2} | delay {} days | loss {:.3e}",
                best.params.population,
                best.params.beta,
                best.params.gamma,
                best.params.r0(),
                best.delay,
                best.loss,
            ),
            gray,
        )));

        let peak = run
            .forecast
            .peak_infected()
            .map(|row| format!(" | peak infected {:.0} on {}", row.infected, row.date))
            .unwrap_or_default();
        lines.push(Line::from(Span::styled(
            format!(
                "observed {} days {} .. {} | horizon {} days{peak}",
                run.observed.len(),
                run.observed.start_date(),
                run.observed.end_date(),
                run.forecast.horizon_days,
            ),
            gray,
        )));

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(9)])
            .split(area);

        self.draw_chart(frame, chunks[0]);
        self.draw_candidates(frame, chunks[1]);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title(self.view.title()).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let data = chart_series(&self.run.forecast, self.view);
        let (chart_rect, insets) = chart_layout(inner);
        let widget = ForecastChart {
            series: &data.series,
            x_bounds: data.x_bounds,
            y_bounds: data.y_bounds,
            split_x: data.split_x,
        };
        frame.render_widget(widget, chart_rect);

        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, &data);
        }
    }

    fn draw_candidates(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let search = &self.run.search;
        let table = crate::report::format_delay_table(&search.candidates, search.best.delay);
        let items: Vec<ListItem> = table.lines().map(|l| ListItem::new(l.to_string())).collect();

        let list = List::new(items)
            .block(Block::default().title("Delay candidates").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White));

        // Row 0 is the table header.
        let best_row = search
            .candidates
            .iter()
            .position(|c| c.delay == search.best.delay)
            .map(|i| i + 1);
        let mut state = ListState::default();
        state.select(best_row);
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "v view  +/- horizon  e export fit  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Everything the chart needs, prepared outside the render call.
struct ChartData {
    series: Vec<ChartSeries>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
    split_x: Option<f64>,
    start_date: NaiveDate,
    y_label: &'static str,
}

const CYAN: RGBColor = RGBColor(0, 255, 255);
const GREEN: RGBColor = RGBColor(0, 255, 0);
const RED: RGBColor = RGBColor(255, 80, 80);
const BLUE: RGBColor = RGBColor(100, 150, 255);
const WHITE: RGBColor = RGBColor(255, 255, 255);

fn chart_series(forecast: &Forecast, view: PlotView) -> ChartData {
    let series = match view {
        PlotView::Cases => vec![
            column_series(forecast, "forecast", CYAN, SeriesStyle::Line, |r| Some(r.forecast)),
            column_series(forecast, "cases", WHITE, SeriesStyle::Dots, |r| r.cases),
        ],
        PlotView::Sir => vec![
            column_series(forecast, "S", BLUE, SeriesStyle::Line, |r| Some(r.susceptible)),
            column_series(forecast, "I", RED, SeriesStyle::Line, |r| Some(r.infected)),
            column_series(forecast, "R", GREEN, SeriesStyle::Line, |r| Some(r.removed)),
            column_series(forecast, "S obs", BLUE, SeriesStyle::Dots, |r| r.observed_susceptible),
            column_series(forecast, "I obs", RED, SeriesStyle::Dots, |r| r.observed_infected),
            column_series(forecast, "R obs", GREEN, SeriesStyle::Dots, |r| r.observed_removed),
        ],
    };

    let x_max = (forecast.len().max(2) - 1) as f64;

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(_, y) in series.iter().flat_map(|s| s.points.iter()) {
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if !y_min.is_finite() || !y_max.is_finite() || y_max <= y_min {
        y_min = 0.0;
        y_max = 1.0;
    }
    let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);

    let split_x = (forecast.observed_days > 0 && forecast.horizon_days > 0)
        .then(|| (forecast.observed_days - 1) as f64);

    ChartData {
        series,
        x_bounds: [0.0, x_max],
        y_bounds: [y_min - pad, y_max + pad],
        split_x,
        start_date: forecast.start_date,
        y_label: match view {
            PlotView::Cases => "cases",
            PlotView::Sir => "people",
        },
    }
}

fn column_series(
    forecast: &Forecast,
    label: &'static str,
    color: RGBColor,
    style: SeriesStyle,
    value: impl Fn(&ForecastRow) -> Option<f64>,
) -> ChartSeries {
    let points = forecast
        .rows
        .iter()
        .enumerate()
        .filter_map(|(k, row)| value(row).filter(|v| v.is_finite()).map(|v| (k as f64, v)))
        .collect();
    ChartSeries {
        label,
        color,
        style,
        points,
    }
}

/// Compact count labels for the y axis.
fn fmt_count(v: f64) -> String {
    let abs = v.abs();
    if abs >= 1e6 {
        format!("{:.1}M", v / 1e6)
    } else if abs >= 1e4 {
        format!("{:.0}k", v / 1e3)
    } else {
        format!("{v:.0}")
    }
}

fn fmt_day(start: NaiveDate, x: f64) -> String {
    (start + Days::days(x.round() as i64)).format("%m-%d").to_string()
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10
        || inner.height <= insets.top + insets.bottom + 5
    {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    data: &ChartData,
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);
    let [x0, x1] = data.x_bounds;
    let [y0, y1] = data.y_bounds;

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_day(data.start_date, x0 + u * (x1 - x0));
        let label_len = label.len() as u16;
        let start = x.saturating_sub(label_len / 2);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_count(y0 + u * (y1 - y0));
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label_len);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let legend: Vec<Span> = data
        .series
        .iter()
        .flat_map(|s| {
            let glyph = match s.style {
                SeriesStyle::Line => "── ",
                SeriesStyle::Dots => "• ",
            };
            let RGBColor(r, g, b) = s.color;
            [
                Span::styled(glyph, Style::default().fg(Color::Rgb(r, g, b))),
                Span::styled(format!("{}   ", s.label), Style::default().fg(Color::Gray)),
            ]
        })
        .collect();
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(Paragraph::new(Line::from(legend)).alignment(Alignment::Center), x_rect);
    }

    let y_label = Paragraph::new(data.y_label)
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}
