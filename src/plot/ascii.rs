//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! The x axis is the forecast day index; observed values are drawn as point
//! markers over the simulated lines.

use crate::forecast::Forecast;

/// One plotted series.
struct Series {
    label: &'static str,
    glyph: char,
    /// Joined with a line (simulated) or drawn as markers (observed).
    joined: bool,
    points: Vec<(f64, f64)>,
}

/// Observed cumulative cases (`o`) against the modeled cases (`-`).
pub fn render_cases_plot(forecast: &Forecast, width: usize, height: usize) -> String {
    let series = [
        Series {
            label: "forecast",
            glyph: '-',
            joined: true,
            points: column(forecast, |r| Some(r.forecast)),
        },
        Series {
            label: "cases",
            glyph: 'o',
            joined: false,
            points: column(forecast, |r| r.cases),
        },
    ];
    render_plot(forecast, &series, width, height)
}

/// Simulated compartments (`s`, `i`, `r` lines) against the observed-derived ones (`S`, `I`, `R`).
pub fn render_sir_plot(forecast: &Forecast, width: usize, height: usize) -> String {
    let series = [
        Series {
            label: "S sim",
            glyph: 's',
            joined: true,
            points: column(forecast, |r| Some(r.susceptible)),
        },
        Series {
            label: "I sim",
            glyph: 'i',
            joined: true,
            points: column(forecast, |r| Some(r.infected)),
        },
        Series {
            label: "R sim",
            glyph: 'r',
            joined: true,
            points: column(forecast, |r| Some(r.removed)),
        },
        Series {
            label: "S obs",
            glyph: 'S',
            joined: false,
            points: column(forecast, |r| r.observed_susceptible),
        },
        Series {
            label: "I obs",
            glyph: 'I',
            joined: false,
            points: column(forecast, |r| r.observed_infected),
        },
        Series {
            label: "R obs",
            glyph: 'R',
            joined: false,
            points: column(forecast, |r| r.observed_removed),
        },
    ];
    render_plot(forecast, &series, width, height)
}

fn column(
    forecast: &Forecast,
    value: impl Fn(&crate::forecast::ForecastRow) -> Option<f64>,
) -> Vec<(f64, f64)> {
    forecast
        .rows
        .iter()
        .enumerate()
        .filter_map(|(k, row)| value(row).filter(|v| v.is_finite()).map(|v| (k as f64, v)))
        .collect()
}

fn render_plot(forecast: &Forecast, series: &[Series], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let x_max = (forecast.len().max(2) - 1) as f64;
    let (y_min, y_max) = y_range(series).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Lines first so observed markers overlay them.
    for s in series.iter().filter(|s| s.joined) {
        draw_curve(&mut grid, &s.points, x_max, y_min, y_max, s.glyph);
    }
    for s in series.iter().filter(|s| !s.joined) {
        for &(x, y) in &s.points {
            let col = map_x(x, 0.0, x_max, width);
            let row = map_y(y, y_min, y_max, height);
            grid[row][col] = s.glyph;
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {} .. {} ({} days, {} observed) | y=[{y_min:.1}, {y_max:.1}]\n",
        forecast.start_date,
        forecast.end_date(),
        forecast.len(),
        forecast.observed_days,
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    let legend: Vec<String> = series
        .iter()
        .map(|s| format!("{} {}", s.glyph, s.label))
        .collect();
    out.push_str(&legend.join("  "));
    out.push('\n');
    out
}

fn y_range(series: &[Series]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in series.iter().flat_map(|s| s.points.iter()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_max: f64, y_min: f64, y_max: f64, ch: char) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        let col = map_x(x, 0.0, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, ch),
            None => grid[row][col] = ch,
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish); never overwrites an occupied cell.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastRow;
    use chrono::{Duration, NaiveDate};

    fn tiny() -> Forecast {
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let rows = (0..3)
            .map(|k| {
                let v = 5.0 * k as f64;
                let observed = k < 2;
                ForecastRow {
                    date: start + Duration::days(k),
                    susceptible: 10.0 - v,
                    infected: v / 2.0,
                    removed: v / 2.0,
                    observed_susceptible: observed.then_some(10.0 - v),
                    observed_infected: observed.then_some(v / 2.0),
                    observed_removed: observed.then_some(v / 2.0),
                    cases: observed.then_some(v),
                    forecast: v,
                }
            })
            .collect();
        Forecast {
            start_date: start,
            delay: 0,
            observed_days: 2,
            horizon_days: 1,
            rows,
        }
    }

    #[test]
    fn cases_plot_places_markers_over_the_line() {
        let txt = render_cases_plot(&tiny(), 10, 5);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(
            lines[0],
            "Plot: 2020-03-01 .. 2020-03-03 (3 days, 2 observed) | y=[-0.5, 10.5]"
        );
        let grid: Vec<Vec<char>> = lines[1..6].iter().map(|l| l.chars().collect()).collect();
        // Observed days 0 and 1; the forecast line reaches the top-right corner.
        assert_eq!(grid[4][0], 'o');
        assert_eq!(grid[2][5], 'o');
        assert_eq!(grid[0][9], '-');
        assert_eq!(lines[6], "- forecast  o cases");
    }

    #[test]
    fn sir_plot_lists_every_series() {
        let txt = render_sir_plot(&tiny(), 20, 8);
        assert_eq!(txt.lines().count(), 1 + 8 + 1);
        let legend = txt.lines().last().unwrap();
        for label in ["s S sim", "i I sim", "r R sim", "S S obs", "I I obs", "R R obs"] {
            assert!(legend.contains(label), "{legend}");
        }
    }

    #[test]
    fn flat_series_still_render() {
        let mut f = tiny();
        for row in &mut f.rows {
            row.forecast = 3.0;
            row.cases = row.cases.map(|_| 3.0);
        }
        let txt = render_cases_plot(&f, 12, 6);
        assert!(txt.lines().nth(1).is_some());
        assert_eq!(txt.lines().count(), 1 + 6 + 1);
    }
}
