//! Plotters-powered forecast chart widget for Ratatui.
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// How a series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStyle {
    /// Simulated values, joined by a line.
    Line,
    /// Observed values, one dot per day.
    Dots,
}

#[derive(Debug, Clone)]
pub struct ChartSeries {
    pub label: &'static str,
    pub color: RGBColor,
    pub style: SeriesStyle,
    pub points: Vec<(f64, f64)>,
}

/// A render-only chart description; series and bounds are computed outside
/// the render call.
pub struct ForecastChart<'a> {
    pub series: &'a [ChartSeries],
    /// X bounds (day index from the first forecast day).
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    /// Day index of the last observation, drawn as a vertical marker.
    pub split_x: Option<f64>,
}

impl<'a> Widget for ForecastChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters may fail to build a chart in a tiny area.
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
                .build_cartesian_2d(x0..x1, y0..y1)?;

            // Tick labels are drawn by the caller in terminal cells; Plotters only
            // draws the axes.
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .axis_style(&WHITE)
                .draw()?;

            if let Some(split) = self.split_x {
                let gray = RGBColor(110, 110, 110);
                chart.draw_series(LineSeries::new([(split, y0), (split, y1)], &gray))?;
            }

            for s in self.series.iter().filter(|s| s.style == SeriesStyle::Line) {
                chart.draw_series(LineSeries::new(s.points.iter().copied(), &s.color))?;
            }

            // `Circle` radii are mis-scaled by the backend; a colored `Pixel`
            // renders as a clean dot.
            for s in self.series.iter().filter(|s| s.style == SeriesStyle::Dots) {
                let color = s.color;
                chart.draw_series(s.points.iter().map(move |&(x, y)| Pixel::new((x, y), color)))?;
            }

            Ok(())
        });

        widget.render(area, buf);
    }
}
