use super::{Color, Figure, PlotBackend, Series, Style};
use anyhow::Result;
use plotters::prelude::*;
use plotters::style::Color as _;
use std::path::{Path, PathBuf};

/// Renders figures to PNG files with plotters' bitmap backend.
pub struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    pub fn new(path: impl Into<PathBuf>, size: (u32, u32)) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        draw_png(&self.path, self.size, fig)
    }
}

fn rgb(color: Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

fn stroke(style: &Style) -> ShapeStyle {
    rgb(style.color).stroke_width(style.width.round().max(1.0) as u32)
}

pub fn draw_png(path: &Path, size: (u32, u32), fig: &Figure) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let (mut x_min, mut x_max, y_min, y_max) = fig.bounds().unwrap_or((0.0, 1.0, 0.0, 1.0));
    if x_max <= x_min {
        x_min -= 0.5;
        x_max += 0.5;
    }
    let y_top = if y_max > y_min { y_max * 1.1 } else { y_min + 1.0 };

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_top)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;

    let (_, plot_height) = chart.plotting_area().dim_in_pixel();
    let units_per_px = (y_top - y_min) / plot_height.max(1) as f64;

    for series in &fig.series {
        match series {
            Series::Bars(bars) => {
                let fill = rgb(bars.color).mix(bars.opacity).filled();
                chart.draw_series(
                    bars.bars
                        .iter()
                        .map(|b| Rectangle::new([(b[0], 0.0), (b[1], b[2])], fill)),
                )?;
            }
            Series::Line(line) => {
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    stroke(&line.style),
                ))?;
            }
            Series::Marker(marker) => {
                let style = stroke(&marker.style);
                let segments = match marker.style.dash {
                    Some([on, off]) => dash_spans(
                        y_min,
                        y_top,
                        on as f64 * units_per_px,
                        off as f64 * units_per_px,
                    ),
                    None => vec![(y_min, y_top)],
                };
                chart.draw_series(
                    segments
                        .into_iter()
                        .map(|(a, b)| PathElement::new(vec![(marker.x, a), (marker.x, b)], style)),
                )?;
                let font = ("sans-serif", 14).into_font().color(&rgb(marker.style.color));
                chart.draw_series(std::iter::once(Text::new(
                    marker.label.clone(),
                    (marker.x, y_top * 0.9),
                    font,
                )))?;
            }
        }
    }
    root.present()?;
    Ok(())
}

/// Split [from, to] into alternating drawn spans of length `on` separated by
/// gaps of length `off`.
fn dash_spans(from: f64, to: f64, on: f64, off: f64) -> Vec<(f64, f64)> {
    if on <= 0.0 || !(to > from) {
        return vec![(from, to)];
    }
    let mut spans = Vec::new();
    let mut start = from;
    while start < to {
        spans.push((start, (start + on).min(to)));
        start += on + off.max(0.0);
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_spans_cover_range_with_gaps() {
        let spans = dash_spans(0.0, 10.0, 2.0, 1.0);
        assert_eq!(spans.first(), Some(&(0.0, 2.0)));
        assert_eq!(spans[1], (3.0, 5.0));
        assert_eq!(spans.last(), Some(&(9.0, 10.0)));
    }

    #[test]
    fn solid_when_dash_is_degenerate() {
        assert_eq!(dash_spans(0.0, 1.0, 0.0, 1.0), vec![(0.0, 1.0)]);
    }
}
