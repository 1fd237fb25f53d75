pub mod png;

use crate::capability::{histogram_density, normal_pdf, CapabilityStats};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct Color(pub u32);

impl Color {
    pub const GREEN: Color = Color(0x4C_A0_4C);
    pub const BLACK: Color = Color(0x00_00_00);
    pub const RED: Color = Color(0xD6_27_28);
    pub const BLUE: Color = Color(0x1F_77_B4);

    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Bars given as `[start, end, height]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarSeries {
    pub name: String,
    pub bars: Vec<[f64; 3]>,
    pub color: Color,
    pub opacity: f64,
}

/// Vertical reference line with a label drawn near the top of the plot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    pub x: f64,
    pub label: String,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Bars(BarSeries),
    Marker(Marker),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Data bounds `(x_min, x_max, y_min, y_max)` over every series.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for series in &self.series {
            match series {
                Series::Line(line) => {
                    xs.extend(line.points.iter().map(|p| p[0]));
                    ys.extend(line.points.iter().map(|p| p[1]));
                }
                Series::Bars(bars) => {
                    for bar in &bars.bars {
                        xs.push(bar[0]);
                        xs.push(bar[1]);
                        ys.push(0.0);
                        ys.push(bar[2]);
                    }
                }
                Series::Marker(marker) => xs.push(marker.x),
            }
        }
        let finite = |v: &f64| v.is_finite();
        let x_min = xs.iter().copied().filter(finite).reduce(f64::min)?;
        let x_max = xs.iter().copied().filter(finite).reduce(f64::max)?;
        let y_min = ys.iter().copied().filter(finite).reduce(f64::min).unwrap_or(0.0);
        let y_max = ys.iter().copied().filter(finite).reduce(f64::max).unwrap_or(1.0);
        Some((x_min, x_max, y_min, y_max))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

const CURVE_POINTS: usize = 200;

fn dashed(color: Color) -> Style {
    Style {
        width: 1.0,
        dash: Some([6.0, 4.0]),
        color,
    }
}

/// Density histogram of `data` with the fitted normal curve and LSL, USL and
/// mean markers. The curve is omitted when the data has no spread.
pub fn figure_for_capability(
    test_point: &str,
    data: &[f64],
    stats: &CapabilityStats,
    bins: usize,
) -> Figure {
    let mut fig = Figure::new(Some(format!("{} - CPK: {:.2}", test_point, stats.cpk)));
    fig.x.label = Some("TestData".into());
    fig.y.label = Some("Density".into());

    let histogram = histogram_density(data, bins);
    let (mut lo, mut hi) = match (histogram.first(), histogram.last()) {
        (Some(first), Some(last)) => (first.start, last.end),
        _ => (stats.mean - 1.0, stats.mean + 1.0),
    };
    fig.add_series(Series::Bars(BarSeries {
        name: "TestData".into(),
        bars: histogram
            .iter()
            .map(|bin| [bin.start, bin.end, bin.density])
            .collect(),
        color: Color::GREEN,
        opacity: 0.6,
    }));

    for limit in [stats.lsl, stats.usl] {
        if limit.is_finite() {
            lo = lo.min(limit);
            hi = hi.max(limit);
        }
    }
    let pad = (hi - lo) * 0.05;
    lo -= pad;
    hi += pad;

    if stats.std_dev > 0.0 {
        let step = (hi - lo) / (CURVE_POINTS - 1) as f64;
        let points = (0..CURVE_POINTS)
            .map(|i| {
                let x = lo + i as f64 * step;
                [x, normal_pdf(x, stats.mean, stats.std_dev)]
            })
            .collect();
        fig.add_series(Series::Line(LineSeries {
            name: "Normal fit".into(),
            points,
            style: Style {
                width: 2.0,
                dash: None,
                color: Color::BLACK,
            },
        }));
    }

    fig.add_series(Series::Marker(Marker {
        x: stats.lsl,
        label: format!("LSL: {}", stats.lsl),
        style: dashed(Color::RED),
    }));
    fig.add_series(Series::Marker(Marker {
        x: stats.usl,
        label: format!("USL: {}", stats.usl),
        style: dashed(Color::RED),
    }));
    fig.add_series(Series::Marker(Marker {
        x: stats.mean,
        label: format!("Mean: {:.2}", stats.mean),
        style: dashed(Color::BLUE),
    }));
    fig
}
