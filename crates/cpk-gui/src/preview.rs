use cpk_lib::plot::{Color, Figure, Series, Style};
use eframe::egui;
use egui_plot::{Bar, BarChart, Legend, Line, LineStyle, Plot, PlotUi, VLine};

pub fn show_figure(ui: &mut egui::Ui, figure: &Figure) {
    if let Some(title) = &figure.title {
        ui.label(egui::RichText::new(title).strong());
    }
    Plot::new("cpk_preview")
        .legend(Legend::default())
        .height(360.0)
        .x_axis_label(figure.x.label.clone().unwrap_or_default())
        .y_axis_label(figure.y.label.clone().unwrap_or_default())
        .show(ui, |plot_ui| plot_figure(plot_ui, figure));
}

fn plot_figure(plot_ui: &mut PlotUi, figure: &Figure) {
    for series in &figure.series {
        match series {
            Series::Bars(bars) => {
                let chart = BarChart::new(
                    bars.bars
                        .iter()
                        .map(|b| Bar::new((b[0] + b[1]) / 2.0, b[2]).width(b[1] - b[0]))
                        .collect(),
                )
                .color(color_from(bars.color).gamma_multiply(bars.opacity as f32))
                .name(bars.name.clone());
                plot_ui.bar_chart(chart);
            }
            Series::Line(line) => {
                plot_ui.line(
                    Line::new(line.points.clone())
                        .stroke(stroke_from_style(&line.style))
                        .name(line.name.clone()),
                );
            }
            Series::Marker(marker) => {
                let mut vline = VLine::new(marker.x)
                    .stroke(stroke_from_style(&marker.style))
                    .name(marker.label.clone());
                if let Some([on, _]) = marker.style.dash {
                    vline = vline.style(LineStyle::Dashed { length: on });
                }
                plot_ui.vline(vline);
            }
        }
    }
}

fn stroke_from_style(style: &Style) -> egui::Stroke {
    egui::Stroke::new(style.width, color_from(style.color))
}

fn color_from(color: Color) -> egui::Color32 {
    let (r, g, b) = color.rgb();
    egui::Color32::from_rgb(r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_packed_rgb() {
        assert_eq!(
            color_from(Color(0x12_34_56)),
            egui::Color32::from_rgb(0x12, 0x34, 0x56)
        );
    }
}
