use cpk_lib::engine::TestPointResult;
use cpk_lib::PipelineSettings;
use eframe::{egui, egui::ViewportBuilder};
use log::{error, info};
use rfd::FileDialog;
use std::path::PathBuf;
use std::time::Duration;

mod jobs;
mod preview;

use jobs::{Job, JobMessage, Operation, Outcome};

const HELP_TEXT: &str = "\
Computes Cpk per test point from a production test-log CSV export so each test \
item can be reviewed one export at a time.

1) Browse: choose the CSV export of the test station to analyse.

2) Split CSV: splits the export into one file per unit test run and saves them in \
a split_files folder inside the directory you choose. Units whose result is fail \
get a _fail suffix. Delete those files before extraction if failed units should \
not take part in the Cpk calculation.

3) Generate config: writes config.csv into the chosen directory listing every test \
point with CalculateCPK = False. Set the points to analyse to True and save.

4) Extract test data: choose the split_files folder. The unit files are regrouped \
into one file per test point in a test_data folder next to it. Clear test_data \
before extracting the same files again, otherwise rows are duplicated.

5) Compute Cpk: choose the edited config.csv, then the test_data folder. Rows whose \
Result2 is not pass are ignored. Histogram plots with the fitted normal curve are \
saved to cpk_plots, per-point logs and low_cpk.csv to cpk_results.";

fn main() -> eframe::Result<()> {
    env_logger::init();
    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default().with_inner_size([820.0, 640.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Test-log Cpk Analyzer",
        native_options,
        Box::new(|_cc| Ok(Box::<CpkApp>::default())),
    )
}

#[derive(Copy, Clone, PartialEq)]
enum NoticeKind {
    Success,
    Warning,
    Error,
}

impl NoticeKind {
    fn title(&self) -> &'static str {
        match self {
            NoticeKind::Success => "Success",
            NoticeKind::Warning => "Warning",
            NoticeKind::Error => "Error",
        }
    }
}

struct Notice {
    kind: NoticeKind,
    body: String,
}

struct CpkApp {
    raw_path: Option<PathBuf>,
    settings: PipelineSettings,
    job: Option<Job>,
    progress: f32,
    notices: Vec<Notice>,
    show_help: bool,
    results: Vec<TestPointResult>,
    preview_index: usize,
    status: String,
}

impl Default for CpkApp {
    fn default() -> Self {
        Self {
            raw_path: None,
            settings: PipelineSettings::default(),
            job: None,
            progress: 0.0,
            notices: Vec::new(),
            show_help: false,
            results: Vec::new(),
            preview_index: 0,
            status: "No export selected".into(),
        }
    }
}

impl CpkApp {
    fn notify(&mut self, kind: NoticeKind, body: impl Into<String>) {
        self.notices.push(Notice {
            kind,
            body: body.into(),
        });
    }

    fn busy(&self) -> bool {
        self.job.is_some()
    }

    fn browse_raw(&mut self) {
        if let Some(path) = FileDialog::new()
            .add_filter("CSV", &["csv"])
            .set_title("Select the CSV export to analyse")
            .pick_file()
        {
            self.status = format!("Export: {}", path.display());
            self.raw_path = Some(path);
        }
    }

    fn load_settings(&mut self) {
        if let Some(path) = FileDialog::new()
            .add_filter("TOML", &["toml"])
            .set_title("Select analysis settings")
            .pick_file()
        {
            match PipelineSettings::load(&path) {
                Ok(settings) => {
                    self.settings = settings;
                    self.status = format!("Settings: {}", path.display());
                }
                Err(err) => self.notify(NoticeKind::Error, format!("Settings not loaded: {err}")),
            }
        }
    }

    fn require_raw(&mut self) -> Option<PathBuf> {
        if self.raw_path.is_none() {
            self.notify(NoticeKind::Error, "Select a CSV file first.");
        }
        self.raw_path.clone()
    }

    fn pick_folder(&mut self, title: &str, missing: &str) -> Option<PathBuf> {
        let picked = FileDialog::new().set_title(title).pick_folder();
        if picked.is_none() {
            self.notify(NoticeKind::Error, missing);
        }
        picked
    }

    fn start_split(&mut self) {
        let Some(input) = self.require_raw() else {
            return;
        };
        let Some(out_root) = self.pick_folder(
            "Choose where to save the split files",
            "Select an output directory.",
        ) else {
            return;
        };
        self.start(Operation::Split { input, out_root });
    }

    fn start_config(&mut self) {
        let Some(input) = self.require_raw() else {
            return;
        };
        let Some(out_dir) = self.pick_folder(
            "Choose where to save config.csv",
            "Select an output directory.",
        ) else {
            return;
        };
        self.start(Operation::Config { input, out_dir });
    }

    fn start_extract(&mut self) {
        let Some(split_dir) = self.pick_folder(
            "Choose the split files directory",
            "Select the directory holding the split files.",
        ) else {
            return;
        };
        self.start(Operation::Extract { split_dir });
    }

    fn start_cpk(&mut self) {
        let Some(selection) = FileDialog::new()
            .add_filter("CSV", &["csv"])
            .set_title("Select the config file")
            .pick_file()
        else {
            self.notify(NoticeKind::Error, "Select a config file.");
            return;
        };
        let Some(test_data_dir) = self.pick_folder(
            "Choose the test data directory",
            "Select a test data directory.",
        ) else {
            return;
        };
        self.start(Operation::Cpk {
            selection,
            test_data_dir,
        });
    }

    fn start(&mut self, op: Operation) {
        info!("starting {}", op.label());
        self.status = format!("{} running…", op.label());
        self.progress = 0.0;
        self.job = Some(Job::spawn(op, self.settings.clone()));
    }

    fn poll_job(&mut self, ctx: &egui::Context) {
        let Some(job) = self.job.as_mut() else {
            return;
        };
        let label = job.label;
        let mut finished = None;
        for message in job.poll() {
            match message {
                JobMessage::Progress(p) => self.progress = (p / 100.0) as f32,
                JobMessage::Finished(outcome) => finished = Some(outcome),
            }
        }
        match finished {
            Some(Ok(outcome)) => {
                self.job = None;
                self.progress = 0.0;
                self.status = format!("{label} finished");
                let warnings = outcome.warnings();
                if !warnings.is_empty() {
                    self.notify(NoticeKind::Warning, warnings.join("\n"));
                }
                self.notify(NoticeKind::Success, outcome.summary());
                if let Outcome::Cpk(report) = outcome {
                    self.results = report.results;
                    self.preview_index = 0;
                }
            }
            Some(Err(err)) => {
                error!("{label} failed: {err}");
                self.job = None;
                self.progress = 0.0;
                self.status = format!("{label} failed");
                self.notify(NoticeKind::Error, err.to_string());
            }
            None => ctx.request_repaint_after(Duration::from_millis(50)),
        }
    }

    fn show_notices(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.notices.first() else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new(notice.kind.title())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .max_height(240.0)
                    .show(ui, |ui| ui.label(&notice.body));
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.notices.remove(0);
        }
    }

    fn show_help(&mut self, ctx: &egui::Context) {
        egui::Window::new("Help")
            .open(&mut self.show_help)
            .collapsible(false)
            .default_width(560.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| ui.label(HELP_TEXT));
            });
    }

    fn show_controls(&mut self, ui: &mut egui::Ui) {
        let enabled = !self.busy() && self.notices.is_empty();
        ui.horizontal(|ui| {
            ui.label("CSV export:");
            let shown = self
                .raw_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            ui.add(egui::TextEdit::singleline(&mut shown.as_str()).desired_width(420.0));
            if ui
                .add_enabled(enabled, egui::Button::new("Browse"))
                .clicked()
            {
                self.browse_raw();
            }
        });
        ui.add_space(8.0);
        ui.vertical_centered(|ui| {
            let size = [200.0, 28.0];
            if ui
                .add_enabled(enabled, egui::Button::new("Split CSV").min_size(size.into()))
                .clicked()
            {
                self.start_split();
            }
            if ui
                .add_enabled(enabled, egui::Button::new("Generate config").min_size(size.into()))
                .clicked()
            {
                self.start_config();
            }
            if ui
                .add_enabled(enabled, egui::Button::new("Extract test data").min_size(size.into()))
                .clicked()
            {
                self.start_extract();
            }
            if ui
                .add_enabled(enabled, egui::Button::new("Compute Cpk").min_size(size.into()))
                .clicked()
            {
                self.start_cpk();
            }
        });
        ui.add_space(8.0);
        ui.add(egui::ProgressBar::new(self.progress).show_percentage());
    }

    fn show_preview(&mut self, ui: &mut egui::Ui) {
        if self.results.is_empty() {
            return;
        }
        ui.separator();
        ui.heading("Cpk results");
        let current = self
            .results
            .get(self.preview_index)
            .map(|r| r.test_point.clone())
            .unwrap_or_default();
        egui::ComboBox::from_label("Test point")
            .selected_text(current)
            .show_ui(ui, |ui| {
                for (i, result) in self.results.iter().enumerate() {
                    let text = format!("{} ({:.2})", result.test_point, result.stats.cpk);
                    ui.selectable_value(&mut self.preview_index, i, text);
                }
            });
        if let Some(result) = self.results.get(self.preview_index) {
            ui.label(format!(
                "n = {}  mean = {:.4}  σ = {:.4}  LSL = {}  USL = {}  classification: {:?}",
                result.stats.n,
                result.stats.mean,
                result.stats.std_dev,
                result.stats.lsl,
                result.stats.usl,
                result.classification
            ));
            preview::show_figure(ui, &result.figure);
        }
    }
}

impl eframe::App for CpkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_job(ctx);

        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui
                        .add_enabled(!self.busy(), egui::Button::new("Load settings…"))
                        .clicked()
                    {
                        ui.close_menu();
                        self.load_settings();
                    }
                });
                ui.menu_button("Help", |ui| {
                    if ui.button("Help").clicked() {
                        ui.close_menu();
                        self.show_help = true;
                    }
                });
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(format!("Status: {}", self.status));
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.show_controls(ui);
                self.show_preview(ui);
            });
        });

        self.show_help(ctx);
        self.show_notices(ctx);
    }
}
