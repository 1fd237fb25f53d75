use crate::capability::{capability, CapabilityFailure, CapabilityStats, Classification};
use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result};
use crate::io::table::{read_table, require_dir, require_file, write_table, Table};
use crate::layout::{dataset_file_name, file_stem_for, Layout, LOW_CPK_FILE};
use crate::plot::png::PngBackend;
use crate::plot::{figure_for_capability, Figure, PlotBackend};
use crate::progress::{Progress, ProgressCounter};
use crate::selection::read_selection;
use csv::StringRecord;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Inputs and output directories of one Cpk run.
#[derive(Debug, Clone)]
pub struct CpkPaths {
    pub selection: PathBuf,
    pub test_data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub plots_dir: PathBuf,
}

impl CpkPaths {
    /// Results and plots go next to the test data directory.
    pub fn new(selection: impl Into<PathBuf>, test_data_dir: impl Into<PathBuf>) -> Self {
        let test_data_dir = test_data_dir.into();
        let layout = Layout::beside(&test_data_dir);
        Self {
            selection: selection.into(),
            results_dir: layout.results_dir(),
            plots_dir: layout.plots_dir(),
            test_data_dir,
        }
    }

    pub fn with_output_root(mut self, root: &Path) -> Self {
        let layout = Layout::new(root);
        self.results_dir = layout.results_dir();
        self.plots_dir = layout.plots_dir();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestPointResult {
    pub test_point: String,
    #[serde(flatten)]
    pub stats: CapabilityStats,
    pub classification: Classification,
    /// `None` when the plot could not be rendered.
    pub plot_path: Option<PathBuf>,
    pub log_path: PathBuf,
    #[serde(skip)]
    pub figure: Figure,
}

#[derive(Debug, Clone, Serialize)]
pub struct LowCpk {
    pub test_point: String,
    pub cpk: f64,
}

#[derive(Debug, Default, Serialize)]
pub struct CpkReport {
    pub selected: usize,
    pub results: Vec<TestPointResult>,
    pub low: Vec<LowCpk>,
    pub low_cpk_path: Option<PathBuf>,
    #[serde(serialize_with = "crate::report::serialize_warnings")]
    pub warnings: Vec<PipelineError>,
}

/// Compute Cpk for every test point switched on in the selection config.
///
/// Test points without a readable dataset, without passing rows, with
/// malformed numbers, or with zero spread outside their limits are skipped and
/// reported as warnings. A plot that fails to render is reported the same way
/// but does not drop the test point's result. `low_cpk.csv` is written only
/// when some test point falls below the capability threshold.
pub fn compute_cpk(
    paths: &CpkPaths,
    settings: &PipelineSettings,
    progress: &mut dyn Progress,
) -> Result<CpkReport> {
    require_file(&paths.selection, "selection config")?;
    require_dir(&paths.test_data_dir, "test data directory")?;
    settings.validate()?;
    let selected: Vec<String> = read_selection(&paths.selection)?
        .into_iter()
        .filter(|entry| entry.include)
        .map(|entry| entry.test_point)
        .collect();
    fs::create_dir_all(&paths.results_dir)?;
    fs::create_dir_all(&paths.plots_dir)?;
    info!(
        "computing Cpk for {} selected test point(s) from {}",
        selected.len(),
        paths.test_data_dir.display()
    );

    let mut report = CpkReport {
        selected: selected.len(),
        ..Default::default()
    };
    let mut owners: HashMap<String, &str> = HashMap::new();
    let mut counter = ProgressCounter::new(progress, selected.len());
    for test_point in &selected {
        let file_name = dataset_file_name(test_point);
        let owner = *owners.entry(file_name.clone()).or_insert(test_point);
        let outcome = if owner == test_point.as_str() {
            evaluate_test_point(test_point, paths, settings)
        } else {
            Err(PipelineError::NameCollision {
                test_point: test_point.clone(),
                owner: owner.to_string(),
                file: file_name,
            })
        };
        match outcome {
            Ok((result, plot_error)) => {
                if let Some(err) = plot_error {
                    warn!("{}", err);
                    report.warnings.push(err);
                }
                info!(
                    "{}: n={} mean={:.4} sd={:.4} cpk={:.2} ({:?})",
                    result.test_point,
                    result.stats.n,
                    result.stats.mean,
                    result.stats.std_dev,
                    result.stats.cpk,
                    result.classification
                );
                if result.classification == Classification::Low {
                    report.low.push(LowCpk {
                        test_point: result.test_point.clone(),
                        cpk: result.stats.cpk,
                    });
                }
                report.results.push(result);
            }
            Err(err) if err.is_skip() => {
                warn!("{}", err);
                report.warnings.push(err);
            }
            Err(err) => return Err(err),
        }
        counter.step();
    }

    if !report.low.is_empty() {
        let low_path = paths.results_dir.join(LOW_CPK_FILE);
        write_low_cpk(&low_path, &report.low)?;
        report.low_cpk_path = Some(low_path);
    }
    info!(
        "Cpk finished: {} computed, {} low, {} skipped",
        report.results.len(),
        report.low.len(),
        report.warnings.len()
    );
    Ok(report)
}

fn evaluate_test_point(
    test_point: &str,
    paths: &CpkPaths,
    settings: &PipelineSettings,
) -> Result<(TestPointResult, Option<PipelineError>)> {
    let dataset = paths.test_data_dir.join(dataset_file_name(test_point));
    if !dataset.is_file() {
        return Err(PipelineError::MissingDataset {
            test_point: test_point.to_string(),
            path: dataset,
        });
    }
    let malformed = |err: PipelineError| PipelineError::MalformedDataset {
        test_point: test_point.to_string(),
        reason: err.to_string(),
    };
    let table = read_table(&dataset).map_err(malformed)?;
    let passing = passing_rows(&table, settings).map_err(malformed)?;
    if passing.is_empty() {
        return Err(PipelineError::EmptySelection(test_point.to_string()));
    }

    let c = &settings.columns;
    let data_idx = table.column(&c.test_data).map_err(malformed)?;
    let low_idx = table.column(&c.limit_low).map_err(malformed)?;
    let high_idx = table.column(&c.limit_high).map_err(malformed)?;
    let mut data = Vec::with_capacity(passing.len());
    for (i, row) in passing.iter().enumerate() {
        data.push(parse_number(test_point, i, &c.test_data, row, data_idx)?);
    }
    // Limits are taken from the first passing row.
    let lsl = parse_number(test_point, 0, &c.limit_low, passing[0], low_idx)?;
    let usl = parse_number(test_point, 0, &c.limit_high, passing[0], high_idx)?;

    let stats = capability(&data, lsl, usl).map_err(|failure| match failure {
        CapabilityFailure::NoData => PipelineError::EmptySelection(test_point.to_string()),
        CapabilityFailure::ZeroSpreadOutOfLimits { mean } => PipelineError::ZeroSpread {
            test_point: test_point.to_string(),
            mean,
            lsl,
            usl,
        },
    })?;
    let classification = Classification::from_cpk(stats.cpk, settings.capability_threshold);

    let stem = file_stem_for(test_point);
    let figure = figure_for_capability(test_point, &data, &stats, settings.histogram_bins);
    let plot_path = paths.plots_dir.join(format!("{}_cpk.png", stem));
    let (plot_path, plot_error) =
        match PngBackend::new(&plot_path, (settings.plot_width, settings.plot_height))
            .draw(&figure)
        {
            Ok(()) => (Some(plot_path), None),
            Err(e) => (
                None,
                Some(PipelineError::Plot(format!("{}: {}", plot_path.display(), e))),
            ),
        };

    let log_path = paths.results_dir.join(format!("{}_cpk.log", stem));
    write_row_log(&log_path, &table.headers, &passing)?;

    let result = TestPointResult {
        test_point: test_point.to_string(),
        stats,
        classification,
        plot_path,
        log_path,
        figure,
    };
    Ok((result, plot_error))
}

/// Rows whose secondary result is "pass", compared case-insensitively.
fn passing_rows<'t>(table: &'t Table, settings: &PipelineSettings) -> Result<Vec<&'t StringRecord>> {
    let idx = table.column(&settings.columns.secondary_result)?;
    Ok(table
        .rows
        .iter()
        .filter(|row| {
            row.get(idx)
                .map(|v| v.trim().eq_ignore_ascii_case("pass"))
                .unwrap_or(false)
        })
        .collect())
}

fn parse_number(
    test_point: &str,
    row: usize,
    column: &str,
    record: &StringRecord,
    idx: usize,
) -> Result<f64> {
    let raw = record.get(idx).unwrap_or_default();
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PipelineError::InvalidValue {
            context: format!("test point {} passing row {}", test_point, row + 1),
            column: column.to_string(),
            value: raw.to_string(),
        })
}

/// One JSON object per row, keyed by column name.
fn write_row_log(path: &Path, headers: &StringRecord, rows: &[&StringRecord]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in rows {
        let object: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::to_writer(&mut out, &object)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn write_low_cpk(path: &Path, low: &[LowCpk]) -> Result<()> {
    let headers = StringRecord::from(vec!["TestPoint", "CPK"]);
    let rows: Vec<StringRecord> = low
        .iter()
        .map(|entry| StringRecord::from(vec![entry.test_point.clone(), entry.cpk.to_string()]))
        .collect();
    write_table(path, &headers, &rows)?;
    Ok(())
}
