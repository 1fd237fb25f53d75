use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result};
use crate::io::table::{append_rows, read_table, require_dir, require_path, Table};
use crate::layout::dataset_file_name;
use crate::progress::{Progress, ProgressCounter};
use csv::StringRecord;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize)]
pub struct ExtractReport {
    pub source_files: usize,
    /// Rows appended per test point during this run.
    pub rows_appended: BTreeMap<String, usize>,
    /// Datasets that did not exist before this run.
    pub datasets_created: usize,
    #[serde(serialize_with = "crate::report::serialize_warnings")]
    pub warnings: Vec<PipelineError>,
}

/// Column projection shared by every test point dataset, in output order.
pub fn projection_headers(settings: &PipelineSettings) -> StringRecord {
    let c = &settings.columns;
    StringRecord::from(vec![
        c.sequence.as_str(),
        c.serial.as_str(),
        c.limit_low.as_str(),
        c.limit_high.as_str(),
        c.test_data.as_str(),
        c.secondary_result.as_str(),
    ])
}

/// Append the rows of every unit file below `split_dir` to
/// `<TestPointId>.csv` datasets in `out_dir`.
///
/// Datasets are only ever appended to. Running twice over the same unit files
/// without clearing `out_dir` duplicates every row. A test point whose file
/// name collides with another test point's after sanitising is skipped with a
/// warning.
pub fn extract_test_points(
    split_dir: &Path,
    out_dir: &Path,
    settings: &PipelineSettings,
    progress: &mut dyn Progress,
) -> Result<ExtractReport> {
    require_dir(split_dir, "split directory")?;
    require_path(out_dir, "output directory")?;
    fs::create_dir_all(out_dir)?;

    let mut sources = Vec::new();
    collect_csv_files(split_dir, out_dir, &mut sources)?;
    sources.sort();
    info!(
        "extracting test points from {} file(s) in {} into {}",
        sources.len(),
        split_dir.display(),
        out_dir.display()
    );

    let headers = projection_headers(settings);
    let mut report = ExtractReport {
        source_files: sources.len(),
        ..Default::default()
    };
    // Dataset file name -> the test point whose rows it holds in this run.
    let mut owners: HashMap<String, String> = HashMap::new();
    let mut collided: HashSet<String> = HashSet::new();
    let mut counter = ProgressCounter::new(progress, sources.len());
    for source in &sources {
        let table = read_table(source)?;
        match project_by_test_point(&table, settings) {
            Ok(groups) => {
                for (test_point, rows) in groups {
                    let file_name = dataset_file_name(&test_point);
                    let owner = owners
                        .entry(file_name.clone())
                        .or_insert_with(|| test_point.clone());
                    if *owner != test_point {
                        if collided.insert(test_point.clone()) {
                            let err = PipelineError::NameCollision {
                                test_point,
                                owner: owner.clone(),
                                file: file_name,
                            };
                            warn!("skipping: {}", err);
                            report.warnings.push(err);
                        }
                        continue;
                    }
                    let path = out_dir.join(&file_name);
                    if append_rows(&path, &headers, &rows)? {
                        report.datasets_created += 1;
                    }
                    debug!(
                        "appended {} row(s) for {} from {}",
                        rows.len(),
                        test_point,
                        source.display()
                    );
                    *report.rows_appended.entry(test_point).or_default() += rows.len();
                }
            }
            Err(err) => {
                warn!("skipping {}: {}", source.display(), err);
                report.warnings.push(err);
            }
        }
        counter.step();
    }
    info!(
        "extraction finished: {} test point(s), {} new dataset(s)",
        report.rows_appended.len(),
        report.datasets_created
    );
    Ok(report)
}

/// Projected rows of `table` grouped by test point, groups in first-seen order.
fn project_by_test_point(
    table: &Table,
    settings: &PipelineSettings,
) -> Result<Vec<(String, Vec<StringRecord>)>> {
    let c = &settings.columns;
    let tp_idx = table.column(&c.test_point)?;
    let projection = [
        table.column(&c.sequence)?,
        table.column(&c.serial)?,
        table.column(&c.limit_low)?,
        table.column(&c.limit_high)?,
        table.column(&c.test_data)?,
        table.column(&c.secondary_result)?,
    ];

    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<StringRecord>)> = Vec::new();
    for row in &table.rows {
        let test_point = row.get(tp_idx).unwrap_or_default().to_string();
        let projected: StringRecord = projection
            .iter()
            .map(|&idx| row.get(idx).unwrap_or_default())
            .collect();
        match slots.get(&test_point) {
            Some(&slot) => groups[slot].1.push(projected),
            None => {
                slots.insert(test_point.clone(), groups.len());
                groups.push((test_point, vec![projected]));
            }
        }
    }
    Ok(groups)
}

fn collect_csv_files(dir: &Path, skip: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path == skip {
            continue;
        }
        if path.is_dir() {
            collect_csv_files(&path, skip, out)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use tempfile::tempdir;

    const HEADER: &str = "SeqNO,PrdSN,result,TestPointNumber,LimitLow,LimitHigh,TestData,Result2\n";

    fn unit_files(dir: &Path) -> PathBuf {
        let split = dir.join("split_files");
        fs::create_dir_all(split.join("line2")).unwrap();
        fs::write(
            split.join("A_1.csv"),
            format!("{HEADER}1,A,pass,TP1,0,2,1.0,pass\n1,A,pass,TP2,0,9,4.0,pass\n1,A,pass,TP1,0,2,1.2,pass\n"),
        )
        .unwrap();
        fs::write(
            split.join("B_1_fail.csv"),
            format!("{HEADER}1,B,fail,TP1,0,2,3.0,fail\n"),
        )
        .unwrap();
        fs::write(
            split.join("line2").join("C_4.csv"),
            format!("{HEADER}4,C,pass,TP2,0,9,5.0,pass\n"),
        )
        .unwrap();
        fs::write(split.join("notes.txt"), "not a unit file").unwrap();
        split
    }

    #[test]
    fn row_counts_match_sources_with_fixed_projection() {
        let dir = tempdir().unwrap();
        let split = unit_files(dir.path());
        let out = dir.path().join("test_data");
        let report =
            extract_test_points(&split, &out, &PipelineSettings::default(), &mut NoProgress)
                .unwrap();
        assert_eq!(report.source_files, 3);
        assert_eq!(report.rows_appended["TP1"], 3);
        assert_eq!(report.rows_appended["TP2"], 2);
        assert_eq!(report.datasets_created, 2);

        let tp1 = read_table(&out.join("TP1.csv")).unwrap();
        let header: Vec<_> = tp1.headers.iter().collect();
        assert_eq!(
            header,
            vec!["SeqNO", "PrdSN", "LimitLow", "LimitHigh", "TestData", "Result2"]
        );
        assert_eq!(tp1.len(), 3);
        let first: Vec<_> = tp1.rows[0].iter().collect();
        assert_eq!(first, vec!["1", "A", "0", "2", "1.0", "pass"]);
    }

    #[test]
    fn rerunning_without_clearing_doubles_rows() {
        let dir = tempdir().unwrap();
        let split = unit_files(dir.path());
        let out = dir.path().join("test_data");
        let settings = PipelineSettings::default();
        extract_test_points(&split, &out, &settings, &mut NoProgress).unwrap();
        let second = extract_test_points(&split, &out, &settings, &mut NoProgress).unwrap();
        assert_eq!(second.datasets_created, 0);
        let tp1 = read_table(&out.join("TP1.csv")).unwrap();
        assert_eq!(tp1.len(), 6);
        let text = fs::read_to_string(out.join("TP1.csv")).unwrap();
        assert_eq!(text.matches("SeqNO").count(), 1, "header written once");
    }

    #[test]
    fn incompatible_files_are_skipped_with_warning() {
        let dir = tempdir().unwrap();
        let split = unit_files(dir.path());
        fs::write(split.join("config.csv"), "TestPointNumber,CalculateCPK\nTP1,True\n").unwrap();
        let out = dir.path().join("test_data");
        let report =
            extract_test_points(&split, &out, &PipelineSettings::default(), &mut NoProgress)
                .unwrap();
        assert_eq!(report.source_files, 4);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.rows_appended["TP1"], 3);
    }

    #[test]
    fn output_directory_inside_input_is_not_read_back() {
        let dir = tempdir().unwrap();
        let split = unit_files(dir.path());
        let out = split.join("test_data");
        let settings = PipelineSettings::default();
        extract_test_points(&split, &out, &settings, &mut NoProgress).unwrap();
        let second = extract_test_points(&split, &out, &settings, &mut NoProgress).unwrap();
        assert_eq!(second.source_files, 3);
    }

    #[test]
    fn colliding_dataset_names_are_not_merged() {
        let dir = tempdir().unwrap();
        let split = dir.path().join("split_files");
        fs::create_dir_all(&split).unwrap();
        fs::write(
            split.join("A_1.csv"),
            format!("{HEADER}1,A,pass,V/1,0,2,1.0,pass\n1,A,pass,V_1,10,20,15.0,pass\n1,A,pass,V/1,0,2,1.1,pass\n"),
        )
        .unwrap();
        let out = dir.path().join("test_data");
        let report =
            extract_test_points(&split, &out, &PipelineSettings::default(), &mut NoProgress)
                .unwrap();
        assert_eq!(report.rows_appended["V/1"], 2);
        assert!(!report.rows_appended.contains_key("V_1"));
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            PipelineError::NameCollision { test_point, owner, .. }
                if test_point == "V_1" && owner == "V/1"
        ));
        let dataset = read_table(&out.join("V_1.csv")).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.rows.iter().all(|row| &row[2] == "0"));
    }
}
