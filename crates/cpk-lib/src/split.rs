use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result};
use crate::io::table::{read_table, require_file, require_path, write_table};
use crate::layout::unit_file_name;
use crate::progress::{Progress, ProgressCounter};
use csv::StringRecord;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One file produced by the splitter.
#[derive(Debug, Clone, Serialize)]
pub struct UnitFile {
    pub file_name: String,
    pub serial: String,
    pub sequence: String,
    pub rows: usize,
    pub failed: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct SplitReport {
    pub groups: usize,
    pub files: Vec<UnitFile>,
    #[serde(serialize_with = "crate::report::serialize_warnings")]
    pub warnings: Vec<PipelineError>,
}

/// Rows of one (SequenceNo, UnitSerial) group in input order.
struct UnitGroup<'t> {
    sequence: String,
    serial: String,
    rows: Vec<&'t StringRecord>,
}

/// Split `input` into `<UnitSerial>_<SequenceNo>[_fail].csv` files under
/// `out_dir`. Groups whose primary result is not uniform are skipped and
/// reported as warnings.
pub fn split_export(
    input: &Path,
    out_dir: &Path,
    settings: &PipelineSettings,
    progress: &mut dyn Progress,
) -> Result<SplitReport> {
    require_file(input, "input file")?;
    require_path(out_dir, "output directory")?;
    let table = read_table(input)?;
    let cols = &settings.columns;
    let seq_idx = table.column(&cols.sequence)?;
    let sn_idx = table.column(&cols.serial)?;
    let result_idx = table.column(&cols.result)?;

    fs::create_dir_all(out_dir)?;

    let groups = group_units(&table.rows, seq_idx, sn_idx);
    info!(
        "splitting {} ({} rows) into {} unit group(s)",
        input.display(),
        table.len(),
        groups.len()
    );

    let mut report = SplitReport {
        groups: groups.len(),
        ..Default::default()
    };
    let mut counter = ProgressCounter::new(progress, groups.len());
    for group in groups {
        match uniform_result(&group, result_idx) {
            Ok(result) => {
                let failed = result.eq_ignore_ascii_case("fail");
                let file_name = unit_file_name(&group.serial, &group.sequence, failed);
                let rows = write_table(
                    &out_dir.join(&file_name),
                    &table.headers,
                    group.rows.iter().copied(),
                )?;
                debug!("wrote {} ({} rows)", file_name, rows);
                report.files.push(UnitFile {
                    file_name,
                    serial: group.serial,
                    sequence: group.sequence,
                    rows,
                    failed,
                });
            }
            Err(err) => {
                warn!("{}", err);
                report.warnings.push(err);
            }
        }
        counter.step();
    }
    info!(
        "split finished: {} file(s) written, {} group(s) rejected",
        report.files.len(),
        report.warnings.len()
    );
    Ok(report)
}

fn group_units(rows: &[StringRecord], seq_idx: usize, sn_idx: usize) -> Vec<UnitGroup<'_>> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<UnitGroup> = Vec::new();
    for row in rows {
        let sequence = row.get(seq_idx).unwrap_or_default().to_string();
        let serial = row.get(sn_idx).unwrap_or_default().to_string();
        let key = (sequence, serial);
        match index.get(&key) {
            Some(&slot) => groups[slot].rows.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(UnitGroup {
                    sequence: key.0,
                    serial: key.1,
                    rows: vec![row],
                });
            }
        }
    }
    groups
}

/// The group's single result value; the first row's value when uniform.
fn uniform_result(group: &UnitGroup<'_>, result_idx: usize) -> Result<String> {
    let mut values: Vec<String> = Vec::new();
    for row in &group.rows {
        let value = row.get(result_idx).unwrap_or_default();
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
    if values.len() > 1 {
        return Err(PipelineError::DataInconsistency {
            serial: group.serial.clone(),
            sequence: group.sequence.clone(),
            values,
        });
    }
    Ok(values.into_iter().next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::table::read_table;
    use crate::progress::NoProgress;
    use tempfile::tempdir;

    const EXPORT: &str = "\
SeqNO,PrdSN,result,TestPointNumber,LimitLow,LimitHigh,TestData,Result2,Station
1,A,pass,TP1,0,2,1.0,pass,S1
1,A,pass,TP2,0,5,2.0,pass,S1
1,B,FAIL,TP1,0,2,3.0,fail,S1
2,A,pass,TP1,0,2,1.1,pass,S2
1,C,pass,TP1,0,2,1.0,pass,S1
1,C,fail,TP2,0,5,9.0,fail,S1
";

    fn write_export(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("export.csv");
        fs::write(&path, EXPORT).unwrap();
        path
    }

    #[test]
    fn writes_one_file_per_unit_run_and_tags_failures() {
        let dir = tempdir().unwrap();
        let input = write_export(dir.path());
        let out = dir.path().join("split_files");
        let report =
            split_export(&input, &out, &PipelineSettings::default(), &mut NoProgress).unwrap();

        assert_eq!(report.groups, 4);
        let names: Vec<_> = report.files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["A_1.csv", "B_1_fail.csv", "A_2.csv"]);
        assert!(out.join("B_1_fail.csv").exists());
        assert!(!out.join("C_1.csv").exists());
        assert!(!out.join("C_1_fail.csv").exists());
    }

    #[test]
    fn mixed_results_are_rejected_not_resolved() {
        let dir = tempdir().unwrap();
        let input = write_export(dir.path());
        let out = dir.path().join("split");
        let report =
            split_export(&input, &out, &PipelineSettings::default(), &mut NoProgress).unwrap();
        assert_eq!(report.warnings.len(), 1);
        match &report.warnings[0] {
            PipelineError::DataInconsistency {
                serial, sequence, ..
            } => {
                assert_eq!(serial, "C");
                assert_eq!(sequence, "1");
            }
            other => panic!("unexpected warning {other}"),
        }
    }

    #[test]
    fn rows_are_conserved_except_rejected_groups() {
        let dir = tempdir().unwrap();
        let input = write_export(dir.path());
        let out = dir.path().join("split");
        let report =
            split_export(&input, &out, &PipelineSettings::default(), &mut NoProgress).unwrap();

        let mut written = Vec::new();
        for file in &report.files {
            let table = read_table(&out.join(&file.file_name)).unwrap();
            assert_eq!(table.headers.len(), 9, "all columns carried through");
            assert_eq!(table.len(), file.rows);
            written.extend(table.rows.into_iter().map(|r| r.iter().collect::<Vec<_>>().join(",")));
        }
        let source = read_table(&input).unwrap();
        let expected: Vec<String> = source
            .rows
            .iter()
            .filter(|r| &r[1] != "C")
            .map(|r| r.iter().collect::<Vec<_>>().join(","))
            .collect();
        written.sort();
        let mut expected_sorted = expected.clone();
        expected_sorted.sort();
        assert_eq!(written, expected_sorted);
    }

    #[test]
    fn progress_reaches_one_hundred() {
        let dir = tempdir().unwrap();
        let input = write_export(dir.path());
        let mut updates = Vec::new();
        let mut sink = |p: f64| updates.push(p);
        split_export(
            &input,
            &dir.path().join("split"),
            &PipelineSettings::default(),
            &mut sink,
        )
        .unwrap();
        assert_eq!(updates.len(), 4);
        assert_eq!(updates.last().copied(), Some(100.0));
    }

    #[test]
    fn missing_key_column_aborts() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bad.csv");
        fs::write(&input, "PrdSN,result\nA,pass\n").unwrap();
        let err = split_export(
            &input,
            &dir.path().join("split"),
            &PipelineSettings::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }
}
