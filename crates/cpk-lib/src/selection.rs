use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result};
use crate::io::table::{read_table, require_file, require_path, write_table};
use crate::layout::SELECTION_FILE;
use csv::StringRecord;
use log::info;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const TEST_POINT_HEADER: &str = "TestPointNumber";
pub const INCLUDE_HEADER: &str = "CalculateCPK";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionEntry {
    pub test_point: String,
    pub include: bool,
}

#[derive(Debug, Serialize)]
pub struct SelectionReport {
    pub path: PathBuf,
    pub test_points: usize,
}

/// Distinct test point ids of `input` in first-seen order.
pub fn distinct_test_points(input: &Path, settings: &PipelineSettings) -> Result<Vec<String>> {
    let table = read_table(input)?;
    let tp_idx = table.column(&settings.columns.test_point)?;
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for row in &table.rows {
        let id = row.get(tp_idx).unwrap_or_default();
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Write `config.csv` into `out_dir` listing every test point of `input` with
/// inclusion switched off. Overwrites an existing selection.
pub fn generate_selection(
    input: &Path,
    out_dir: &Path,
    settings: &PipelineSettings,
) -> Result<SelectionReport> {
    require_file(input, "input file")?;
    require_path(out_dir, "output directory")?;
    let ids = distinct_test_points(input, settings)?;
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(SELECTION_FILE);
    let entries: Vec<SelectionEntry> = ids
        .into_iter()
        .map(|test_point| SelectionEntry {
            test_point,
            include: false,
        })
        .collect();
    write_selection(&path, &entries)?;
    info!(
        "wrote selection for {} test point(s) to {}",
        entries.len(),
        path.display()
    );
    Ok(SelectionReport {
        path,
        test_points: entries.len(),
    })
}

pub fn write_selection(path: &Path, entries: &[SelectionEntry]) -> Result<()> {
    let headers = StringRecord::from(vec![TEST_POINT_HEADER, INCLUDE_HEADER]);
    let rows: Vec<StringRecord> = entries
        .iter()
        .map(|e| StringRecord::from(vec![e.test_point.as_str(), format_flag(e.include)]))
        .collect();
    write_table(path, &headers, &rows)?;
    Ok(())
}

pub fn read_selection(path: &Path) -> Result<Vec<SelectionEntry>> {
    require_file(path, "selection config")?;
    let table = read_table(path)?;
    let tp_idx = table.column(TEST_POINT_HEADER)?;
    let flag_idx = table.column(INCLUDE_HEADER)?;
    let mut entries = Vec::with_capacity(table.len());
    for (line, row) in table.rows.iter().enumerate() {
        let raw = row.get(flag_idx).unwrap_or_default();
        let include = parse_flag(raw).ok_or_else(|| PipelineError::InvalidValue {
            context: format!("{} row {}", path.display(), line + 1),
            column: INCLUDE_HEADER.into(),
            value: raw.to_string(),
        })?;
        entries.push(SelectionEntry {
            test_point: row.get(tp_idx).unwrap_or_default().to_string(),
            include,
        });
    }
    Ok(entries)
}

fn format_flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn export(dir: &Path) -> PathBuf {
        let path = dir.join("export.csv");
        fs::write(
            &path,
            "SeqNO,PrdSN,result,TestPointNumber,LimitLow,LimitHigh,TestData,Result2\n\
             1,A,pass,TP2,0,1,0.5,pass\n\
             1,A,pass,TP1,0,1,0.5,pass\n\
             1,B,pass,TP2,0,1,0.4,pass\n\
             1,B,pass,TP3,0,1,0.4,pass\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn lists_distinct_points_in_first_seen_order_all_excluded() {
        let dir = tempdir().unwrap();
        let input = export(dir.path());
        let report = generate_selection(&input, dir.path(), &PipelineSettings::default()).unwrap();
        assert_eq!(report.test_points, 3);
        let entries = read_selection(&report.path).unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.test_point.as_str()).collect();
        assert_eq!(ids, vec!["TP2", "TP1", "TP3"]);
        assert!(entries.iter().all(|e| !e.include));
    }

    #[test]
    fn regeneration_overwrites_identically() {
        let dir = tempdir().unwrap();
        let input = export(dir.path());
        let settings = PipelineSettings::default();
        let first = generate_selection(&input, dir.path(), &settings).unwrap();
        let before = fs::read_to_string(&first.path).unwrap();
        fs::write(&first.path, "TestPointNumber,CalculateCPK\nTP2,True\n").unwrap();
        generate_selection(&input, dir.path(), &settings).unwrap();
        let after = fs::read_to_string(&first.path).unwrap();
        assert_eq!(before, after);
        assert!(after.starts_with("TestPointNumber,CalculateCPK\nTP2,False\n"));
    }

    #[test]
    fn reads_hand_edited_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.csv");
        fs::write(
            &path,
            "TestPointNumber,CalculateCPK\nTP1,TRUE\nTP2,false\nTP3,1\n",
        )
        .unwrap();
        let entries = read_selection(&path).unwrap();
        let flags: Vec<_> = entries.iter().map(|e| e.include).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn rejects_unknown_flag_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.csv");
        fs::write(&path, "TestPointNumber,CalculateCPK\nTP1,maybe\n").unwrap();
        let err = read_selection(&path).unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn empty_input_path_is_reported() {
        let dir = tempdir().unwrap();
        let err = generate_selection(Path::new(""), dir.path(), &PipelineSettings::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InputMissing { .. }));
    }

    #[test]
    fn nonexistent_input_is_reported_before_writing() {
        let dir = tempdir().unwrap();
        let err = generate_selection(
            &dir.path().join("nope.csv"),
            dir.path(),
            &PipelineSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InputMissing { .. }));
        assert!(!dir.path().join("config.csv").exists());
    }
}
