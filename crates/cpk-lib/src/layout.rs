use std::path::{Path, PathBuf};

pub const SPLIT_DIR: &str = "split_files";
pub const TEST_DATA_DIR: &str = "test_data";
pub const RESULTS_DIR: &str = "cpk_results";
pub const PLOTS_DIR: &str = "cpk_plots";
pub const SELECTION_FILE: &str = "config.csv";
pub const LOW_CPK_FILE: &str = "low_cpk.csv";

/// Directory layout of one analysis workspace.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted next to `dir`, the way the extract and Cpk steps place
    /// their output beside the directory they read from.
    pub fn beside(dir: &Path) -> Self {
        let root = dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split_dir(&self) -> PathBuf {
        self.root.join(SPLIT_DIR)
    }

    pub fn test_data_dir(&self) -> PathBuf {
        self.root.join(TEST_DATA_DIR)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.root.join(PLOTS_DIR)
    }

    pub fn selection_path(&self) -> PathBuf {
        self.root.join(SELECTION_FILE)
    }
}

/// Make an identifier usable as a file stem. Path separators and characters
/// rejected by common filesystems become `_`.
pub fn file_stem_for(id: &str) -> String {
    let stem: String = id
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match stem.as_str() {
        "" | "." | ".." => "_".repeat(stem.len().max(1)),
        _ => stem,
    }
}

/// `<stem>.csv` for a test point dataset.
pub fn dataset_file_name(test_point: &str) -> String {
    format!("{}.csv", file_stem_for(test_point))
}

/// File name of one unit group written by the splitter.
pub fn unit_file_name(serial: &str, sequence: &str, failed: bool) -> String {
    let suffix = if failed { "_fail" } else { "" };
    format!(
        "{}_{}{}.csv",
        file_stem_for(serial),
        file_stem_for(sequence),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_replace_separators() {
        assert_eq!(file_stem_for("TX/Power:1"), "TX_Power_1");
        assert_eq!(file_stem_for(" plain "), "plain");
        assert_eq!(file_stem_for(".."), "__");
        assert_eq!(file_stem_for(""), "_");
    }

    #[test]
    fn unit_names_tag_failures() {
        assert_eq!(unit_file_name("A", "12", false), "A_12.csv");
        assert_eq!(unit_file_name("B", "12", true), "B_12_fail.csv");
    }

    #[test]
    fn beside_uses_parent_directory() {
        let layout = Layout::beside(Path::new("/data/run1/split_files"));
        assert_eq!(layout.test_data_dir(), PathBuf::from("/data/run1/test_data"));
        let bare = Layout::beside(Path::new("split_files"));
        assert_eq!(bare.root(), Path::new("."));
    }
}
