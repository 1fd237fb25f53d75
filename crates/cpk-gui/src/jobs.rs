use cpk_lib::{
    compute_cpk, extract_test_points, generate_selection, split_export, CpkPaths, CpkReport,
    ExtractReport, Layout, PipelineError, PipelineSettings, Progress, SelectionReport,
    SplitReport,
};
use crossbeam_channel::{unbounded, Receiver};
use std::path::PathBuf;
use std::thread::JoinHandle;

/// One of the four batch operations with the paths the operator picked.
#[derive(Debug, Clone)]
pub enum Operation {
    Split { input: PathBuf, out_root: PathBuf },
    Config { input: PathBuf, out_dir: PathBuf },
    Extract { split_dir: PathBuf },
    Cpk { selection: PathBuf, test_data_dir: PathBuf },
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Split { .. } => "Split CSV",
            Operation::Config { .. } => "Generate config",
            Operation::Extract { .. } => "Extract test data",
            Operation::Cpk { .. } => "Compute Cpk",
        }
    }
}

pub enum Outcome {
    Split(SplitReport),
    Config(SelectionReport),
    Extract(ExtractReport),
    Cpk(CpkReport),
}

impl Outcome {
    pub fn summary(&self) -> String {
        match self {
            Outcome::Split(r) => format!(
                "CSV split finished: {} file(s) from {} unit group(s).",
                r.files.len(),
                r.groups
            ),
            Outcome::Config(r) => format!(
                "Config written to {} with {} test point(s). Set CalculateCPK to True for the points to analyse.",
                r.path.display(),
                r.test_points
            ),
            Outcome::Extract(r) => format!(
                "Test data extracted from {} file(s) into {} test point dataset(s).",
                r.source_files,
                r.rows_appended.len()
            ),
            Outcome::Cpk(r) => format!(
                "Cpk computed for {} of {} selected test point(s); {} below threshold.",
                r.results.len(),
                r.selected,
                r.low.len()
            ),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        let warnings: &[PipelineError] = match self {
            Outcome::Split(r) => &r.warnings,
            Outcome::Config(_) => &[],
            Outcome::Extract(r) => &r.warnings,
            Outcome::Cpk(r) => &r.warnings,
        };
        warnings.iter().map(ToString::to_string).collect()
    }
}

pub enum JobMessage {
    Progress(f64),
    Finished(Result<Outcome, PipelineError>),
}

pub fn run_operation(
    op: &Operation,
    settings: &PipelineSettings,
    progress: &mut dyn Progress,
) -> Result<Outcome, PipelineError> {
    match op {
        Operation::Split { input, out_root } => {
            let split_dir = Layout::new(out_root).split_dir();
            split_export(input, &split_dir, settings, progress).map(Outcome::Split)
        }
        Operation::Config { input, out_dir } => {
            generate_selection(input, out_dir, settings).map(Outcome::Config)
        }
        Operation::Extract { split_dir } => {
            let out = Layout::beside(split_dir).test_data_dir();
            extract_test_points(split_dir, &out, settings, progress).map(Outcome::Extract)
        }
        Operation::Cpk {
            selection,
            test_data_dir,
        } => {
            let paths = CpkPaths::new(selection, test_data_dir);
            compute_cpk(&paths, settings, progress).map(Outcome::Cpk)
        }
    }
}

/// An operation running on its own thread. Progress and the final outcome
/// arrive over a channel polled by the UI each frame.
pub struct Job {
    pub label: &'static str,
    rx: Receiver<JobMessage>,
    handle: Option<JoinHandle<()>>,
}

impl Job {
    pub fn spawn(op: Operation, settings: PipelineSettings) -> Self {
        let (tx, rx) = unbounded();
        let label = op.label();
        let handle = std::thread::spawn(move || {
            let progress_tx = tx.clone();
            let mut progress = move |percent: f64| {
                let _ = progress_tx.send(JobMessage::Progress(percent));
            };
            let outcome = run_operation(&op, &settings, &mut progress);
            let _ = tx.send(JobMessage::Finished(outcome));
        });
        Self {
            label,
            rx,
            handle: Some(handle),
        }
    }

    /// Drain pending messages without blocking.
    pub fn poll(&mut self) -> Vec<JobMessage> {
        let messages: Vec<JobMessage> = self.rx.try_iter().collect();
        if messages
            .iter()
            .any(|m| matches!(m, JobMessage::Finished(_)))
        {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
        messages
    }

    /// Block until the job reports its outcome.
    #[cfg(test)]
    pub fn wait(mut self) -> (Vec<f64>, Result<Outcome, PipelineError>) {
        let mut updates = Vec::new();
        while let Ok(message) = self.rx.recv() {
            match message {
                JobMessage::Progress(p) => updates.push(p),
                JobMessage::Finished(outcome) => {
                    if let Some(handle) = self.handle.take() {
                        let _ = handle.join();
                    }
                    return (updates, outcome);
                }
            }
        }
        (
            updates,
            Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "worker exited without an outcome",
            ))),
        )
    }
}
