use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the pipeline operations.
///
/// Some variants abort an operation (I/O, malformed headers). Others describe
/// a single skipped unit group or test point and are collected into the
/// operation's report as warnings while the batch carries on.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no {what} at '{}'", path.display())]
    InputMissing { what: &'static str, path: PathBuf },

    #[error("unit {serial}_{sequence} has inconsistent result values: {values:?}")]
    DataInconsistency {
        serial: String,
        sequence: String,
        values: Vec<String>,
    },

    #[error("test point {0} has no passing rows for Cpk")]
    EmptySelection(String),

    #[error("no extracted dataset for test point {test_point} ({})", path.display())]
    MissingDataset { test_point: String, path: PathBuf },

    #[error("test point {test_point} has zero spread and its mean {mean} lies outside [{lsl}, {usl}]")]
    ZeroSpread {
        test_point: String,
        mean: f64,
        lsl: f64,
        usl: f64,
    },

    #[error("test point {test_point} shares dataset file {file} with {owner}")]
    NameCollision {
        test_point: String,
        owner: String,
        file: String,
    },

    #[error("dataset for test point {test_point} is unreadable: {reason}")]
    MalformedDataset { test_point: String, reason: String },

    #[error("{context}: invalid {column} value '{value}'")]
    InvalidValue {
        context: String,
        column: String,
        value: String,
    },

    #[error("{} is missing column {column}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plot rendering failed: {0}")]
    Plot(String),
}

impl PipelineError {
    /// True for errors that describe one skipped item rather than a failed
    /// operation.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            PipelineError::DataInconsistency { .. }
                | PipelineError::EmptySelection(_)
                | PipelineError::MissingDataset { .. }
                | PipelineError::ZeroSpread { .. }
                | PipelineError::InvalidValue { .. }
                | PipelineError::NameCollision { .. }
                | PipelineError::MalformedDataset { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_errors_are_distinguished_from_aborts() {
        assert!(PipelineError::EmptySelection("TP1".into()).is_skip());
        let missing = PipelineError::InputMissing {
            what: "input file",
            path: PathBuf::new(),
        };
        assert!(!missing.is_skip());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(!PipelineError::from(io).is_skip());
    }

    #[test]
    fn inconsistency_message_names_the_unit() {
        let err = PipelineError::DataInconsistency {
            serial: "SN1".into(),
            sequence: "7".into(),
            values: vec!["pass".into(), "fail".into()],
        };
        assert!(err.to_string().contains("SN1_7"));
    }
}
