pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod io;
pub mod layout;
pub mod plot;
pub mod progress;
pub mod report;
pub mod selection;
pub mod split;

pub use config::{ColumnNames, PipelineSettings};
pub use engine::{compute_cpk, CpkPaths, CpkReport};
pub use error::PipelineError;
pub use extract::{extract_test_points, ExtractReport};
pub use layout::Layout;
pub use progress::{NoProgress, Progress};
pub use selection::{generate_selection, read_selection, SelectionReport};
pub use split::{split_export, SplitReport};
