use crate::error::PipelineError;
use serde::ser::{SerializeSeq, Serializer};

/// Warnings serialize as their display strings.
pub fn serialize_warnings<S: Serializer>(
    warnings: &[PipelineError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(warnings.len()))?;
    for warning in warnings {
        seq.serialize_element(&warning.to_string())?;
    }
    seq.end()
}
