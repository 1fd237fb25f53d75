use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Header names of the raw export. Lookup is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnNames {
    pub sequence: String,
    pub serial: String,
    pub result: String,
    pub test_point: String,
    pub limit_low: String,
    pub limit_high: String,
    pub test_data: String,
    pub secondary_result: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            sequence: "SeqNO".into(),
            serial: "PrdSN".into(),
            result: "result".into(),
            test_point: "TestPointNumber".into(),
            limit_low: "LimitLow".into(),
            limit_high: "LimitHigh".into(),
            test_data: "TestData".into(),
            secondary_result: "Result2".into(),
        }
    }
}

/// Tunables shared by the four operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Cpk below this value is classified as low capability.
    pub capability_threshold: f64,
    pub histogram_bins: usize,
    pub plot_width: u32,
    pub plot_height: u32,
    pub columns: ColumnNames,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            capability_threshold: 1.33,
            histogram_bins: 30,
            plot_width: 800,
            plot_height: 600,
            columns: ColumnNames::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: PipelineSettings =
            toml::from_str(text).map_err(|e| PipelineError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.capability_threshold.is_finite() {
            return Err(PipelineError::Settings(
                "capability_threshold must be finite".into(),
            ));
        }
        if self.histogram_bins == 0 {
            return Err(PipelineError::Settings(
                "histogram_bins must be at least 1".into(),
            ));
        }
        if self.plot_width == 0 || self.plot_height == 0 {
            return Err(PipelineError::Settings(
                "plot dimensions must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let settings = PipelineSettings::from_toml_str("").unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert_eq!(settings.histogram_bins, 30);
        assert_eq!(settings.columns.test_point, "TestPointNumber");
    }

    #[test]
    fn partial_column_override_keeps_other_defaults() {
        let settings = PipelineSettings::from_toml_str(
            "capability_threshold = 1.67\n[columns]\nserial = \"SerialNo\"\n",
        )
        .unwrap();
        assert_eq!(settings.capability_threshold, 1.67);
        assert_eq!(settings.columns.serial, "SerialNo");
        assert_eq!(settings.columns.sequence, "SeqNO");
    }

    #[test]
    fn rejects_zero_bins() {
        let err = PipelineSettings::from_toml_str("histogram_bins = 0").unwrap_err();
        assert!(matches!(err, PipelineError::Settings(_)));
    }

    #[test]
    fn rejects_unparseable_toml() {
        assert!(PipelineSettings::from_toml_str("histogram_bins = \"many\"").is_err());
    }
}
