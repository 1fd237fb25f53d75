use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Capable,
    Low,
}

impl Classification {
    pub fn from_cpk(cpk: f64, threshold: f64) -> Self {
        if cpk < threshold {
            Classification::Low
        } else {
            Classification::Capable
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CapabilityStats {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub lsl: f64,
    pub usl: f64,
    /// `f64::INFINITY` when the data has no spread and sits inside the limits.
    pub cpk: f64,
}

/// Why capability could not be computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapabilityFailure {
    NoData,
    /// σ = 0 with the mean outside [LSL, USL].
    ZeroSpreadOutOfLimits { mean: f64 },
}

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation. Fewer than two values have no observable
/// spread and yield 0.
pub fn sample_std_dev(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(data);
    (data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt()
}

/// `min(USL - mean, mean - LSL) / 3σ` with σ the sample standard deviation.
/// Zero spread yields +∞ inside the
/// limits and `None` outside them.
pub fn cpk(mean: f64, std_dev: f64, lsl: f64, usl: f64) -> Option<f64> {
    if std_dev == 0.0 {
        return if (lsl..=usl).contains(&mean) {
            Some(f64::INFINITY)
        } else {
            None
        };
    }
    let cpu = (usl - mean) / (3.0 * std_dev);
    let cpl = (mean - lsl) / (3.0 * std_dev);
    Some(cpu.min(cpl))
}

pub fn capability(
    data: &[f64],
    lsl: f64,
    usl: f64,
) -> Result<CapabilityStats, CapabilityFailure> {
    if data.is_empty() {
        return Err(CapabilityFailure::NoData);
    }
    let m = mean(data);
    let sd = sample_std_dev(data);
    let value = cpk(m, sd, lsl, usl).ok_or(CapabilityFailure::ZeroSpreadOutOfLimits { mean: m })?;
    Ok(CapabilityStats {
        n: data.len(),
        mean: m,
        std_dev: sd,
        lsl,
        usl,
        cpk: value,
    })
}

pub fn normal_pdf(x: f64, mean: f64, std_dev: f64) -> f64 {
    let z = (x - mean) / std_dev;
    (-0.5 * z * z).exp() / (std_dev * (2.0 * PI).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    /// count / (n · width), so the bar areas sum to 1.
    pub density: f64,
}

/// Equal-width histogram over [min, max] of `data`, normalised to a density.
/// A single distinct value is centred in a bin range of width 1.
pub fn histogram_density(data: &[f64], bins: usize) -> Vec<HistogramBin> {
    if data.is_empty() || bins == 0 {
        return Vec::new();
    }
    let mut lo = data.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &x in data {
        let idx = (((x - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let n = data.len() as f64;
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + i as f64 * width,
            end: lo + (i + 1) as f64 * width,
            density: count as f64 / (n * width),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{} vs {} (tol {})", a, b, tol);
    }

    #[test]
    fn centred_process_scenario() {
        let stats = capability(&[1.0, 1.1, 0.9], 0.0, 2.0).unwrap();
        assert_eq!(stats.n, 3);
        assert_close(stats.mean, 1.0, 1e-12);
        assert_close(stats.std_dev, 0.1, 1e-12);
        assert_close(stats.cpk, 1.0 / 0.3, 1e-9);
        assert_eq!(
            Classification::from_cpk(stats.cpk, 1.33),
            Classification::Capable
        );
    }

    #[test]
    fn cpk_takes_the_nearer_limit() {
        let data = [9.0, 10.0, 11.0];
        let stats = capability(&data, 0.0, 12.0).unwrap();
        let cpu: f64 = (12.0 - 10.0) / 3.0;
        let cpl = (10.0 - 0.0) / 3.0;
        assert_close(stats.cpk, cpu.min(cpl), 1e-12);
        assert_eq!(Classification::from_cpk(stats.cpk, 1.33), Classification::Low);
    }

    #[test]
    fn threshold_is_strict() {
        assert_eq!(Classification::from_cpk(1.33, 1.33), Classification::Capable);
        assert_eq!(Classification::from_cpk(1.3299, 1.33), Classification::Low);
    }

    #[test]
    fn zero_spread_inside_limits_is_infinitely_capable() {
        let stats = capability(&[1.0, 1.0, 1.0], 0.0, 2.0).unwrap();
        assert!(stats.cpk.is_infinite() && stats.cpk > 0.0);
        let single = capability(&[1.5], 0.0, 2.0).unwrap();
        assert_eq!(single.std_dev, 0.0);
        assert!(single.cpk.is_infinite());
    }

    #[test]
    fn zero_spread_outside_limits_fails() {
        assert_eq!(
            capability(&[3.0, 3.0], 0.0, 2.0).unwrap_err(),
            CapabilityFailure::ZeroSpreadOutOfLimits { mean: 3.0 }
        );
        assert_eq!(capability(&[], 0.0, 2.0).unwrap_err(), CapabilityFailure::NoData);
    }

    #[test]
    fn histogram_integrates_to_one() {
        let data: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin()).collect();
        let bins = histogram_density(&data, 30);
        assert_eq!(bins.len(), 30);
        let area: f64 = bins.iter().map(|b| b.density * (b.end - b.start)).sum();
        assert_close(area, 1.0, 1e-9);
    }

    #[test]
    fn histogram_of_constant_data_spans_unit_width() {
        let bins = histogram_density(&[2.0, 2.0], 4);
        assert_close(bins[0].start, 1.5, 1e-12);
        assert_close(bins[3].end, 2.5, 1e-12);
    }

    #[test]
    fn normal_pdf_peaks_at_mean() {
        assert_close(normal_pdf(0.0, 0.0, 1.0), 0.398_942_280_4, 1e-9);
        assert!(normal_pdf(1.0, 0.0, 1.0) < normal_pdf(0.0, 0.0, 1.0));
    }
}
