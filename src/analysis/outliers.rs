use tracing::debug;

use crate::analysis::statistics::{mean, quantile, sorted, std_dev};
use crate::error::ConfigError;
use crate::models::ListingRecord;

/// Tuning for the iterative IQR + Z-score cleaner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierConfig {
    /// Multiplier applied to the interquartile range
    pub iqr_factor: f64,
    /// Records at or beyond this many standard deviations are dropped
    pub z_threshold: f64,
    pub max_passes: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            iqr_factor: 1.5,
            z_threshold: 3.0,
            max_passes: 10,
        }
    }
}

impl OutlierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.iqr_factor.is_finite() && self.iqr_factor >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "IQR factor must be a non-negative number, got {}",
                self.iqr_factor
            )));
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "Z-score threshold must be positive, got {}",
                self.z_threshold
            )));
        }
        if self.max_passes == 0 {
            return Err(ConfigError::Invalid("max passes must be at least 1".into()));
        }
        Ok(())
    }
}

fn unit_prices(records: &[ListingRecord]) -> Vec<f64> {
    records.iter().filter_map(ListingRecord::unit_price).collect()
}

/// Keep records whose unit price lies within `[Q1 - k·IQR, Q3 + k·IQR]`.
pub fn iqr_filter(records: &[ListingRecord], factor: f64) -> Vec<ListingRecord> {
    if records.len() < 2 {
        return records.to_vec();
    }
    let ordered = sorted(&unit_prices(records));
    let (Some(q1), Some(q3)) = (quantile(&ordered, 0.25), quantile(&ordered, 0.75)) else {
        return records.to_vec();
    };
    let iqr = q3 - q1;
    // A collapsed quartile range says nothing about spread.
    if iqr == 0.0 || !iqr.is_finite() {
        return records.to_vec();
    }
    let (low, high) = (q1 - factor * iqr, q3 + factor * iqr);

    records
        .iter()
        .filter(|r| r.unit_price().is_some_and(|u| u >= low && u <= high))
        .cloned()
        .collect()
}

/// Keep records whose absolute Z-score of unit price is below `threshold`.
pub fn zscore_filter(records: &[ListingRecord], threshold: f64) -> Vec<ListingRecord> {
    let values = unit_prices(records);
    let (Some(m), Some(std)) = (mean(&values), std_dev(&values, 0)) else {
        return records.to_vec();
    };
    if values.len() < 2 || std == 0.0 || !std.is_finite() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|r| r.unit_price().is_some_and(|u| ((u - m) / std).abs() < threshold))
        .cloned()
        .collect()
}

/// Apply the IQR filter then the Z-score filter until a pass removes
/// nothing or `max_passes` is reached.
///
/// Records without a unit price cannot be placed on the scale and are not
/// kept. The input is never modified.
pub fn remove_outliers(records: &[ListingRecord], config: &OutlierConfig) -> Vec<ListingRecord> {
    let mut current: Vec<ListingRecord> = records
        .iter()
        .filter(|r| r.unit_price().is_some())
        .cloned()
        .collect();

    for pass in 1..=config.max_passes {
        let before = current.len();
        current = zscore_filter(&iqr_filter(&current, config.iqr_factor), config.z_threshold);
        let removed = before - current.len();
        debug!(pass, removed, remaining = current.len(), "Outlier pass");
        if removed == 0 {
            break;
        }
    }

    current
}
