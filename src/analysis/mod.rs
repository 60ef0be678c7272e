//! Outlier removal and descriptive statistics over listing unit prices.

pub mod outliers;
pub mod statistics;

pub use outliers::{remove_outliers, OutlierConfig};
pub use statistics::{compute_statistics, StatisticsSummary};
