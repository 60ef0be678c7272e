use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::models::ListingRecord;

/// Descriptive statistics of the unit price over a record set.
///
/// Always recomputed from scratch; an empty set yields all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatisticsSummary {
    /// Records in the set, priced or not
    pub count: usize,
    /// Records that carry a unit price
    pub priced: usize,
    pub mean: f64,
    /// Mean weighted by area
    pub weighted_mean: f64,
    pub median: f64,
    pub mode: f64,
    /// Sample standard deviation
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub mean_price: f64,
    pub mean_area: f64,
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Standard deviation with `ddof` degrees of freedom removed from the divisor.
pub(crate) fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    let m = mean(values)?;
    let squares: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((squares / (values.len() - ddof) as f64).sqrt())
}

/// Quantile of an ascending slice, interpolating linearly between ranks.
pub(crate) fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Most frequent value; ties resolve to the smallest.
fn mode(sorted: &[f64]) -> Option<f64> {
    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let value = sorted[i];
        let run = sorted[i..].iter().take_while(|v| **v == value).count();
        if best.map_or(true, |(_, count)| run > count) {
            best = Some((value, run));
        }
        i += run;
    }
    best.map(|(value, _)| value)
}

/// Compute the unit-price summary of `records`.
pub fn compute_statistics(records: &[ListingRecord]) -> StatisticsSummary {
    let unit_prices: Vec<f64> = records.iter().filter_map(ListingRecord::unit_price).collect();
    let prices: Vec<f64> = records.iter().map(|r| r.price).collect();
    let areas: Vec<f64> = records.iter().filter_map(|r| r.area_m2).collect();

    let ordered = sorted(&unit_prices);
    let mean_unit = mean(&unit_prices).unwrap_or(0.0);

    let (weighted_sum, weight_total) = records
        .iter()
        .filter_map(|r| Some((r.unit_price()?, r.area_m2?)))
        .fold((0.0, 0.0), |(sum, total), (unit, area)| (sum + unit * area, total + area));
    let weighted_mean = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        mean_unit
    };

    let std = std_dev(&unit_prices, 1).unwrap_or(0.0);
    let coefficient_of_variation = if mean_unit != 0.0 { std / mean_unit } else { 0.0 };

    StatisticsSummary {
        count: records.len(),
        priced: unit_prices.len(),
        mean: mean_unit,
        weighted_mean,
        median: quantile(&ordered, 0.5).unwrap_or(0.0),
        mode: mode(&ordered).unwrap_or(0.0),
        std_dev: std,
        coefficient_of_variation,
        mean_price: mean(&prices).unwrap_or(0.0),
        mean_area: mean(&areas).unwrap_or(0.0),
    }
}

impl StatisticsSummary {
    /// Key/value view handed to reporting collaborators.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("count", self.count as f64),
            ("priced", self.priced as f64),
            ("mean", self.mean),
            ("weighted_mean", self.weighted_mean),
            ("median", self.median),
            ("mode", self.mode),
            ("std_dev", self.std_dev),
            ("coefficient_of_variation", self.coefficient_of_variation),
            ("mean_price", self.mean_price),
            ("mean_area", self.mean_area),
        ])
    }
}

fn br(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}").replace('.', ",")
}

impl fmt::Display for StatisticsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Média Aritmética: {}", br(self.mean, 2))?;
        writeln!(f, "Média Ponderada: {}", br(self.weighted_mean, 2))?;
        writeln!(f, "Mediana: {}", br(self.median, 2))?;
        writeln!(f, "Moda: {}", br(self.mode, 2))?;
        writeln!(f, "Coeficiente de Variação: {}", br(self.coefficient_of_variation, 4))?;
        writeln!(f, "Total de Linhas: {}", self.count)?;
        writeln!(f, "Preço Médio: R$ {}", br(self.mean_price, 2))?;
        write!(f, "Área Média: {} m²", br(self.mean_area, 2))
    }
}
