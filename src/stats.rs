//! Descriptive statistics over finite numeric sequences.
//!
//! All functions take the non-missing values of a column as a plain slice.
//! Variance and standard deviation use the population form (ddof = 0) unless
//! a `_with_ddof` variant is called; kurtosis is reported as excess kurtosis.

use crate::error::{Error, Result};
use crate::table::{Column, Kind, Table};
use serde::{Deserialize, Serialize};

/// Snapshot of the distribution of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub missing: usize,
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub quartile_dev: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub summary: Summary,
}

pub fn mean(vals: &[f64]) -> Result<f64> {
    check_non_empty(vals, "mean")?;
    Ok(vals.iter().sum::<f64>() / vals.len() as f64)
}

/// Middle value; the average of the two middle values for even lengths.
pub fn median(vals: &[f64]) -> Result<f64> {
    check_non_empty(vals, "median")?;
    Ok(quantile_sorted(&sorted(vals), 0.5))
}

/// Most frequent value; ties resolve to the smallest candidate.
pub fn mode(vals: &[f64]) -> Result<f64> {
    check_non_empty(vals, "mode")?;
    let sorted_vals = sorted(vals);

    let mut best_val = sorted_vals[0];
    let mut best_count = 0;
    let mut run_start = 0;
    for i_val in 1..=sorted_vals.len() {
        if i_val == sorted_vals.len() || sorted_vals[i_val] != sorted_vals[run_start] {
            let count = i_val - run_start;
            if count > best_count {
                best_count = count;
                best_val = sorted_vals[run_start];
            }
            run_start = i_val;
        }
    }
    Ok(best_val)
}

pub fn variance(vals: &[f64]) -> Result<f64> {
    variance_with_ddof(vals, 0)
}

pub fn variance_with_ddof(vals: &[f64], ddof: usize) -> Result<f64> {
    check_non_empty(vals, "variance")?;
    let n_vals = vals.len();
    if n_vals <= ddof {
        return Err(Error::InsufficientLength {
            op: "variance",
            len: n_vals,
            required: ddof + 1,
        });
    }
    let mean = mean(vals)?;
    let sum_sq: f64 = vals.iter().map(|&val| (val - mean).powi(2)).sum();
    Ok(sum_sq / (n_vals - ddof) as f64)
}

pub fn std_dev(vals: &[f64]) -> Result<f64> {
    Ok(variance(vals)?.sqrt())
}

pub fn std_dev_with_ddof(vals: &[f64], ddof: usize) -> Result<f64> {
    Ok(variance_with_ddof(vals, ddof)?.sqrt())
}

/// Third standardized moment. Zero for constant input.
pub fn skewness(vals: &[f64]) -> Result<f64> {
    check_non_empty(vals, "skewness")?;
    let (m2, m3, _) = central_moments(vals)?;
    if m2 == 0.0 {
        return Ok(0.0);
    }
    Ok(m3 / m2.powf(1.5))
}

/// Fourth standardized moment minus 3. Zero for constant input.
pub fn kurtosis(vals: &[f64]) -> Result<f64> {
    check_non_empty(vals, "kurtosis")?;
    let (m2, _, m4) = central_moments(vals)?;
    if m2 == 0.0 {
        return Ok(0.0);
    }
    Ok(m4 / (m2 * m2) - 3.0)
}

/// Quantile by linear interpolation between order statistics.
pub fn quantile(vals: &[f64], p: f64) -> Result<f64> {
    check_non_empty(vals, "quantile")?;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidArgument(format!(
            "quantile probability must be in [0, 1], but is {p}"
        )));
    }
    Ok(quantile_sorted(&sorted(vals), p))
}

pub fn min(vals: &[f64]) -> Result<f64> {
    check_non_empty(vals, "min")?;
    Ok(vals.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn max(vals: &[f64]) -> Result<f64> {
    check_non_empty(vals, "max")?;
    Ok(vals.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Pearson correlation coefficient of two equally long samples.
pub fn pearson(x_vals: &[f64], y_vals: &[f64]) -> Result<f64> {
    if x_vals.len() != y_vals.len() {
        return Err(Error::LengthMismatch {
            expected: x_vals.len(),
            found: y_vals.len(),
        });
    }
    let x_mean = mean(x_vals)?;
    let y_mean = mean(y_vals)?;

    let mut cov = 0.0;
    let mut x_ss = 0.0;
    let mut y_ss = 0.0;
    for (&x, &y) in x_vals.iter().zip(y_vals) {
        cov += (x - x_mean) * (y - y_mean);
        x_ss += (x - x_mean).powi(2);
        y_ss += (y - y_mean).powi(2);
    }
    if x_ss == 0.0 || y_ss == 0.0 {
        return Err(Error::InvalidArgument(
            "correlation is undefined for a constant sample".to_string(),
        ));
    }
    Ok(cov / (x_ss * y_ss).sqrt())
}

pub fn describe(vals: &[f64]) -> Result<Summary> {
    check_non_empty(vals, "describe")?;
    check_finite(vals, "describe")?;
    let sorted_vals = sorted(vals);

    let variance = variance(vals)?;
    let min = sorted_vals[0];
    let max = sorted_vals[sorted_vals.len() - 1];
    let q1 = quantile_sorted(&sorted_vals, 0.25);
    let q3 = quantile_sorted(&sorted_vals, 0.75);

    Ok(Summary {
        count: vals.len(),
        missing: 0,
        mean: mean(vals)?,
        median: quantile_sorted(&sorted_vals, 0.5),
        mode: mode(vals)?,
        variance,
        std_dev: variance.sqrt(),
        min,
        max,
        range: max - min,
        q1,
        q3,
        iqr: q3 - q1,
        quartile_dev: (q3 - q1) / 2.0,
        skewness: skewness(vals)?,
        kurtosis: kurtosis(vals)?,
    })
}

/// Summarise the non-missing values of a numeric column.
pub fn describe_column(column: &Column) -> Result<Summary> {
    let vals = column.present_values()?;
    if vals.is_empty() {
        return Err(Error::EmptyColumn {
            column: column.name().to_string(),
        });
    }
    let mut summary = describe(&vals)?;
    summary.missing = column.len() - vals.len();
    Ok(summary)
}

/// Summarise every numeric column, skipping columns with no values.
pub fn describe_table(table: &Table) -> Vec<ColumnSummary> {
    let mut summaries = Vec::new();
    for column in table.columns() {
        if column.kind() != Kind::Numeric {
            continue;
        }
        match describe_column(column) {
            Ok(summary) => summaries.push(ColumnSummary {
                column: column.name().to_string(),
                summary,
            }),
            Err(error) => log::warn!("skipping {:?}: {error}", column.name()),
        }
    }
    summaries
}

/// Pearson correlation of two numeric columns over rows where both are present.
pub fn correlate(table: &Table, x_name: &str, y_name: &str) -> Result<f64> {
    let x_col = table.column(x_name)?.as_numeric()?;
    let y_col = table.column(y_name)?.as_numeric()?;
    let (x_vals, y_vals): (Vec<f64>, Vec<f64>) = x_col
        .iter()
        .zip(y_col)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    pearson(&x_vals, &y_vals)
}

/// Fail on NaN or infinite input.
pub fn check_finite(vals: &[f64], op: &str) -> Result<()> {
    if let Some(pos) = vals.iter().position(|val| !val.is_finite()) {
        return Err(Error::InvalidArgument(format!(
            "{op} requires finite values, but position {pos} holds {}",
            vals[pos]
        )));
    }
    Ok(())
}

fn check_non_empty(vals: &[f64], op: &'static str) -> Result<()> {
    if vals.is_empty() {
        return Err(Error::EmptyInput { op });
    }
    Ok(())
}

fn sorted(vals: &[f64]) -> Vec<f64> {
    let mut sorted_vals = vals.to_vec();
    sorted_vals.sort_by(|a, b| a.total_cmp(b));
    sorted_vals
}

fn quantile_sorted(sorted_vals: &[f64], p: f64) -> f64 {
    let n_vals = sorted_vals.len();
    let pos = p * (n_vals - 1) as f64;
    let lo = pos.floor() as usize;
    let frac = pos - lo as f64;
    if lo + 1 >= n_vals {
        sorted_vals[n_vals - 1]
    } else {
        sorted_vals[lo] + (sorted_vals[lo + 1] - sorted_vals[lo]) * frac
    }
}

fn central_moments(vals: &[f64]) -> Result<(f64, f64, f64)> {
    let mean = mean(vals)?;
    let n_vals = vals.len() as f64;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &val in vals {
        let diff = val - mean;
        let diff_2 = diff * diff;
        m2 += diff_2;
        m3 += diff_2 * diff;
        m4 += diff_2 * diff_2;
    }
    Ok((m2 / n_vals, m3 / n_vals, m4 / n_vals))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn mean_is_sum_over_len_and_variance_non_negative() {
        let samples: [&[f64]; 3] = [&[1.0, 2.0, 3.0, 4.0], &[-5.5, 0.25, 7.0], &[3.0]];
        for vals in samples {
            let expected = vals.iter().sum::<f64>() / vals.len() as f64;
            assert_eq!(mean(vals).unwrap(), expected);
            assert!(variance(vals).unwrap() >= 0.0);
        }
    }

    #[test]
    fn empty_input_fails() {
        assert!(matches!(mean(&[]), Err(Error::EmptyInput { op: "mean" })));
        assert!(matches!(describe(&[]), Err(Error::EmptyInput { .. })));
    }

    #[test]
    fn non_finite_input_fails() {
        assert!(check_finite(&[1.0, 2.0], "test").is_ok());
        assert!(matches!(
            describe(&[1.0, f64::NAN, 3.0]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            describe(&[1.0, f64::NEG_INFINITY]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn median_averages_middle_pair() {
        assert_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
    }

    #[test]
    fn mode_prefers_smallest_on_ties() {
        assert_eq!(mode(&[1.0, 2.0, 2.0, 3.0]).unwrap(), 2.0);
        assert_eq!(mode(&[2.0, 2.0, 1.0, 1.0]).unwrap(), 1.0);
        assert_eq!(mode(&[5.0, 4.0, 3.0]).unwrap(), 3.0);
    }

    #[test]
    fn variance_uses_population_divisor() {
        let vals = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((variance(&vals).unwrap() - 4.0).abs() < TOL);
        assert!((std_dev(&vals).unwrap() - 2.0).abs() < TOL);
        assert!((variance_with_ddof(&vals, 1).unwrap() - 32.0 / 7.0).abs() < TOL);
        assert!(matches!(
            variance_with_ddof(&[1.0], 1),
            Err(Error::InsufficientLength { required: 2, .. })
        ));
    }

    #[test]
    fn quantile_half_equals_median() {
        let samples: [&[f64]; 3] = [&[9.0, 1.0, 5.0, 3.0], &[1.0], &[2.0, 8.0, 4.0, 6.0, 10.0]];
        for vals in samples {
            assert_eq!(quantile(vals, 0.5).unwrap(), median(vals).unwrap());
        }
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.25).unwrap(), 2.0);
        assert_eq!(quantile(&[1.0, 2.0], 0.25).unwrap(), 1.25);
        assert!(quantile(&[1.0], 1.5).is_err());
    }

    #[test]
    fn shape_moments() {
        let symmetric = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(skewness(&symmetric).unwrap().abs() < TOL);
        // Uniform five points: m4 / m2^2 = 6.8 / 4 = 1.7.
        assert!((kurtosis(&symmetric).unwrap() - (1.7 - 3.0)).abs() < TOL);
        assert!(skewness(&[1.0, 1.0, 1.0, 10.0]).unwrap() > 0.0);
        assert_eq!(skewness(&[2.0, 2.0]).unwrap(), 0.0);
        assert_eq!(kurtosis(&[2.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn summary_collects_spread_measures() {
        let summary = describe(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(summary.count, 5);
        assert_eq!(summary.range, 4.0);
        assert_eq!(summary.iqr, 2.0);
        assert_eq!(summary.quartile_dev, 1.0);
        assert_eq!(summary.mode, 1.0);
    }

    #[test]
    fn column_summary_counts_missing_and_rejects_empty() {
        let column = Column::numeric("age", vec![Some(20.0), None, Some(40.0)]);
        let summary = describe_column(&column).unwrap();
        assert_eq!((summary.count, summary.missing), (2, 1));
        assert_eq!(summary.mean, 30.0);

        let empty = Column::numeric("age", vec![None, None]);
        assert!(matches!(describe_column(&empty), Err(Error::EmptyColumn { .. })));
    }

    #[test]
    fn correlation_of_linear_relation() {
        let table = Table::from_columns(vec![
            Column::numeric("x", vec![Some(1.0), Some(2.0), None, Some(4.0)]),
            Column::numeric("y", vec![Some(3.0), Some(5.0), Some(100.0), Some(9.0)]),
        ])
        .unwrap();
        assert!((correlate(&table, "x", "y").unwrap() - 1.0).abs() < TOL);
        assert!(pearson(&[1.0, 1.0], &[1.0, 2.0]).is_err());
        assert!(matches!(
            pearson(&[1.0], &[1.0, 2.0]),
            Err(Error::LengthMismatch { .. })
        ));
    }
}
