//! Z-score outlier detection and correction.
//!
//! `z[i] = (x[i] - mean) / std`, computed over the non-missing values with the
//! population standard deviation unless another ddof is requested. A value is
//! flagged when `|z[i]| > threshold`. A constant column has no defined
//! z-scores and never yields flags.

use crate::error::{Error, Result};
use crate::stats;
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// What happens to flagged values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    /// Replace with the median of the values that were not flagged.
    Median,
    /// Remove every row flagged in any of the selected columns.
    DropRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScoreRule {
    pub threshold: f64,
    pub ddof: usize,
}

impl Default for ZScoreRule {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            ddof: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flagged {
    pub row: String,
    pub value: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierReport {
    pub column: String,
    pub threshold: f64,
    pub correction: Correction,
    pub flagged: Vec<Flagged>,
    /// Value written over flagged entries (median correction only).
    pub replacement: Option<f64>,
}

/// Z-score of every entry; `None` where the value is missing or the column
/// is constant.
pub fn z_scores(vals: &[Option<f64>], ddof: usize) -> Result<Vec<Option<f64>>> {
    let present: Vec<f64> = vals.iter().flatten().copied().collect();
    if present.is_empty() {
        return Err(Error::EmptyInput { op: "z_scores" });
    }
    stats::check_finite(&present, "z_scores")?;
    let mean = stats::mean(&present)?;
    let std_dev = stats::std_dev_with_ddof(&present, ddof)?;
    if std_dev == 0.0 {
        return Ok(vec![None; vals.len()]);
    }
    Ok(vals
        .iter()
        .map(|val| val.map(|val| (val - mean) / std_dev))
        .collect())
}

/// Positions whose absolute z-score exceeds the threshold.
pub fn detect(vals: &[Option<f64>], rule: &ZScoreRule) -> Result<Vec<usize>> {
    check_rule(rule)?;
    let z_vals = z_scores(vals, rule.ddof)?;
    Ok(z_vals
        .iter()
        .enumerate()
        .filter_map(|(row, z)| z.filter(|z| z.abs() > rule.threshold).map(|_| row))
        .collect())
}

/// Detect outliers in `columns` and correct them on a copy of `table`.
///
/// Flags are computed for every column on the input table before any
/// correction is applied.
pub fn correct(
    table: &Table,
    columns: &[String],
    rule: &ZScoreRule,
    correction: Correction,
) -> Result<(Table, Vec<OutlierReport>)> {
    check_rule(rule)?;

    let mut out = table.clone();
    let mut reports = Vec::with_capacity(columns.len());
    let mut drop_mask = vec![false; table.n_rows()];

    for name in columns {
        let vals = table.column(name)?.as_numeric()?;
        if vals.iter().all(Option::is_none) {
            return Err(Error::EmptyColumn {
                column: name.clone(),
            });
        }
        let z_vals = z_scores(vals, rule.ddof)?;
        let rows = detect(vals, rule)?;

        let flagged = rows
            .iter()
            .filter_map(|&row| {
                Some(Flagged {
                    row: table.index().label(row),
                    value: vals[row]?,
                    z_score: z_vals[row]?,
                })
            })
            .collect();

        let replacement = match correction {
            Correction::Median => {
                let kept: Vec<f64> = vals
                    .iter()
                    .enumerate()
                    .filter(|(row, _)| !rows.contains(row))
                    .filter_map(|(_, val)| *val)
                    .collect();
                if kept.is_empty() {
                    return Err(Error::EmptyColumn {
                        column: name.clone(),
                    });
                }
                let median = stats::median(&kept)?;
                let out_vals = out.column_mut(name)?.as_numeric_mut()?;
                for &row in &rows {
                    out_vals[row] = Some(median);
                }
                Some(median)
            }
            Correction::DropRow => {
                for &row in &rows {
                    drop_mask[row] = true;
                }
                None
            }
        };

        log::debug!(
            "{name:?}: {} outliers above |z| > {}",
            rows.len(),
            rule.threshold
        );
        reports.push(OutlierReport {
            column: name.clone(),
            threshold: rule.threshold,
            correction,
            flagged,
            replacement,
        });
    }

    if correction == Correction::DropRow {
        let keep: Vec<bool> = drop_mask.iter().map(|&drop| !drop).collect();
        out = out.filter(&keep)?;
    }
    Ok((out, reports))
}

fn check_rule(rule: &ZScoreRule) -> Result<()> {
    if !(rule.threshold.is_finite() && rule.threshold > 0.0) {
        return Err(Error::InvalidArgument(format!(
            "z-score threshold must be positive and finite, but is {}",
            rule.threshold
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn incomes() -> Vec<Option<f64>> {
        let mut vals: Vec<Option<f64>> =
            (0..20).map(|i| Some(50_000.0 + 100.0 * i as f64)).collect();
        vals[0] = Some(150_000.0);
        vals[5] = None;
        vals
    }

    #[test]
    fn constant_column_flags_nothing() {
        let vals = vec![Some(4.0); 10];
        assert!(detect(&vals, &ZScoreRule::default()).unwrap().is_empty());
        assert!(z_scores(&vals, 0).unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn nan_is_rejected_rather_than_unflagged() {
        let mut vals = incomes();
        vals[2] = Some(f64::NAN);
        let rule = ZScoreRule {
            threshold: 1.0,
            ddof: 0,
        };
        assert!(matches!(detect(&vals, &rule), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn flags_injected_spike_only() {
        let rule = ZScoreRule {
            threshold: 2.5,
            ddof: 0,
        };
        assert_eq!(detect(&incomes(), &rule).unwrap(), vec![0]);
    }

    #[test]
    fn z_scores_use_population_deviation_by_default() {
        let z_vals = z_scores(&[Some(1.0), Some(3.0), None], 0).unwrap();
        assert_eq!(z_vals, vec![Some(-1.0), Some(1.0), None]);
        let z_vals = z_scores(&[Some(1.0), Some(3.0)], 1).unwrap();
        let expected = 1.0 / 2f64.sqrt();
        assert!((z_vals[1].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_threshold() {
        let rule = ZScoreRule {
            threshold: -1.0,
            ddof: 0,
        };
        assert!(matches!(
            detect(&incomes(), &rule),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn median_correction_excludes_flagged_values() {
        let table = Table::from_columns(vec![Column::numeric("Income", incomes())]).unwrap();
        let rule = ZScoreRule {
            threshold: 2.5,
            ddof: 0,
        };
        let columns = ["Income".to_string()];
        let (fixed, reports) = correct(&table, &columns, &rule, Correction::Median).unwrap();

        // Remaining values are 50_100..=51_900 without 50_500.
        let vals = fixed.column("Income").unwrap().as_numeric().unwrap();
        assert_eq!(vals[0], Some(51_050.0));
        assert_eq!(vals[5], None);
        assert_eq!(reports[0].replacement, Some(51_050.0));
        assert_eq!(reports[0].flagged.len(), 1);
        assert_eq!(reports[0].flagged[0].row, "0");
        assert_eq!(reports[0].flagged[0].value, 150_000.0);
    }

    #[test]
    fn drop_correction_removes_union_of_rows() {
        let mut age: Vec<Option<f64>> = (0..20).map(|i| Some(30.0 + (i % 5) as f64)).collect();
        age[7] = Some(300.0);
        let table = Table::from_columns(vec![
            Column::numeric("Age", age),
            Column::numeric("Income", incomes()),
        ])
        .unwrap();
        let rule = ZScoreRule {
            threshold: 2.5,
            ddof: 0,
        };
        let columns = ["Age".to_string(), "Income".to_string()];
        let (fixed, reports) = correct(&table, &columns, &rule, Correction::DropRow).unwrap();
        assert_eq!(fixed.n_rows(), 18);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|report| report.replacement.is_none()));
    }
}
