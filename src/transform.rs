//! Column transforms used while preparing data for modelling.

use crate::error::{Error, Result};
use crate::stats;
use crate::table::{Column, ColumnData, Table};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Table-level transform applied as one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Z-score scale a numeric column in place.
    Standardize {
        column: String,
        #[serde(default)]
        ddof: usize,
    },
    /// Replace a numeric column by `ln(1 + x)`.
    Log1p { column: String },
    /// Lagged difference of a numeric column, written to `into` when given.
    Difference {
        column: String,
        #[serde(default = "default_lag")]
        lag: usize,
        into: Option<String>,
    },
    /// Bin a numeric column into a new categorical column.
    Cut {
        column: String,
        into: String,
        edges: Vec<f64>,
        labels: Vec<String>,
    },
    /// One-hot encode a column.
    Dummies {
        column: String,
        #[serde(default)]
        drop_first: bool,
    },
}

fn default_lag() -> usize {
    1
}

impl Step {
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let mut out = table.clone();
        match self {
            Step::Standardize { column, ddof } => {
                let vals = standardize(table.column(column)?.as_numeric()?, *ddof)?;
                out.replace_column(Column::numeric(column.as_str(), vals))?;
            }
            Step::Log1p { column } => {
                let vals = log1p(table.column(column)?.as_numeric()?)?;
                out.replace_column(Column::numeric(column.as_str(), vals))?;
            }
            Step::Difference { column, lag, into } => {
                let vals = lagged_difference(table.column(column)?.as_numeric()?, *lag)?;
                match into {
                    Some(into) => out.insert_column(Column::numeric(into.as_str(), vals))?,
                    None => {
                        out.replace_column(Column::numeric(column.as_str(), vals))?;
                    }
                }
            }
            Step::Cut {
                column,
                into,
                edges,
                labels,
            } => {
                let bins = cut(table.column(column)?.as_numeric()?, edges, labels)?;
                out.insert_column(Column::categorical(into.as_str(), bins))?;
            }
            Step::Dummies { column, drop_first } => {
                out = dummies(table, column, *drop_first)?;
            }
        }
        Ok(out)
    }
}

/// Z-score scaling of the present values; missing entries stay missing.
pub fn standardize(vals: &[Option<f64>], ddof: usize) -> Result<Vec<Option<f64>>> {
    let present: Vec<f64> = vals.iter().flatten().copied().collect();
    let mean = stats::mean(&present)?;
    let std_dev = stats::std_dev_with_ddof(&present, ddof)?;
    if std_dev == 0.0 {
        return Err(Error::InvalidArgument(
            "cannot standardize a constant column".to_string(),
        ));
    }
    Ok(vals
        .iter()
        .map(|val| val.map(|val| (val - mean) / std_dev))
        .collect())
}

/// `ln(1 + x)`, defined for `x > -1`.
pub fn log1p(vals: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    if let Some(bad) = vals.iter().flatten().find(|&&val| val <= -1.0) {
        return Err(Error::InvalidArgument(format!(
            "ln(1 + x) is undefined for {bad}"
        )));
    }
    Ok(vals.iter().map(|val| val.map(f64::ln_1p)).collect())
}

/// Lagged differences `x[i] - x[i - lag]`.
pub fn difference(vals: &[f64], lag: usize) -> Result<Vec<f64>> {
    if lag == 0 {
        return Err(Error::InvalidArgument("lag must be positive".to_string()));
    }
    if vals.len() <= lag {
        return Err(Error::InsufficientLength {
            op: "difference",
            len: vals.len(),
            required: lag + 1,
        });
    }
    Ok((lag..vals.len()).map(|i| vals[i] - vals[i - lag]).collect())
}

/// Lagged differences aligned with the input.
///
/// The first `lag` entries, and those where either operand is missing,
/// are missing.
pub fn lagged_difference(vals: &[Option<f64>], lag: usize) -> Result<Vec<Option<f64>>> {
    if lag == 0 {
        return Err(Error::InvalidArgument("lag must be positive".to_string()));
    }
    Ok((0..vals.len())
        .map(|i| {
            let prev = vals[i.checked_sub(lag)?]?;
            Some(vals[i]? - prev)
        })
        .collect())
}

/// Split rows into shuffled train and test tables.
///
/// The test table receives `ceil(test_fraction * n_rows)` rows. Both parts
/// must be non-empty. Row labels travel with their rows.
pub fn train_test_split(table: &Table, test_fraction: f64, seed: u64) -> Result<(Table, Table)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(Error::InvalidArgument(format!(
            "test fraction must lie in (0, 1), but is {test_fraction}"
        )));
    }
    let n_rows = table.n_rows();
    let n_test = (test_fraction * n_rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(Error::InvalidArgument(format!(
            "test fraction {test_fraction} leaves an empty part of {n_rows} rows"
        )));
    }

    let mut rows: Vec<usize> = (0..n_rows).collect();
    rows.shuffle(&mut ChaCha12Rng::seed_from_u64(seed));
    let (test_rows, train_rows) = rows.split_at(n_test);
    Ok((table.take_rows(train_rows), table.take_rows(test_rows)))
}

/// Assign each value to a right-closed bin `(edges[k], edges[k + 1]]`.
///
/// Values outside every bin become missing.
pub fn cut(vals: &[Option<f64>], edges: &[f64], labels: &[String]) -> Result<Vec<Option<String>>> {
    if edges.len() < 2 || labels.len() + 1 != edges.len() {
        return Err(Error::InvalidArgument(format!(
            "{} edges cannot hold {} labels",
            edges.len(),
            labels.len()
        )));
    }
    if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::InvalidArgument(
            "bin edges must be strictly increasing".to_string(),
        ));
    }
    Ok(vals
        .iter()
        .map(|val| {
            let val = (*val)?;
            edges
                .windows(2)
                .position(|pair| pair[0] < val && val <= pair[1])
                .map(|i_bin| labels[i_bin].clone())
        })
        .collect())
}

/// Replace `column` by one 0/1 indicator column per distinct level.
///
/// Indicators are named `{column}_{level}` and ordered by level; a missing
/// entry is 0 in every indicator. With `drop_first` the first level is
/// omitted.
pub fn dummies(table: &Table, column: &str, drop_first: bool) -> Result<Table> {
    let source = table.column(column)?;
    let levels: Vec<Option<String>> = match source.data() {
        ColumnData::Numeric(vals) => vals.iter().map(|val| val.map(format_level)).collect(),
        ColumnData::Categorical(vals) => vals.to_vec(),
        ColumnData::Datetime(_) => {
            return Err(Error::TypeMismatch {
                column: column.to_string(),
                expected: "numeric or categorical",
                found: "datetime",
            });
        }
    };
    let distinct: BTreeSet<&String> = levels.iter().flatten().collect();

    let mut out = table.clone();
    out.drop_column(column)?;
    for level in distinct.into_iter().skip(usize::from(drop_first)) {
        let indicator = levels
            .iter()
            .map(|val| Some(if val.as_ref() == Some(level) { 1.0 } else { 0.0 }))
            .collect();
        out.insert_column(Column::numeric(format!("{column}_{level}"), indicator))?;
    }
    Ok(out)
}

fn format_level(val: f64) -> String {
    if val.fract() == 0.0 && val.abs() < 1e15 {
        format!("{}", val as i64)
    } else {
        val.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_rewrite_the_table() {
        let table = Table::from_columns(vec![Column::numeric(
            "Age",
            vec![Some(25.0), Some(40.0), Some(58.0)],
        )])
        .unwrap();
        let step = Step::Cut {
            column: "Age".to_string(),
            into: "AgeGroup".to_string(),
            edges: vec![19.0, 30.0, 45.0, 60.0],
            labels: vec!["young".into(), "middle".into(), "senior".into()],
        };
        let binned = step.apply(&table).unwrap();
        let step = Step::Dummies {
            column: "AgeGroup".to_string(),
            drop_first: false,
        };
        let encoded = step.apply(&binned).unwrap();
        assert_eq!(
            encoded.column_names(),
            vec!["Age", "AgeGroup_middle", "AgeGroup_senior", "AgeGroup_young"]
        );
        let step = Step::Log1p {
            column: "Age".to_string(),
        };
        let logged = step.apply(&table).unwrap();
        let vals = logged.column("Age").unwrap().as_numeric().unwrap();
        assert!((vals[0].unwrap() - 26f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn standardize_centres_and_scales() {
        let scaled = standardize(&[Some(1.0), None, Some(3.0)], 0).unwrap();
        assert_eq!(scaled, vec![Some(-1.0), None, Some(1.0)]);
        assert!(standardize(&[Some(2.0), Some(2.0)], 0).is_err());
    }

    #[test]
    fn log1p_rejects_values_at_or_below_minus_one() {
        let out = log1p(&[Some(0.0), None]).unwrap();
        assert_eq!(out, vec![Some(0.0), None]);
        assert!(log1p(&[Some(-1.0)]).is_err());
    }

    #[test]
    fn difference_shortens_by_lag() {
        assert_eq!(difference(&[1.0, 4.0, 9.0, 16.0], 1).unwrap(), vec![3.0, 5.0, 7.0]);
        assert_eq!(difference(&[1.0, 4.0, 9.0, 16.0], 2).unwrap(), vec![8.0, 12.0]);
        assert!(difference(&[1.0], 1).is_err());
    }

    #[test]
    fn difference_step_keeps_row_count() {
        let table = Table::from_columns(vec![Column::numeric(
            "Passengers",
            vec![Some(112.0), Some(118.0), None, Some(129.0), Some(121.0)],
        )])
        .unwrap();
        let step: Step = toml::from_str(
            "kind = \"difference\"\ncolumn = \"Passengers\"\ninto = \"Passengers_diff\"\n",
        )
        .unwrap();
        let out = step.apply(&table).unwrap();
        assert_eq!(
            out.column("Passengers_diff").unwrap().as_numeric().unwrap(),
            &[None, Some(6.0), None, None, Some(-8.0)]
        );
        assert_eq!(out.column("Passengers").unwrap(), table.column("Passengers").unwrap());

        let seasonal = Step::Difference {
            column: "Passengers".to_string(),
            lag: 3,
            into: None,
        };
        let out = seasonal.apply(&table).unwrap();
        assert_eq!(
            out.column("Passengers").unwrap().as_numeric().unwrap(),
            &[None, None, None, Some(17.0), Some(3.0)]
        );
        assert!(lagged_difference(&[Some(1.0)], 0).is_err());
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let table = Table::from_columns(vec![Column::numeric(
            "x",
            (0..10).map(|i| Some(f64::from(i))).collect(),
        )])
        .unwrap();
        let (train, test) = train_test_split(&table, 0.2, 42).unwrap();
        assert_eq!((train.n_rows(), test.n_rows()), (8, 2));

        let mut seen: Vec<f64> = train
            .column("x")
            .unwrap()
            .present_values()
            .unwrap()
            .into_iter()
            .chain(test.column("x").unwrap().present_values().unwrap())
            .collect();
        seen.sort_by(f64::total_cmp);
        assert_eq!(seen, (0..10).map(f64::from).collect::<Vec<_>>());

        let again = train_test_split(&table, 0.2, 42).unwrap();
        assert_eq!(again, (train, test));
        assert!(train_test_split(&table, 0.0, 42).is_err());
        assert!(train_test_split(&table, 0.95, 42).is_err());
    }

    #[test]
    fn cut_uses_right_closed_bins() {
        let labels: Vec<String> = ["Underweight", "Normal", "Overweight", "Obese"]
            .iter()
            .map(|label| label.to_string())
            .collect();
        let edges = [0.0, 18.5, 24.9, 29.9, 100.0];
        let binned = cut(&[Some(18.5), Some(22.0), Some(35.0), Some(0.0), None], &edges, &labels)
            .unwrap();
        assert_eq!(
            binned,
            vec![
                Some("Underweight".to_string()),
                Some("Normal".to_string()),
                Some("Obese".to_string()),
                None,
                None
            ]
        );
        assert!(cut(&[Some(1.0)], &[0.0, 1.0], &labels).is_err());
    }

    #[test]
    fn dummies_drop_first_level() {
        let table = Table::from_columns(vec![
            Column::numeric("Glucose", vec![Some(90.0), Some(150.0), Some(120.0)]),
            Column::numeric("Outcome", vec![Some(0.0), Some(1.0), None]),
        ])
        .unwrap();
        let encoded = dummies(&table, "Outcome", true).unwrap();
        assert_eq!(encoded.column_names(), vec!["Glucose", "Outcome_1"]);
        assert_eq!(
            encoded.column("Outcome_1").unwrap().as_numeric().unwrap(),
            &[Some(0.0), Some(1.0), Some(0.0)]
        );
        let full = dummies(&table, "Outcome", false).unwrap();
        assert_eq!(full.n_columns(), 3);
    }
}
