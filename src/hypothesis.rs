//! Two-sided t-tests and one-way analysis of variance.

use crate::error::{Error, Result};
use crate::special::{f_survival, student_t_two_sided};
use crate::stats;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Statistic, two-sided p-value and degrees of freedom of a t-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTestOutcome {
    pub statistic: f64,
    pub p_value: f64,
    pub df: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnovaOutcome {
    pub statistic: f64,
    pub p_value: f64,
    pub df_between: f64,
    pub df_within: f64,
}

/// Test of `mean(vals) == popmean`.
pub fn one_sample_ttest(vals: &[f64], popmean: f64) -> Result<TTestOutcome> {
    check_sample(vals, "one-sample t-test")?;
    let n_vals = vals.len() as f64;
    let std_err = (stats::variance_with_ddof(vals, 1)? / n_vals).sqrt();
    t_outcome(stats::mean(vals)? - popmean, std_err, n_vals - 1.0)
}

/// Test of equal means of two independent samples.
///
/// `equal_var` pools the variances; otherwise Welch's statistic and the
/// Welch-Satterthwaite degrees of freedom are used.
pub fn independent_ttest(
    x_vals: &[f64],
    y_vals: &[f64],
    equal_var: bool,
) -> Result<TTestOutcome> {
    check_sample(x_vals, "independent t-test")?;
    check_sample(y_vals, "independent t-test")?;
    let (n_x, n_y) = (x_vals.len() as f64, y_vals.len() as f64);
    let (var_x, var_y) = (
        stats::variance_with_ddof(x_vals, 1)?,
        stats::variance_with_ddof(y_vals, 1)?,
    );
    let diff = stats::mean(x_vals)? - stats::mean(y_vals)?;

    if equal_var {
        let df = n_x + n_y - 2.0;
        let pooled = ((n_x - 1.0) * var_x + (n_y - 1.0) * var_y) / df;
        t_outcome(diff, (pooled * (1.0 / n_x + 1.0 / n_y)).sqrt(), df)
    } else {
        let (se_x, se_y) = (var_x / n_x, var_y / n_y);
        let df =
            (se_x + se_y).powi(2) / (se_x.powi(2) / (n_x - 1.0) + se_y.powi(2) / (n_y - 1.0));
        t_outcome(diff, (se_x + se_y).sqrt(), df)
    }
}

/// Test of zero mean difference between paired samples.
pub fn paired_ttest(x_vals: &[f64], y_vals: &[f64]) -> Result<TTestOutcome> {
    if x_vals.len() != y_vals.len() {
        return Err(Error::LengthMismatch {
            expected: x_vals.len(),
            found: y_vals.len(),
        });
    }
    let diffs: Vec<f64> = x_vals.iter().zip(y_vals).map(|(x, y)| x - y).collect();
    one_sample_ttest(&diffs, 0.0)
}

/// One-way ANOVA F-test of equal group means.
pub fn one_way_anova(groups: &[&[f64]]) -> Result<AnovaOutcome> {
    if groups.len() < 2 {
        return Err(Error::InvalidArgument(format!(
            "anova requires at least two groups, but got {}",
            groups.len()
        )));
    }
    for group in groups {
        if group.is_empty() {
            return Err(Error::EmptyInput { op: "anova" });
        }
        stats::check_finite(group, "anova")?;
    }
    let n_total: usize = groups.iter().map(|group| group.len()).sum();
    let n_groups = groups.len();
    if n_total <= n_groups {
        return Err(Error::InsufficientLength {
            op: "anova",
            len: n_total,
            required: n_groups + 1,
        });
    }

    let grand_mean = groups.iter().flat_map(|group| group.iter()).sum::<f64>() / n_total as f64;
    let (mut ss_between, mut ss_within) = (0.0, 0.0);
    for group in groups {
        let group_mean = stats::mean(group)?;
        ss_between += group.len() as f64 * (group_mean - grand_mean).powi(2);
        ss_within += group.iter().map(|val| (val - group_mean).powi(2)).sum::<f64>();
    }
    if ss_within == 0.0 {
        return Err(Error::InvalidArgument(
            "anova requires variation within groups".to_string(),
        ));
    }

    let df_between = (n_groups - 1) as f64;
    let df_within = (n_total - n_groups) as f64;
    let statistic = (ss_between / df_between) / (ss_within / df_within);
    Ok(AnovaOutcome {
        statistic,
        p_value: f_survival(statistic, df_between, df_within),
        df_between,
        df_within,
    })
}

/// A t-test over table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TTest {
    OneSample {
        column: String,
        popmean: f64,
    },
    /// Uses the present values of each column.
    Independent {
        x: String,
        y: String,
        #[serde(default = "default_equal_var")]
        equal_var: bool,
    },
    /// Uses the rows where both columns are present.
    Paired {
        x: String,
        y: String,
    },
}

fn default_equal_var() -> bool {
    true
}

impl TTest {
    pub fn run(&self, table: &Table) -> Result<TTestOutcome> {
        match self {
            TTest::OneSample { column, popmean } => {
                one_sample_ttest(&table.column(column)?.present_values()?, *popmean)
            }
            TTest::Independent { x, y, equal_var } => independent_ttest(
                &table.column(x)?.present_values()?,
                &table.column(y)?.present_values()?,
                *equal_var,
            ),
            TTest::Paired { x, y } => {
                let x_col = table.column(x)?.as_numeric()?;
                let y_col = table.column(y)?.as_numeric()?;
                let (x_vals, y_vals): (Vec<f64>, Vec<f64>) = x_col
                    .iter()
                    .zip(y_col)
                    .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                    .unzip();
                paired_ttest(&x_vals, &y_vals)
            }
        }
    }
}

impl fmt::Display for TTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TTest::OneSample { column, popmean } => {
                write!(f, "one-sample t-test of {column:?} against {popmean}")
            }
            TTest::Independent { x, y, .. } => write!(f, "independent t-test of {x:?} and {y:?}"),
            TTest::Paired { x, y } => write!(f, "paired t-test of {x:?} and {y:?}"),
        }
    }
}

/// An ANOVA over table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anova {
    /// Each column is one group of present values.
    Columns { columns: Vec<String> },
    /// Values of a numeric column grouped by the labels of another column.
    GroupBy { value: String, by: String },
}

impl Anova {
    pub fn run(&self, table: &Table) -> Result<AnovaOutcome> {
        let groups: Vec<Vec<f64>> = match self {
            Anova::Columns { columns } => columns
                .iter()
                .map(|name| table.column(name)?.present_values())
                .collect::<Result<_>>()?,
            Anova::GroupBy { value, by } => {
                let vals = table.column(value)?.as_numeric()?;
                let labels = table.column(by)?.as_categorical()?;
                let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
                for (val, label) in vals.iter().zip(labels) {
                    if let (Some(val), Some(label)) = (val, label) {
                        groups.entry(label.as_str()).or_default().push(*val);
                    }
                }
                groups.into_values().collect()
            }
        };
        let group_refs: Vec<&[f64]> = groups.iter().map(Vec::as_slice).collect();
        one_way_anova(&group_refs)
    }
}

impl fmt::Display for Anova {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anova::Columns { columns } => write!(f, "anova of {columns:?}"),
            Anova::GroupBy { value, by } => write!(f, "anova of {value:?} by {by:?}"),
        }
    }
}

fn check_sample(vals: &[f64], op: &'static str) -> Result<()> {
    if vals.len() < 2 {
        return Err(Error::InsufficientLength {
            op,
            len: vals.len(),
            required: 2,
        });
    }
    stats::check_finite(vals, op)
}

fn t_outcome(diff: f64, std_err: f64, df: f64) -> Result<TTestOutcome> {
    if std_err == 0.0 {
        return Err(Error::InvalidArgument(
            "t-test requires non-zero sample variance".to_string(),
        ));
    }
    let statistic = diff / std_err;
    Ok(TTestOutcome {
        statistic,
        p_value: student_t_two_sided(statistic, df),
        df,
    })
}
