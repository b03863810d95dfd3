//! Detection and handling of missing entries.
//!
//! A plan is a list of [`ColumnPolicy`] entries. Fill policies are applied
//! column by column first; afterwards every row that is still missing in a
//! column whose policy is [`FillPolicy::DropRow`] is removed.

use crate::error::{Error, Result};
use crate::stats;
use crate::table::{Column, ColumnData, Table, parse_timestamp};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Constant used by [`FillPolicy::FillConstant`].
///
/// Text is parsed as a timestamp when it fills a datetime column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

/// What linear interpolation does with gaps before the first or after the
/// last known value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    #[default]
    Leave,
    Nearest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillPolicy {
    DropRow,
    FillConstant {
        value: Scalar,
    },
    FillMean,
    FillMedian,
    FillMode,
    ForwardFill,
    BackwardFill,
    Interpolate {
        #[serde(default)]
        edge: EdgePolicy,
    },
}

impl fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FillPolicy::DropRow => "drop_row",
            FillPolicy::FillConstant { .. } => "fill_constant",
            FillPolicy::FillMean => "fill_mean",
            FillPolicy::FillMedian => "fill_median",
            FillPolicy::FillMode => "fill_mode",
            FillPolicy::ForwardFill => "forward_fill",
            FillPolicy::BackwardFill => "backward_fill",
            FillPolicy::Interpolate { .. } => "interpolate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPolicy {
    pub column: String,
    pub policy: FillPolicy,
}

/// Apply a plan to a copy of `table`.
pub fn apply(table: &Table, plan: &[ColumnPolicy]) -> Result<Table> {
    let mut out = table.clone();
    let mut drop_subset = Vec::new();
    for ColumnPolicy { column, policy } in plan {
        if *policy == FillPolicy::DropRow {
            drop_subset.push(column.clone());
            continue;
        }
        fill_column(out.column_mut(column)?, policy)?;
    }
    if !drop_subset.is_empty() {
        out = drop_rows(&out, Some(&drop_subset))?;
    }
    Ok(out)
}

/// Apply a plan to `table`, which is left untouched if any policy fails.
pub fn apply_in_place(table: &mut Table, plan: &[ColumnPolicy]) -> Result<()> {
    *table = apply(table, plan)?;
    Ok(())
}

/// Remove rows with a missing value in any of `subset` (all columns if `None`).
pub fn drop_rows(table: &Table, subset: Option<&[String]>) -> Result<Table> {
    let columns: Vec<&Column> = match subset {
        None => table.columns().iter().collect(),
        Some(names) => names
            .iter()
            .map(|name| table.column(name))
            .collect::<Result<_>>()?,
    };
    let keep: Vec<bool> = (0..table.n_rows())
        .map(|row| columns.iter().all(|column| !column.data().is_missing(row)))
        .collect();
    table.filter(&keep)
}

/// Fill the missing entries of one column according to `policy`.
pub fn fill_column(column: &mut Column, policy: &FillPolicy) -> Result<()> {
    let name = column.name().to_string();
    let invalid = |reason: &str| Error::InvalidPolicy {
        column: name.clone(),
        policy: policy.to_string(),
        reason: reason.to_string(),
    };
    let empty = || Error::EmptyColumn {
        column: name.clone(),
    };

    match policy {
        FillPolicy::DropRow => Err(invalid("rows can only be dropped from a whole table")),
        FillPolicy::FillConstant { value } => match (column.data_mut(), value) {
            (ColumnData::Numeric(_), Scalar::Number(num)) if !num.is_finite() => {
                Err(invalid(&format!("constant {num} is not finite")))
            }
            (ColumnData::Numeric(vals), Scalar::Number(num)) => {
                fill_with(vals, *num);
                Ok(())
            }
            (ColumnData::Categorical(vals), Scalar::Text(text)) => {
                fill_with(vals, text.clone());
                Ok(())
            }
            (ColumnData::Datetime(vals), Scalar::Text(text)) => {
                let stamp = parse_timestamp(text)
                    .ok_or_else(|| invalid(&format!("{text:?} is not a timestamp")))?;
                fill_with(vals, stamp);
                Ok(())
            }
            (data, _) => Err(invalid(&format!(
                "constant {value:?} does not match a {} column",
                data.kind()
            ))),
        },
        FillPolicy::FillMean | FillPolicy::FillMedian => {
            let ColumnData::Numeric(vals) = column.data_mut() else {
                return Err(invalid("requires a numeric column"));
            };
            let present: Vec<f64> = vals.iter().flatten().copied().collect();
            if present.is_empty() {
                return Err(empty());
            }
            stats::check_finite(&present, name.as_str())?;
            let fill = if *policy == FillPolicy::FillMean {
                stats::mean(&present)?
            } else {
                stats::median(&present)?
            };
            fill_with(vals, fill);
            Ok(())
        }
        FillPolicy::FillMode => {
            match column.data_mut() {
                ColumnData::Numeric(vals) => {
                    let present: Vec<f64> = vals.iter().flatten().copied().collect();
                    if present.is_empty() {
                        return Err(empty());
                    }
                    let fill = stats::mode(&present)?;
                    fill_with(vals, fill);
                }
                ColumnData::Categorical(vals) => {
                    let fill = ordered_mode(vals).ok_or_else(empty)?;
                    fill_with(vals, fill);
                }
                ColumnData::Datetime(vals) => {
                    let fill = ordered_mode(vals).ok_or_else(empty)?;
                    fill_with(vals, fill);
                }
            }
            Ok(())
        }
        FillPolicy::ForwardFill => {
            match column.data_mut() {
                ColumnData::Numeric(vals) => forward_fill(vals),
                ColumnData::Categorical(vals) => forward_fill(vals),
                ColumnData::Datetime(vals) => forward_fill(vals),
            }
            Ok(())
        }
        FillPolicy::BackwardFill => {
            match column.data_mut() {
                ColumnData::Numeric(vals) => backward_fill(vals),
                ColumnData::Categorical(vals) => backward_fill(vals),
                ColumnData::Datetime(vals) => backward_fill(vals),
            }
            Ok(())
        }
        FillPolicy::Interpolate { edge } => {
            let ColumnData::Numeric(vals) = column.data_mut() else {
                return Err(invalid("requires a numeric column"));
            };
            interpolate_linear(vals, *edge);
            Ok(())
        }
    }
}

/// Propagate the last seen value forward; leading gaps stay missing.
pub fn forward_fill<T: Clone>(vals: &mut [Option<T>]) {
    let mut last: Option<T> = None;
    for val in vals.iter_mut() {
        match val {
            Some(seen) => last = Some(seen.clone()),
            None => *val = last.clone(),
        }
    }
}

/// Propagate the next seen value backward; trailing gaps stay missing.
pub fn backward_fill<T: Clone>(vals: &mut [Option<T>]) {
    let mut next: Option<T> = None;
    for val in vals.iter_mut().rev() {
        match val {
            Some(seen) => next = Some(seen.clone()),
            None => *val = next.clone(),
        }
    }
}

/// Fill interior gaps by linear interpolation on the row position.
pub fn interpolate_linear(vals: &mut [Option<f64>], edge: EdgePolicy) {
    let known: Vec<usize> = (0..vals.len()).filter(|&i| vals[i].is_some()).collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return;
    };

    for pair in known.windows(2) {
        let (i_lo, i_hi) = (pair[0], pair[1]);
        if let (Some(v_lo), Some(v_hi)) = (vals[i_lo], vals[i_hi]) {
            let span = (i_hi - i_lo) as f64;
            for i in i_lo + 1..i_hi {
                let frac = (i - i_lo) as f64 / span;
                vals[i] = Some(v_lo + (v_hi - v_lo) * frac);
            }
        }
    }

    if edge == EdgePolicy::Nearest {
        let (head, tail) = (vals[first], vals[last]);
        vals[..first].iter_mut().for_each(|val| *val = head);
        vals[last + 1..].iter_mut().for_each(|val| *val = tail);
    }
}

fn fill_with<T: Clone>(vals: &mut [Option<T>], fill: T) {
    for val in vals.iter_mut().filter(|val| val.is_none()) {
        *val = Some(fill.clone());
    }
}

/// Most frequent present value; ties resolve to the smallest one.
fn ordered_mode<T: Ord + Clone>(vals: &[Option<T>]) -> Option<T> {
    let mut counts: BTreeMap<&T, usize> = BTreeMap::new();
    for val in vals.iter().flatten() {
        *counts.entry(val).or_default() += 1;
    }
    let mut best: Option<(&T, usize)> = None;
    for (val, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((val, count));
        }
    }
    best.map(|(val, _)| val.clone())
}
