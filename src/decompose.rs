//! Classical seasonal decomposition by moving averages.

use crate::error::{Error, Result};
use crate::stats;
use crate::table::{Column, Index, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    /// `observed = trend + seasonal + residual`
    Additive,
    /// `observed = trend * seasonal * residual`
    Multiplicative,
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Additive => f.write_str("additive"),
            Model::Multiplicative => f.write_str("multiplicative"),
        }
    }
}

/// Trend, seasonal and residual components aligned with the input.
///
/// `trend` and `residual` are `None` for the first and last `period / 2`
/// positions, where the centred window does not fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub model: Model,
    pub period: usize,
    pub observed: Vec<f64>,
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<Option<f64>>,
}

impl Decomposition {
    /// One period of normalised seasonal factors, starting at position 0.
    pub fn seasonal_factors(&self) -> &[f64] {
        &self.seasonal[..self.period]
    }

    /// Recombine the components wherever the trend is defined.
    pub fn reconstruct(&self) -> Vec<Option<f64>> {
        self.trend
            .iter()
            .zip(&self.seasonal)
            .zip(&self.residual)
            .map(|((trend, &seasonal), residual)| {
                let (trend, residual) = ((*trend)?, (*residual)?);
                Some(match self.model {
                    Model::Additive => trend + seasonal + residual,
                    Model::Multiplicative => trend * seasonal * residual,
                })
            })
            .collect()
    }

    /// Components as a table sharing `index`.
    pub fn to_table(&self, index: Index) -> Result<Table> {
        Table::new(
            index,
            vec![
                Column::numeric("observed", self.observed.iter().copied().map(Some).collect()),
                Column::numeric("trend", self.trend.clone()),
                Column::numeric("seasonal", self.seasonal.iter().copied().map(Some).collect()),
                Column::numeric("residual", self.residual.clone()),
            ],
        )
    }
}

pub fn decompose(vals: &[f64], period: usize, model: Model) -> Result<Decomposition> {
    if period < 2 {
        return Err(Error::InvalidArgument(format!(
            "seasonal period must be at least 2, but is {period}"
        )));
    }
    stats::check_finite(vals, "decompose")?;
    let n_vals = vals.len();
    if n_vals < 2 * period {
        return Err(Error::InsufficientLength {
            op: "decompose",
            len: n_vals,
            required: 2 * period,
        });
    }
    if model == Model::Multiplicative && vals.iter().any(|&val| val <= 0.0) {
        return Err(Error::InvalidArgument(
            "multiplicative model requires strictly positive values".to_string(),
        ));
    }

    let trend = centered_moving_average(vals, period);

    let detrended: Vec<Option<f64>> = vals
        .iter()
        .zip(&trend)
        .map(|(&val, trend)| trend.map(|trend| remove(model, val, trend)))
        .collect();

    let mut factors: Vec<f64> = (0..period)
        .map(|phase| {
            let phase_vals: Vec<f64> = detrended
                .iter()
                .skip(phase)
                .step_by(period)
                .flatten()
                .copied()
                .collect();
            phase_vals.iter().sum::<f64>() / phase_vals.len() as f64
        })
        .collect();
    let factor_mean = factors.iter().sum::<f64>() / period as f64;
    for factor in factors.iter_mut() {
        *factor = remove(model, *factor, factor_mean);
    }

    let seasonal: Vec<f64> = (0..n_vals).map(|i| factors[i % period]).collect();

    let residual = vals
        .iter()
        .zip(&trend)
        .zip(&seasonal)
        .map(|((&val, trend), &seasonal)| {
            trend.map(|trend| match model {
                Model::Additive => val - trend - seasonal,
                Model::Multiplicative => val / (trend * seasonal),
            })
        })
        .collect();

    Ok(Decomposition {
        model,
        period,
        observed: vals.to_vec(),
        trend,
        seasonal,
        residual,
    })
}

/// Decompose a complete numeric column of `table`.
///
/// Without an explicit period, it is inferred from the table's timestamp
/// index.
pub fn decompose_column(
    table: &Table,
    column: &str,
    period: Option<usize>,
    model: Model,
) -> Result<Decomposition> {
    let vals = table.column(column)?.complete_values()?;
    let period = match period {
        Some(period) => period,
        None => infer_period(table.index()).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "cannot infer a seasonal period for {column:?}; set one explicitly"
            ))
        })?,
    };
    decompose(&vals, period, model)
}

/// Seasonal period implied by the spacing of a timestamp index.
pub fn infer_period(index: &Index) -> Option<usize> {
    index.frequency()?.seasonal_period()
}

/// Centred moving average of width `period`.
///
/// Even widths use the `[0.5, 1, ..., 1, 0.5] / period` filter so the window
/// stays centred on each point.
pub fn centered_moving_average(vals: &[f64], period: usize) -> Vec<Option<f64>> {
    let n_vals = vals.len();
    let half = period / 2;
    let mut trend = vec![None; n_vals];
    if n_vals < 2 * half + 1 {
        return trend;
    }
    for i in half..n_vals - half {
        let sum = if period % 2 == 0 {
            0.5 * vals[i - half]
                + vals[i - half + 1..i + half].iter().sum::<f64>()
                + 0.5 * vals[i + half]
        } else {
            vals[i - half..=i + half].iter().sum::<f64>()
        };
        trend[i] = Some(sum / period as f64);
    }
    trend
}

fn remove(model: Model, val: f64, part: f64) -> f64 {
    match model {
        Model::Additive => val - part,
        Model::Multiplicative => val / part,
    }
}
