//! ARIMA(p, d, q) estimation and multi-step forecasting.
//!
//! The model is fitted with the two-stage Hannan-Rissanen regression: a long
//! autoregression supplies innovation estimates, then the differenced series
//! is regressed on its own lags and the lagged innovations. Forecasts set
//! future innovations to zero and are integrated back through the
//! differencing levels.

use crate::error::{Error, Result};
use crate::linalg::{dot, least_squares};
use crate::stats;
use crate::table::{Column, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({}, {}, {})", self.p, self.d, self.q)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Arima {
    order: Order,
}

/// Estimated model together with the state needed to forecast from the end
/// of the fitted series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaFit {
    pub order: Order,
    pub constant: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    /// Innovation variance.
    pub sigma2: f64,
    /// In-sample one-step residuals of the final regression.
    pub residuals: Vec<f64>,
    diffed: Vec<f64>,
    innovations: Vec<f64>,
    tails: Vec<f64>,
}

impl Arima {
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    pub fn fit(&self, vals: &[f64]) -> Result<ArimaFit> {
        let Order { p, d, q } = self.order;
        stats::check_finite(vals, "arima")?;
        if vals.len() <= d {
            return Err(Error::InsufficientLength {
                op: "arima",
                len: vals.len(),
                required: d + 1,
            });
        }

        let mut tails = Vec::with_capacity(d);
        let mut diffed = vals.to_vec();
        for _ in 0..d {
            if let Some(&last) = diffed.last() {
                tails.push(last);
            }
            diffed = diffed.windows(2).map(|pair| pair[1] - pair[0]).collect();
        }
        let n_vals = diffed.len();
        let with_constant = d == 0;

        let (long_order, long_innovations) = if q > 0 {
            let long_order = 2 * (p + q) + 2;
            (long_order, long_autoregression(&diffed, long_order)?)
        } else {
            (0, vec![0.0; n_vals])
        };

        let start = if q > 0 { p.max(long_order + q) } else { p };
        let n_params = p + q + usize::from(with_constant);
        let required = start + n_params + 1;
        if n_vals < required {
            return Err(Error::InsufficientLength {
                op: "arima",
                len: n_vals,
                required,
            });
        }

        let design: Vec<Vec<f64>> = (start..n_vals)
            .map(|t| {
                let mut row = Vec::with_capacity(n_params);
                if with_constant {
                    row.push(1.0);
                }
                row.extend((1..=p).map(|lag| diffed[t - lag]));
                row.extend((1..=q).map(|lag| long_innovations[t - lag]));
                row
            })
            .collect();
        let target = &diffed[start..];
        let coefs = least_squares(&design, target, "arima")?;

        let (constant, rest) = if with_constant {
            (coefs[0], &coefs[1..])
        } else {
            (0.0, &coefs[..])
        };
        let (ar, ma) = rest.split_at(p);

        let residuals: Vec<f64> = design
            .iter()
            .zip(target)
            .map(|(row, &obs)| obs - dot(row, &coefs))
            .collect();
        let sigma2 = residuals.iter().map(|res| res * res).sum::<f64>() / residuals.len() as f64;

        let mut innovations = long_innovations;
        innovations[start..].copy_from_slice(&residuals);

        log::debug!(
            "fitted {} on {n_vals} values: constant = {constant}, ar = {ar:?}, ma = {ma:?}",
            self.order
        );

        Ok(ArimaFit {
            order: self.order,
            constant,
            ar: ar.to_vec(),
            ma: ma.to_vec(),
            sigma2,
            residuals,
            diffed,
            innovations,
            tails,
        })
    }
}

impl ArimaFit {
    /// Point forecasts for the `horizon` steps after the fitted series.
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        let mut history = self.diffed.clone();
        let mut innovations = self.innovations.clone();
        let mut levels = self.tails.clone();
        let mut out = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let n_hist = history.len();
            let ar_part: f64 = self
                .ar
                .iter()
                .enumerate()
                .map(|(i, coef)| coef * history[n_hist - 1 - i])
                .sum();
            let ma_part: f64 = self
                .ma
                .iter()
                .enumerate()
                .map(|(i, coef)| coef * innovations[n_hist - 1 - i])
                .sum();
            let next = self.constant + ar_part + ma_part;
            history.push(next);
            innovations.push(0.0);

            let mut level_val = next;
            for level in levels.iter_mut().rev() {
                *level += level_val;
                level_val = *level;
            }
            out.push(level_val);
        }
        out
    }
}

/// Fit `order` to a complete numeric column and forecast `horizon` steps.
///
/// The returned table carries the column's forecasts under its own name,
/// indexed by the continuation of the source index.
pub fn forecast_column(
    table: &Table,
    column: &str,
    order: Order,
    horizon: usize,
) -> Result<(ArimaFit, Table)> {
    let vals = table.column(column)?.complete_values()?;
    let fit = Arima::new(order).fit(&vals)?;
    let preds = fit.forecast(horizon);
    let out = Table::new(
        table.index().future(horizon),
        vec![Column::numeric(column, preds.into_iter().map(Some).collect())],
    )?;
    Ok((fit, out))
}

/// Residuals of a constant plus `order` lags regression; the first `order`
/// entries are zero.
fn long_autoregression(vals: &[f64], order: usize) -> Result<Vec<f64>> {
    let required = 2 * order + 2;
    if vals.len() < required {
        return Err(Error::InsufficientLength {
            op: "arima",
            len: vals.len(),
            required,
        });
    }
    let design: Vec<Vec<f64>> = (order..vals.len())
        .map(|t| {
            std::iter::once(1.0)
                .chain((1..=order).map(|lag| vals[t - lag]))
                .collect()
        })
        .collect();
    let coefs = least_squares(&design, &vals[order..], "arima long autoregression")?;

    let mut innovations = vec![0.0; vals.len()];
    for (t, row) in (order..vals.len()).zip(&design) {
        innovations[t] = vals[t] - dot(row, &coefs);
    }
    Ok(innovations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Index, parse_timestamp};
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use rand_distr::{Distribution, Normal};

    fn noisy_arma(n_vals: usize, phi: f64, theta: f64, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut vals = Vec::with_capacity(n_vals);
        let (mut prev, mut prev_eps) = (0.0, 0.0);
        for _ in 0..n_vals {
            let eps = normal.sample(&mut rng);
            let val = phi * prev + eps + theta * prev_eps;
            vals.push(val);
            prev = val;
            prev_eps = eps;
        }
        vals
    }

    #[test]
    fn recovers_noiseless_ar1() {
        let mut vals = vec![20.0];
        for _ in 0..39 {
            let prev = vals[vals.len() - 1];
            vals.push(2.0 + 0.6 * prev);
        }
        let order = Order { p: 1, d: 0, q: 0 };
        let fit = Arima::new(order).fit(&vals).unwrap();
        assert!((fit.ar[0] - 0.6).abs() < 1e-6);
        assert!((fit.constant - 2.0).abs() < 1e-5);

        let last = vals[vals.len() - 1];
        let preds = fit.forecast(2);
        assert!((preds[0] - (2.0 + 0.6 * last)).abs() < 1e-5);
    }

    #[test]
    fn random_walk_forecasts_last_value() {
        let vals = [3.0, 5.0, 4.0, 8.0, 7.0, 9.0];
        let fit = Arima::new(Order { p: 0, d: 1, q: 0 }).fit(&vals).unwrap();
        assert_eq!(fit.forecast(3), vec![9.0, 9.0, 9.0]);
    }

    #[test]
    fn second_difference_extends_a_line() {
        let vals: Vec<f64> = (0..10).map(|i| 1.0 + 3.0 * i as f64).collect();
        let fit = Arima::new(Order { p: 0, d: 2, q: 0 }).fit(&vals).unwrap();
        let preds = fit.forecast(2);
        assert!((preds[0] - 31.0).abs() < 1e-9);
        assert!((preds[1] - 34.0).abs() < 1e-9);
    }

    #[test]
    fn arma_estimates_are_close() {
        let vals = noisy_arma(2000, 0.5, 0.3, 7);
        let fit = Arima::new(Order { p: 1, d: 0, q: 1 }).fit(&vals).unwrap();
        assert!((fit.ar[0] - 0.5).abs() < 0.1);
        assert!((fit.ma[0] - 0.3).abs() < 0.1);
        assert!((fit.sigma2 - 1.0).abs() < 0.15);
        assert!(fit.forecast(5).iter().all(|pred| pred.is_finite()));
    }

    #[test]
    fn short_series_is_rejected() {
        let err = Arima::new(Order { p: 1, d: 1, q: 1 })
            .fit(&[1.0, 2.0, 3.0, 4.0])
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientLength { .. }));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut vals: Vec<f64> = (0..30).map(f64::from).collect();
        vals[10] = f64::INFINITY;
        let err = Arima::new(Order { p: 1, d: 1, q: 0 }).fit(&vals).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn constant_series_with_lags_is_singular() {
        let err = Arima::new(Order { p: 1, d: 0, q: 0 })
            .fit(&[5.0; 20])
            .unwrap_err();
        assert!(matches!(err, Error::SingularSystem { .. }));
    }

    #[test]
    fn column_forecast_continues_monthly_index() {
        let stamps: Vec<_> = (0..12)
            .map(|i| parse_timestamp(&format!("1960-{:02}", i + 1)).unwrap())
            .collect();
        let table = Table::new(
            Index::Timestamp(stamps),
            vec![Column::numeric(
                "Passengers",
                (0..12).map(|i| Some(100.0 + i as f64)).collect(),
            )],
        )
        .unwrap();
        let order = Order { p: 0, d: 1, q: 0 };
        let (_, out) = forecast_column(&table, "Passengers", order, 2).unwrap();
        assert_eq!(out.index().label(0), "1961-01-01");
        assert_eq!(
            out.column("Passengers").unwrap().as_numeric().unwrap(),
            &[Some(111.0), Some(111.0)]
        );
    }
}
