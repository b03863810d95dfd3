//! Augmented Dickey-Fuller unit-root test with a constant term.
//!
//! The regression is `dy_t = a + g * y_{t-1} + sum_i b_i * dy_{t-i} + e_t`
//! and the statistic is the t-ratio of `g`. The number of lagged differences
//! is chosen by AIC over a common sample, then the regression is refitted on
//! every usable observation. Critical values follow MacKinnon (2010) and the
//! p-value MacKinnon (1994) response surfaces.

use crate::error::{Error, Result};
use crate::linalg;
use crate::special::normal_cdf;
use crate::stats;
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// Response surface `b0 + b1 / T + b2 / T^2 + b3 / T^3` at 1%, 5% and 10%.
const CRITICAL_SURFACES: [[f64; 4]; 3] = [
    [-3.43035, -6.5393, -16.786, -79.433],
    [-2.86154, -2.8903, -4.234, -40.040],
    [-2.56677, -1.5384, -2.809, 0.0],
];

const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub one_pct: f64,
    pub five_pct: f64,
    pub ten_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfTest {
    pub statistic: f64,
    pub p_value: f64,
    /// Lagged differences kept by the AIC search.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub n_obs: usize,
    pub critical_values: CriticalValues,
}

impl AdfTest {
    /// Unit root rejected at the 5% level.
    pub fn is_stationary(&self) -> bool {
        self.statistic < self.critical_values.five_pct
    }
}

/// Run the test on `vals`, searching lags `0..=max_lag`.
///
/// Without `max_lag` the bound is `ceil(12 * (n / 100)^(1/4))`, capped at
/// `n / 2 - 2`.
pub fn adf(vals: &[f64], max_lag: Option<usize>) -> Result<AdfTest> {
    stats::check_finite(vals, "adf")?;
    let n_vals = vals.len();
    let cap = (n_vals / 2).checked_sub(2).ok_or(Error::InsufficientLength {
        op: "adf",
        len: n_vals,
        required: 4,
    })?;
    let max_lag = match max_lag {
        Some(lag) if lag > cap => {
            return Err(Error::InvalidArgument(format!(
                "adf lag {lag} exceeds {cap} for {n_vals} values"
            )));
        }
        Some(lag) => lag,
        None => cap.min((12.0 * (n_vals as f64 / 100.0).powf(0.25)).ceil() as usize),
    };
    let diffs: Vec<f64> = vals.windows(2).map(|pair| pair[1] - pair[0]).collect();

    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let (design, target) = lag_design(vals, &diffs, lag, max_lag);
        let fit = linalg::regress(&design, &target, "adf")?;
        let n_obs = target.len() as f64;
        let aic = n_obs * (fit.rss / n_obs).ln() + 2.0 * (lag + 2) as f64;
        if best.is_none_or(|(best_aic, _)| aic < best_aic) {
            best = Some((aic, lag));
        }
    }
    let used_lag = best.map_or(0, |(_, lag)| lag);

    let (design, target) = lag_design(vals, &diffs, used_lag, used_lag);
    let fit = linalg::regress(&design, &target, "adf")?;
    let statistic = fit.coefs[1] / fit.std_errors[1];
    let n_obs = target.len();
    log::debug!("adf statistic {statistic:.4} with {used_lag} lags on {n_obs} observations");

    Ok(AdfTest {
        statistic,
        p_value: p_value(statistic),
        used_lag,
        n_obs,
        critical_values: critical_values(n_obs),
    })
}

/// Run the test on a complete numeric column.
pub fn adf_column(table: &Table, column: &str, max_lag: Option<usize>) -> Result<AdfTest> {
    let vals = table.column(column)?.complete_values()?;
    adf(&vals, max_lag)
}

/// Rows `[1, y_{t-1}, dy_{t-1}, .., dy_{t-lag}]` against `dy_t`, starting at
/// difference `start`.
fn lag_design(
    vals: &[f64],
    diffs: &[f64],
    lag: usize,
    start: usize,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let design: Vec<Vec<f64>> = (start..diffs.len())
        .map(|t| {
            [1.0, vals[t]]
                .into_iter()
                .chain((1..=lag).map(|i| diffs[t - i]))
                .collect()
        })
        .collect();
    (design, diffs[start..].to_vec())
}

fn critical_values(n_obs: usize) -> CriticalValues {
    let inv = 1.0 / n_obs as f64;
    let [one_pct, five_pct, ten_pct] = CRITICAL_SURFACES.map(|coefs| polyval(&coefs, inv));
    CriticalValues {
        one_pct,
        five_pct,
        ten_pct,
    }
}

fn p_value(statistic: f64) -> f64 {
    if statistic > TAU_MAX {
        1.0
    } else if statistic < TAU_MIN {
        0.0
    } else if statistic <= TAU_STAR {
        normal_cdf(polyval(&SMALL_P, statistic))
    } else {
        normal_cdf(polyval(&LARGE_P, statistic))
    }
}

/// `coefs[0] + coefs[1] * x + ...`
fn polyval(coefs: &[f64], x: f64) -> f64 {
    coefs.iter().rev().fold(0.0, |acc, coef| acc * x + coef)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use rand_distr::{Distribution, Normal};

    /// Monthly airline passengers, 1949 to 1960.
    const AIRLINE: [f64; 144] = [
        112., 118., 132., 129., 121., 135., 148., 148., 136., 119., 104., 118., 115., 126., 141.,
        135., 125., 149., 170., 170., 158., 133., 114., 140., 145., 150., 178., 163., 172., 178.,
        199., 199., 184., 162., 146., 166., 171., 180., 193., 181., 183., 218., 230., 242., 209.,
        191., 172., 194., 196., 196., 236., 235., 229., 243., 264., 272., 237., 211., 180., 201.,
        204., 188., 235., 227., 234., 264., 302., 293., 259., 229., 203., 229., 242., 233., 267.,
        269., 270., 315., 364., 347., 312., 274., 237., 278., 284., 277., 317., 313., 318., 374.,
        413., 405., 355., 306., 271., 306., 315., 301., 356., 348., 355., 422., 465., 467., 404.,
        347., 305., 336., 340., 318., 362., 348., 363., 435., 491., 505., 404., 359., 310., 337.,
        360., 342., 406., 396., 420., 472., 548., 559., 463., 407., 362., 405., 417., 391., 419.,
        461., 472., 535., 622., 606., 508., 461., 390., 432.,
    ];

    #[test]
    fn airline_levels_have_a_unit_root() {
        let test = adf(&AIRLINE, None).unwrap();
        assert_eq!(test.used_lag, 13);
        assert_eq!(test.n_obs, 130);
        assert!((test.statistic - 0.815_369).abs() < 1e-5);
        assert!((test.p_value - 0.991_880).abs() < 1e-4);
        assert!((test.critical_values.one_pct + 3.481_682).abs() < 1e-5);
        assert!((test.critical_values.five_pct + 2.884_042).abs() < 1e-5);
        assert!((test.critical_values.ten_pct + 2.578_770).abs() < 1e-5);
        assert!(!test.is_stationary());
    }

    #[test]
    fn airline_first_difference_is_borderline() {
        let diffs: Vec<f64> = AIRLINE.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let test = adf(&diffs, None).unwrap();
        assert_eq!(test.used_lag, 12);
        assert!((test.statistic + 2.829_267).abs() < 1e-5);
        assert!((test.p_value - 0.054_213).abs() < 1e-4);
    }

    #[test]
    fn white_noise_is_stationary() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let normal = Normal::<f64>::new(0.0, 1.0).unwrap();
        let vals: Vec<f64> = (0..200).map(|_| normal.sample(&mut rng)).collect();
        let test = adf(&vals, Some(4)).unwrap();
        assert!(test.is_stationary());
        assert!(test.p_value < 0.01);
    }

    #[test]
    fn rejects_short_or_bad_input() {
        assert!(matches!(
            adf(&[1.0, 2.0, 3.0], None),
            Err(Error::InsufficientLength { required: 4, .. })
        ));
        assert!(matches!(
            adf(&AIRLINE[..20], Some(9)),
            Err(Error::InvalidArgument(_))
        ));
        let mut vals = AIRLINE.to_vec();
        vals[3] = f64::NAN;
        assert!(matches!(adf(&vals, None), Err(Error::InvalidArgument(_))));
    }
}
