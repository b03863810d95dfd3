//! Dense least squares for the regression-based estimators.

use crate::error::{Error, Result};

/// Ordinary least squares fit with coefficient standard errors.
#[derive(Debug, Clone)]
pub(crate) struct Regression {
    pub coefs: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub rss: f64,
}

/// Ordinary least squares through the normal equations.
pub(crate) fn least_squares(
    design: &[Vec<f64>],
    target: &[f64],
    op: &'static str,
) -> Result<Vec<f64>> {
    let n_params = design.first().map_or(0, Vec::len);
    if n_params == 0 {
        return Ok(Vec::new());
    }
    let (xtx, xty) = normal_equations(design, target, n_params);
    solve(xtx, xty).ok_or(Error::SingularSystem { op })
}

/// Least squares plus residual sum of squares and standard errors.
///
/// Needs more observations than parameters.
pub(crate) fn regress(
    design: &[Vec<f64>],
    target: &[f64],
    op: &'static str,
) -> Result<Regression> {
    let n_obs = design.len();
    let n_params = design.first().map_or(0, Vec::len);
    if n_obs <= n_params {
        return Err(Error::InsufficientLength {
            op,
            len: n_obs,
            required: n_params + 1,
        });
    }

    let (xtx, xty) = normal_equations(design, target, n_params);
    let coefs = solve(xtx.clone(), xty).ok_or(Error::SingularSystem { op })?;
    let rss: f64 = design
        .iter()
        .zip(target)
        .map(|(row, &obs)| (obs - dot(row, &coefs)).powi(2))
        .sum();
    let sigma2 = rss / (n_obs - n_params) as f64;

    let mut std_errors = Vec::with_capacity(n_params);
    for j in 0..n_params {
        let mut unit = vec![0.0; n_params];
        unit[j] = 1.0;
        let inv_col = solve(xtx.clone(), unit).ok_or(Error::SingularSystem { op })?;
        std_errors.push((sigma2 * inv_col[j]).sqrt());
    }

    Ok(Regression {
        coefs,
        std_errors,
        rss,
    })
}

fn normal_equations(
    design: &[Vec<f64>],
    target: &[f64],
    n_params: usize,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut xtx = vec![vec![0.0; n_params]; n_params];
    let mut xty = vec![0.0; n_params];
    for (row, &obs) in design.iter().zip(target) {
        for i in 0..n_params {
            xty[i] += row[i] * obs;
            for j in 0..n_params {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    (xtx, xty)
}

/// Gaussian elimination with partial pivoting.
pub(crate) fn solve(mut mat: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n_rows = rhs.len();
    let scale = mat
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0, f64::max);
    let tol = f64::EPSILON * scale.max(1.0) * n_rows as f64;

    for col in 0..n_rows {
        let pivot =
            (col..n_rows).max_by(|&a, &b| mat[a][col].abs().total_cmp(&mat[b][col].abs()))?;
        if mat[pivot][col].abs() <= tol {
            return None;
        }
        mat.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in col + 1..n_rows {
            let factor = mat[row][col] / mat[col][col];
            for k in col..n_rows {
                mat[row][k] -= factor * mat[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut sol = vec![0.0; n_rows];
    for row in (0..n_rows).rev() {
        let tail: f64 = (row + 1..n_rows).map(|k| mat[row][k] * sol[k]).sum();
        sol[row] = (rhs[row] - tail) / mat[row][row];
    }
    Some(sol)
}

pub(crate) fn dot(a_vals: &[f64], b_vals: &[f64]) -> f64 {
    a_vals.iter().zip(b_vals).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_pivoted_system() {
        let mat = vec![vec![0.0, 2.0], vec![3.0, 1.0]];
        let sol = solve(mat, vec![4.0, 5.0]).unwrap();
        assert!((sol[0] - 1.0).abs() < 1e-12);
        assert!((sol[1] - 2.0).abs() < 1e-12);
        assert!(solve(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn regression_standard_errors_match_closed_form() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [2.0, 2.0, 6.0, 6.0];
        let design: Vec<Vec<f64>> = xs.iter().map(|&x| vec![1.0, x]).collect();
        let fit = regress(&design, &ys, "test").unwrap();

        assert!((fit.coefs[0] - 1.6).abs() < 1e-12);
        assert!((fit.coefs[1] - 1.6).abs() < 1e-12);
        assert!((fit.rss - 3.2).abs() < 1e-12);
        // sigma2 = 1.6, Sxx = 5
        let slope_se = (1.6_f64 / 5.0).sqrt();
        assert!((fit.std_errors[1] - slope_se).abs() < 1e-12);

        assert!(matches!(
            regress(&design[..2], &ys[..2], "test"),
            Err(Error::InsufficientLength { required: 3, .. })
        ));
    }
}
