//! Johansen cointegration rank test (trace and maximum-eigenvalue forms).
//!
//! Reduced-rank regression: ΔY_t and Y_{t-1} are each residualized on a
//! constant and p lagged differences, the cross-moment matrices S00, S01,
//! S11 are formed, and the generalized eigenproblem
//!
//! ```text
//! S10 · S00⁻¹ · S01 · v = λ · S11 · v
//! ```
//!
//! is reduced to a symmetric one through the Cholesky factor of S11. The
//! trace statistic for rank ≤ r is `-T · Σ_{i>r} ln(1-λ_i)`; the
//! max-eigenvalue statistic is `-T · ln(1-λ_{r+1})`. Critical values are the
//! 95% MacKinnon–Haug–Michelis tabulations for the unrestricted-constant
//! case, indexed by the number of non-cointegrating directions k − r.

use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};

use crate::error::AppError;
use crate::math::solve_least_squares;

/// 95% trace critical values for k − r = 1..=6 (unrestricted constant).
const TRACE_CV_95: [f64; 6] = [3.8415, 15.4947, 29.7976, 47.8561, 69.8189, 95.7537];

/// 95% max-eigenvalue critical values for k − r = 1..=6.
const MAXEIG_CV_95: [f64; 6] = [3.8415, 14.2646, 21.1314, 27.5843, 33.8777, 40.0763];

/// One row of the rank-test table: the statistics for H0: rank ≤ r.
#[derive(Debug, Clone, Copy)]
pub struct RankStat {
    pub rank: usize,
    pub statistic: f64,
    pub critical_95: f64,
    /// True when H0 is rejected at 5%.
    pub rejected: bool,
}

#[derive(Debug, Clone)]
pub struct JohansenResult {
    pub variables: Vec<String>,
    /// Eigenvalues sorted descending.
    pub eigenvalues: Vec<f64>,
    pub trace: Vec<RankStat>,
    pub max_eigen: Vec<RankStat>,
    /// Inferred cointegration rank: smallest r whose trace statistic fails
    /// to reject.
    pub rank: usize,
    /// Candidate cointegrating vectors (columns, same order as the
    /// eigenvalues; un-normalized).
    pub eigenvectors: DMatrix<f64>,
    pub nobs: usize,
    pub lag_order: usize,
}

/// Run the rank test on `levels` (rows = time, columns = variables) with
/// `lag_order` lagged differences.
pub fn johansen_test(
    variables: &[String],
    levels: &DMatrix<f64>,
    lag_order: usize,
) -> Result<JohansenResult, AppError> {
    let t_total = levels.nrows();
    let k = levels.ncols();
    if k < 2 {
        return Err(AppError::config(
            "Johansen test needs at least two variables.",
        ));
    }
    if k > TRACE_CV_95.len() {
        return Err(AppError::config(format!(
            "No critical values tabulated for {k}-variable systems."
        )));
    }
    if lag_order < 1 {
        return Err(AppError::config("Johansen lag order must be at least 1."));
    }
    let n_eff = t_total
        .saturating_sub(1)
        .saturating_sub(lag_order);
    if n_eff < 8 * k {
        return Err(AppError::insufficient(format!(
            "Only {n_eff} effective observations for a {k}-variable rank test."
        )));
    }

    // First differences: dy[t] = y[t+1] - y[t].
    let dy = DMatrix::from_fn(t_total - 1, k, |t, j| levels[(t + 1, j)] - levels[(t, j)]);

    // Design of the residualization: constant + p lagged differences.
    let p = lag_order;
    let m = 1 + k * p;
    let mut z0 = DMatrix::<f64>::zeros(n_eff, k);
    let mut z1 = DMatrix::<f64>::zeros(n_eff, k);
    let mut z2 = DMatrix::<f64>::zeros(n_eff, m);
    for (row, t) in (p..dy.nrows()).enumerate() {
        for j in 0..k {
            z0[(row, j)] = dy[(t, j)];
            z1[(row, j)] = levels[(t, j)];
        }
        z2[(row, 0)] = 1.0;
        for lag in 1..=p {
            for j in 0..k {
                z2[(row, 1 + (lag - 1) * k + j)] = dy[(t - lag, j)];
            }
        }
    }

    let r0 = residualize(&z0, &z2)?;
    let r1 = residualize(&z1, &z2)?;

    let scale = 1.0 / n_eff as f64;
    let s00 = r0.transpose() * &r0 * scale;
    let s11 = r1.transpose() * &r1 * scale;
    let s01 = r0.transpose() * &r1 * scale;
    let s10 = s01.transpose();

    let s00_inv = Cholesky::new(s00)
        .ok_or_else(|| AppError::insufficient("S00 moment matrix is not positive definite."))?
        .inverse();
    let chol_s11 = Cholesky::new(s11)
        .ok_or_else(|| AppError::insufficient("S11 moment matrix is not positive definite."))?;
    let l = chol_s11.l();
    let l_inv = l
        .solve_lower_triangular(&DMatrix::identity(k, k))
        .ok_or_else(|| AppError::insufficient("Cholesky factor of S11 is singular."))?;

    let core = &l_inv * &s10 * &s00_inv * &s01 * l_inv.transpose();
    let sym = (&core + core.transpose()) * 0.5;
    let eig = SymmetricEigen::new(sym);

    // Sort eigenpairs descending and map eigenvectors back: v = L⁻ᵀ u.
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .partial_cmp(&eig.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eigenvalues: Vec<f64> = order
        .iter()
        .map(|&i| eig.eigenvalues[i].clamp(0.0, 1.0 - 1e-12))
        .collect();
    let mut eigenvectors = DMatrix::<f64>::zeros(k, k);
    for (col, &i) in order.iter().enumerate() {
        let u: DVector<f64> = eig.eigenvectors.column(i).into();
        let v = l_inv.transpose() * u;
        eigenvectors.set_column(col, &v);
    }

    // Trace and max-eigenvalue tables.
    let t_f = n_eff as f64;
    let mut trace = Vec::with_capacity(k);
    let mut max_eigen = Vec::with_capacity(k);
    for r in 0..k {
        let trace_stat: f64 = eigenvalues[r..].iter().map(|lam| -t_f * (1.0 - lam).ln()).sum();
        let max_stat = -t_f * (1.0 - eigenvalues[r]).ln();
        let trace_cv = TRACE_CV_95[k - r - 1];
        let max_cv = MAXEIG_CV_95[k - r - 1];
        trace.push(RankStat {
            rank: r,
            statistic: trace_stat,
            critical_95: trace_cv,
            rejected: trace_stat > trace_cv,
        });
        max_eigen.push(RankStat {
            rank: r,
            statistic: max_stat,
            critical_95: max_cv,
            rejected: max_stat > max_cv,
        });
    }

    // Inferred rank: first r whose trace statistic fails to reject.
    let rank = trace.iter().find(|s| !s.rejected).map(|s| s.rank).unwrap_or(k);

    Ok(JohansenResult {
        variables: variables.to_vec(),
        eigenvalues,
        trace,
        max_eigen,
        rank,
        eigenvectors,
        nobs: n_eff,
        lag_order,
    })
}

/// Column-wise residuals of `targets` on the design `design`.
fn residualize(targets: &DMatrix<f64>, design: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
    let mut out = targets.clone();
    for j in 0..targets.ncols() {
        let y: DVector<f64> = targets.column(j).into();
        let beta = solve_least_squares(design, &y)
            .ok_or_else(|| AppError::insufficient("Residualization regression is singular."))?;
        let fitted = design * beta;
        out.set_column(j, &(y - fitted));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Normal;

    fn rank_of_pair(seed: u64, cointegrated: bool) -> usize {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let n = 400;

        let mut w = vec![0.0f64];
        for t in 1..n {
            w.push(w[t - 1] + normal.sample(&mut rng));
        }

        let mut levels = DMatrix::<f64>::zeros(n, 2);
        if cointegrated {
            // x follows the common trend; y = 1.5x + stationary noise.
            for t in 0..n {
                levels[(t, 0)] = w[t];
                levels[(t, 1)] = 1.5 * w[t] + 0.5 * normal.sample(&mut rng);
            }
        } else {
            let mut w2 = vec![0.0f64];
            for t in 1..n {
                w2.push(w2[t - 1] + normal.sample(&mut rng));
            }
            for t in 0..n {
                levels[(t, 0)] = w[t];
                levels[(t, 1)] = w2[t];
            }
        }

        let names = vec!["x".to_string(), "y".to_string()];
        johansen_test(&names, &levels, 2).unwrap().rank
    }

    #[test]
    fn cointegrated_pair_recovers_positive_rank() {
        assert!(rank_of_pair(42, true) >= 1);
        assert!(rank_of_pair(43, true) >= 1);
    }

    #[test]
    fn independent_random_walks_recover_rank_zero() {
        assert_eq!(rank_of_pair(42, false), 0);
        assert_eq!(rank_of_pair(44, false), 0);
    }

    #[test]
    fn cointegrating_vector_has_the_injected_ratio() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let n = 600;
        let mut w = vec![0.0f64];
        for t in 1..n {
            w.push(w[t - 1] + normal.sample(&mut rng));
        }
        let mut levels = DMatrix::<f64>::zeros(n, 2);
        for t in 0..n {
            levels[(t, 0)] = w[t];
            levels[(t, 1)] = 1.5 * w[t] + 0.3 * normal.sample(&mut rng);
        }
        let names = vec!["x".to_string(), "y".to_string()];
        let result = johansen_test(&names, &levels, 2).unwrap();
        assert!(result.rank >= 1);

        // β'(x, y) stationary with y = 1.5x implies β_y/β_x ≈ -1/1.5.
        let beta = result.eigenvectors.column(0);
        let ratio = beta[1] / beta[0];
        assert!(
            (ratio + 1.0 / 1.5).abs() < 0.1,
            "cointegrating ratio off: {ratio}"
        );
    }

    #[test]
    fn one_variable_system_is_rejected() {
        let levels = DMatrix::<f64>::zeros(100, 1);
        let err = johansen_test(&["x".to_string()], &levels, 2).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
