use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::{debug, warn};
use crate::{
    data::SurvivalData,
    error::{Error, Result},
};

/// Configuration for Cox model optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub l2_penalty: f64,
    pub max_iterations: usize,
    pub tolerance: f64,       // on max |delta beta|
    pub max_step_halvings: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            l2_penalty: 0.0,
            max_iterations: 100,
            tolerance: 1e-7,
            max_step_halvings: 30,
        }
    }
}

/// What the optimizer hands back, converged or not
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub coefficients: Array1<f64>,
    /// negative hessian of the (penalized) log partial likelihood at `coefficients`
    pub information: Array2<f64>,
    /// unpenalized log partial likelihood at `coefficients`
    pub log_likelihood: f64,
    /// log partial likelihood at beta = 0
    pub null_log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Efron-corrected log partial likelihood, gradient and hessian at `beta`
///
/// Walks samples from the latest time backwards so the risk-set sums
/// (S0, S1, S2) grow by one row at a time. For a block of `d` tied events
/// with sums (T0, T1, T2) over just those events, the l-th of the `d`
/// denominators is `S0 - (l/d) T0`, likewise for S1 and S2.
pub(crate) fn efron_derivatives(
    data: &SurvivalData,
    covariates: ArrayView2<f64>,
    beta: ArrayView1<f64>,
) -> Result<(f64, Array1<f64>, Array2<f64>)> {
    let n_features = covariates.ncols();
    if beta.len() != n_features {
        return Err(Error::invalid_dimensions(
            format!("beta len ({}) != n_features ({})", beta.len(), n_features)
        ));
    }

    // shift by the max so exp() can't overflow; the shift cancels in every ratio
    let eta = covariates.dot(&beta);
    if eta.iter().any(|e| !e.is_finite()) {
        return Err(Error::numerical_error("non-finite linear predictor"));
    }
    let eta_max = eta.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let eta = eta.mapv(|e| e - eta_max);
    let weights = eta.mapv(f64::exp);

    let times = data.times();
    let events = data.events();
    let order = data.descending_order();
    let n = order.len();

    let mut loglik = 0.0;
    let mut gradient = Array1::zeros(n_features);
    let mut hessian = Array2::zeros((n_features, n_features));

    // risk set sums
    let mut s0 = 0.0;
    let mut s1 = Array1::<f64>::zeros(n_features);
    let mut s2 = Array2::<f64>::zeros((n_features, n_features));

    let mut start = 0;
    while start < n {
        let time = times[order[start]];

        // tied-event sums
        let mut t0 = 0.0;
        let mut t1 = Array1::<f64>::zeros(n_features);
        let mut t2 = Array2::<f64>::zeros((n_features, n_features));
        let mut n_tied = 0usize;

        let mut end = start;
        while end < n && times[order[end]] == time {
            let i = order[end];
            let w = weights[i];
            let x = covariates.row(i);

            s0 += w;
            s1.scaled_add(w, &x);
            add_weighted_outer(&mut s2, x, w);

            if events[i] {
                n_tied += 1;
                t0 += w;
                t1.scaled_add(w, &x);
                add_weighted_outer(&mut t2, x, w);
                loglik += eta[i];
                gradient += &x;
            }
            end += 1;
        }

        for l in 0..n_tied {
            let frac = l as f64 / n_tied as f64;
            let denom = s0 - frac * t0;
            if denom <= 0.0 || !denom.is_finite() {
                return Err(Error::numerical_error("risk set sum is non-positive"));
            }

            let mean = (&s1 - &(frac * &t1)) / denom;
            let second = (&s2 - &(frac * &t2)) / denom;

            loglik -= denom.ln();
            gradient -= &mean;
            hessian -= &second;
            add_weighted_outer(&mut hessian, mean.view(), 1.0);
        }

        start = end;
    }

    if !loglik.is_finite() {
        return Err(Error::numerical_error("log partial likelihood is not finite"));
    }

    Ok((loglik, gradient, hessian))
}

fn add_weighted_outer(acc: &mut Array2<f64>, x: ArrayView1<f64>, weight: f64) {
    let n = x.len();
    for j in 0..n {
        let wx = weight * x[j];
        for k in 0..n {
            acc[[j, k]] += wx * x[k];
        }
    }
}

/// Solve linear system Ax = b by gaussian elimination w/ partial pivoting
pub(crate) fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(Error::invalid_dimensions("Matrix dimensions mismatch"));
    }

    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return Err(Error::numerical_error("Matrix is singular"));
    }

    let mut a_copy = a.clone();
    let mut b_copy = b.clone();

    // Forward elimination
    for i in 0..n {
        // Find pivot
        let mut max_row = i;
        for k in i + 1..n {
            if a_copy[[k, i]].abs() > a_copy[[max_row, i]].abs() {
                max_row = k;
            }
        }

        if a_copy[[max_row, i]].abs() < 1e-14 * scale {
            return Err(Error::numerical_error("Matrix is singular"));
        }

        // Swap rows
        if max_row != i {
            for j in 0..n {
                a_copy.swap([i, j], [max_row, j]);
            }
            b_copy.swap(i, max_row);
        }

        // Eliminate
        for k in i + 1..n {
            let factor = a_copy[[k, i]] / a_copy[[i, i]];
            for j in i..n {
                a_copy[[k, j]] -= factor * a_copy[[i, j]];
            }
            b_copy[k] -= factor * b_copy[i];
        }
    }

    // Back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b_copy[i];
        for j in i + 1..n {
            x[i] -= a_copy[[i, j]] * x[j];
        }
        x[i] /= a_copy[[i, i]];
    }

    Ok(x)
}

/// Invert a square matrix one unit column at a time
pub(crate) fn invert_matrix(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut inverse = Array2::zeros((n, n));
    for j in 0..n {
        let mut unit = Array1::zeros(n);
        unit[j] = 1.0;
        let column = solve_linear_system(a, &unit)?;
        inverse.column_mut(j).assign(&column);
    }
    Ok(inverse)
}

/// Cox proportional hazards optimizer: Newton-Raphson w/ Efron ties and optional ridge
pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// penalized log-likelihood, gradient and hessian
    fn penalized(
        &self,
        data: &SurvivalData,
        covariates: ArrayView2<f64>,
        beta: &Array1<f64>,
    ) -> Result<(f64, Array1<f64>, Array2<f64>)> {
        let (loglik, mut gradient, mut hessian) = efron_derivatives(data, covariates, beta.view())?;
        let lambda = self.config.l2_penalty;
        if lambda > 0.0 {
            gradient.scaled_add(-lambda, beta);
            for i in 0..beta.len() {
                hessian[[i, i]] -= lambda;
            }
        }
        Ok((loglik - 0.5 * lambda * beta.dot(beta), gradient, hessian))
    }

    /// Newton-Raphson on mean-centred covariates.
    ///
    /// Every step solves `I(beta) delta = U(beta)`; if the likelihood drops the
    /// step is halved. Stops once `max |delta| < tolerance`. Running out of
    /// iterations (or hitting a singular information matrix) is not an error:
    /// the best coefficients come back w/ `converged = false`.
    pub fn optimize(&self, data: &SurvivalData) -> Result<OptimizationResult> {
        if data.n_events() == 0 {
            return Err(Error::invalid_survival_data("no observed events - nothing to fit"));
        }

        let covariates = data.centered_covariates();
        let x = covariates.view();
        let n_features = data.n_features();

        let mut beta = Array1::zeros(n_features);
        let (mut loglik, mut gradient, mut hessian) = self.penalized(data, x, &beta)?;
        let (null_log_likelihood, _, _) = efron_derivatives(data, x, beta.view())?;

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let information = -&hessian;
            let mut step = match solve_linear_system(&information, &gradient) {
                Ok(step) => step,
                Err(e) => {
                    warn!(iteration = iterations, error = %e, "information matrix singular, stopping early");
                    break;
                }
            };

            // convergence is judged on the full newton step, never a halved one
            let newton_delta = step.iter().fold(0.0_f64, |m, d| m.max(d.abs()));

            // step halving until the likelihood stops dropping
            let mut accepted = None;
            let mut halvings = 0;
            for _ in 0..=self.config.max_step_halvings {
                let candidate = &beta + &step;
                if let Ok((ll, g, h)) = self.penalized(data, x, &candidate) {
                    if ll >= loglik - 1e-12 * loglik.abs().max(1.0) {
                        accepted = Some((candidate, ll, g, h));
                        break;
                    }
                }
                step *= 0.5;
                halvings += 1;
            }

            let Some((candidate, ll, g, h)) = accepted else {
                warn!(iteration = iterations, "no step improves the likelihood, stopping early");
                break;
            };

            beta = candidate;
            loglik = ll;
            gradient = g;
            hessian = h;

            debug!(iteration = iterations, loglik, newton_delta, halvings, "newton step");

            if newton_delta < self.config.tolerance {
                converged = true;
                break;
            }
        }

        let (log_likelihood, _, _) = efron_derivatives(data, x, beta.view())?;

        Ok(OptimizationResult {
            coefficients: beta,
            information: -hessian,
            log_likelihood,
            null_log_likelihood,
            iterations,
            converged,
        })
    }
}
