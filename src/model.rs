use std::fmt::Write as _;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{info, warn};

use crate::{
    data::SurvivalData,
    design::validate_design,
    error::{Error, Result},
    metrics::ModelMetrics,
    optimization::{invert_matrix, CoxOptimizer, OptimizationConfig},
};

/// what a fit leaves behind
#[derive(Debug, Clone)]
struct FittedState {
    coefficients: Array1<f64>,
    standard_errors: Array1<f64>,
    log_likelihood: f64,
    null_log_likelihood: f64,
    iterations: usize,
    converged: bool,
    metrics: ModelMetrics,
}

/// cox proportional hazards model w/ efron ties and optional ridge
#[derive(Debug, Clone)]
pub struct CoxModel {
    l2_penalty: f64,                    // ridge penalty
    max_iterations: usize,              // newton step limit
    tolerance: f64,                     // on max |delta beta|
    alpha: f64,                         // significance level for flags & CIs
    feature_names: Option<Vec<String>>, // overrides the data's names
    fitted: Option<FittedState>,
}

impl Default for CoxModel {
    fn default() -> Self {
        Self {
            l2_penalty: 0.0,
            max_iterations: 100,
            tolerance: 1e-7,
            alpha: 0.05,
            feature_names: None,
            fitted: None,
        }
    }
}

impl CoxModel {
    /// new cox model w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// add ridge penalty (L2) - shrinks coefficients
    pub fn with_l2_penalty(mut self, penalty: f64) -> Self {
        self.l2_penalty = penalty.max(0.0);
        self
    }

    /// max newton steps before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// how close is close enough for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// significance level used by the summary
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// give names to your features for nicer output
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    fn names_for(&self, data: &SurvivalData) -> Result<Vec<String>> {
        match &self.feature_names {
            Some(names) if names.len() != data.n_features() => Err(Error::invalid_dimensions(format!(
                "{} feature names for {} covariates",
                names.len(),
                data.n_features()
            ))),
            Some(names) => Ok(names.clone()),
            None => Ok(data.feature_names().to_vec()),
        }
    }

    /// fit the model to data - this does the actual work
    ///
    /// Refuses zero-variance or collinear designs. Hitting the iteration limit
    /// is not an error: the model is still fitted, `converged()` is false.
    pub fn fit(&mut self, data: &SurvivalData) -> Result<&mut Self> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::invalid_parameter("alpha", self.alpha.to_string()));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(Error::invalid_parameter("tolerance", self.tolerance.to_string()));
        }

        let names = self.names_for(data)?;
        validate_design(data.covariates(), &names)?;

        let optimizer = CoxOptimizer::new(OptimizationConfig {
            l2_penalty: self.l2_penalty,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            ..Default::default()
        });
        let result = optimizer.optimize(data)?;

        if !result.converged {
            warn!(
                iterations = result.iterations,
                "cox fit did not converge, coefficients may be unreliable"
            );
        }

        // SEs off the inverse information; NaN if it can't be inverted
        let standard_errors = match invert_matrix(&result.information) {
            Ok(covariance) => covariance.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { f64::NAN }),
            Err(e) => {
                warn!(error = %e, "information matrix not invertible, standard errors unavailable");
                Array1::from_elem(data.n_features(), f64::NAN)
            }
        };

        let metrics = ModelMetrics::compute(data, &result.coefficients)?;
        info!(
            samples = data.n_samples(),
            events = data.n_events(),
            iterations = result.iterations,
            converged = result.converged,
            concordance = ?metrics.harrell_c_index,
            "fitted cox model"
        );

        self.feature_names = Some(names);
        self.fitted = Some(FittedState {
            coefficients: result.coefficients,
            standard_errors,
            log_likelihood: result.log_likelihood,
            null_log_likelihood: result.null_log_likelihood,
            iterations: result.iterations,
            converged: result.converged,
            metrics,
        });

        Ok(self)
    }

    fn state(&self) -> Result<&FittedState> {
        self.fitted.as_ref().ok_or(Error::ModelNotFitted)
    }

    /// get the fitted coefficients (betas)
    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.state()?.coefficients.view())
    }

    pub fn standard_errors(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.state()?.standard_errors.view())
    }

    /// false when the fit stopped on the iteration limit or a singular step
    pub fn converged(&self) -> Result<bool> {
        Ok(self.state()?.converged)
    }

    pub fn iterations(&self) -> Result<usize> {
        Ok(self.state()?.iterations)
    }

    /// predict risk scores (linear predictors) for new patients
    pub fn predict(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let coefs = self.coefficients()?;

        if covariates.ncols() != coefs.len() {
            return Err(Error::invalid_dimensions(
                format!("feature count mismatch: expected {}, got {}",
                       coefs.len(), covariates.ncols())
            ));
        }

        Ok(covariates.dot(&coefs))  // linear combination
    }

    /// predict hazard ratios (exp of risk scores)
    pub fn predict_hazard_ratios(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let linear_predictors = self.predict(covariates)?;
        Ok(linear_predictors.mapv(f64::exp))
    }

    /// has this model been fit to data yet?
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// per-covariate table plus fit statistics
    pub fn summary(&self) -> Result<CoxModelSummary> {
        let state = self.state()?;
        let names = self.feature_names.clone().unwrap_or_default();

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| Error::numerical_error(format!("standard normal: {e}")))?;
        let z_crit = normal.inverse_cdf(1.0 - self.alpha / 2.0);

        let rows = names
            .into_iter()
            .zip(state.coefficients.iter().zip(state.standard_errors.iter()))
            .map(|(covariate, (&coef, &se))| {
                let z = coef / se;
                let p_value = 2.0 * normal.sf(z.abs());
                CoefficientSummary {
                    covariate,
                    coef,
                    exp_coef: coef.exp(),
                    se,
                    z,
                    p_value,
                    ci_lower: coef - z_crit * se,
                    ci_upper: coef + z_crit * se,
                    significant: p_value < self.alpha,
                }
            })
            .collect();

        Ok(CoxModelSummary {
            rows,
            log_likelihood: state.log_likelihood,
            null_log_likelihood: state.null_log_likelihood,
            iterations: state.iterations,
            converged: state.converged,
            l2_penalty: self.l2_penalty,
            alpha: self.alpha,
            metrics: state.metrics.clone(),
        })
    }
}

/// one covariate's row of the summary table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientSummary {
    pub covariate: String,
    pub coef: f64,
    pub exp_coef: f64,      // hazard ratio
    pub se: f64,
    pub z: f64,
    pub p_value: f64,
    pub ci_lower: f64,      // of coef, at 1 - alpha
    pub ci_upper: f64,
    pub significant: bool,  // p < alpha
}

/// what the model learned
#[derive(Debug, Clone)]
pub struct CoxModelSummary {
    pub rows: Vec<CoefficientSummary>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
    pub l2_penalty: f64,
    pub alpha: f64,
    pub metrics: ModelMetrics,
}

impl CoxModelSummary {
    pub fn row(&self, covariate: &str) -> Option<&CoefficientSummary> {
        self.rows.iter().find(|r| r.covariate == covariate)
    }

    /// fixed-width text table
    pub fn render(&self) -> String {
        let mut out = String::new();
        let confidence = (1.0 - self.alpha) * 100.0;

        // writing into a String can't fail
        let _ = writeln!(out, "cox proportional hazards model summary");
        let _ = writeln!(out, "=====================================");
        let _ = writeln!(out, "ties: efron");
        let _ = writeln!(out, "l2 penalty (ridge): {:.6}", self.l2_penalty);
        let _ = writeln!(out, "iterations: {}", self.iterations);
        let _ = writeln!(out, "converged: {}", self.converged);
        if !self.converged {
            let _ = writeln!(out, "WARNING: fit did not converge, estimates may be unreliable");
        }
        let _ = writeln!(out, "log partial likelihood: {:.4}", self.log_likelihood);
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "{:<20} {:>10} {:>10} {:>10} {:>8} {:>9} {:>10} {:>10}",
            "covariate", "coef", "exp(coef)", "se(coef)", "z", "p",
            format!("lower {confidence:.0}%"), format!("upper {confidence:.0}%"),
        );
        let _ = writeln!(out, "{:-<94}", "");
        for r in &self.rows {
            let _ = writeln!(
                out,
                "{:<20} {:>10.4} {:>10.4} {:>10.4} {:>8.3} {:>9.4} {:>10.4} {:>10.4}{}",
                r.covariate, r.coef, r.exp_coef, r.se, r.z, r.p_value, r.ci_lower, r.ci_upper,
                if r.significant { " *" } else { "" },
            );
        }

        let m = &self.metrics;
        let _ = writeln!(out);
        let concordance = m
            .harrell_c_index
            .map_or_else(|| "n/a (no comparable pairs)".to_string(), |c| format!("{c:.4}"));
        let _ = writeln!(out, "concordance: {concordance}");
        let _ = writeln!(out, "partial AIC: {:.4}", m.partial_aic);
        let _ = writeln!(
            out,
            "log-likelihood ratio test: {:.4} on {} df, p = {:.4e}",
            m.lr_statistic, m.lr_df, m.lr_p_value
        );
        out
    }

    /// print out what we learned
    pub fn print(&self) {
        print!("{}", self.render());
    }
}
