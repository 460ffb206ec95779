use ndarray::{Array1, ArrayView1};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use crate::{
    data::SurvivalData,
    error::{Error, Result},
    optimization::efron_derivatives,
};

/// Harrell's C-index w/ tie handling - how often do higher risk scores = shorter survival?
pub fn harrell_c_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: &[bool],
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(Error::invalid_dimensions(
            "risk scores, times, and events must have same length"
        ));
    }

    let mut concordant = 0.0;
    let mut discordant = 0.0;
    let mut tied_risk = 0.0;

    for i in 0..n {
        if !events[i] {
            continue; // censored obs can't anchor a pair
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            // j is comparable to i if j outlived i (event or censored)
            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] < risk_scores[j] {
                    discordant += 1.0;
                } else {
                    tied_risk += 1.0;
                }
            }
        }
    }

    let total_pairs = concordant + discordant + tied_risk;
    if total_pairs == 0.0 {
        return Err(Error::numerical_error(
            "no comparable pairs for C-index calculation"
        ));
    }

    Ok((concordant + 0.5 * tied_risk) / total_pairs)
}

/// Efron log partial likelihood at `coefficients`
pub fn log_partial_likelihood(data: &SurvivalData, coefficients: ArrayView1<f64>) -> Result<f64> {
    let (loglik, _, _) = efron_derivatives(data, data.covariates(), coefficients)?;
    Ok(loglik)
}

/// partial AIC: -2 LL + 2k
pub fn aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    2.0 * n_parameters as f64 - 2.0 * log_likelihood
}

/// log-likelihood ratio test against beta = 0: (statistic, p-value)
pub fn likelihood_ratio_test(log_likelihood: f64, null_log_likelihood: f64, df: usize) -> Result<(f64, f64)> {
    if df == 0 {
        return Err(Error::invalid_parameter("df", "0"));
    }

    let statistic = (2.0 * (log_likelihood - null_log_likelihood)).max(0.0);
    let chi2 = ChiSquared::new(df as f64)
        .map_err(|e| Error::numerical_error(format!("chi-squared({df}): {e}")))?;
    Ok((statistic, chi2.sf(statistic)))
}

/// fit statistics printed w/ the model summary
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetrics {
    pub harrell_c_index: Option<f64>, // None w/o a single comparable pair
    pub log_likelihood: f64,
    pub partial_aic: f64,
    pub lr_statistic: f64,
    pub lr_df: usize,
    pub lr_p_value: f64,
}

impl ModelMetrics {
    /// Compute all metrics for fitted coefficients
    pub fn compute(data: &SurvivalData, coefficients: &Array1<f64>) -> Result<Self> {
        let risk_scores = data.covariates().dot(coefficients);
        let harrell_c_index = match harrell_c_index(risk_scores.view(), data.times(), data.events()) {
            Ok(c) => Some(c),
            Err(Error::NumericalError { .. }) => None,
            Err(e) => return Err(e),
        };

        let log_likelihood = log_partial_likelihood(data, coefficients.view())?;
        let null_log_likelihood = log_partial_likelihood(data, Array1::zeros(coefficients.len()).view())?;
        let (lr_statistic, lr_p_value) =
            likelihood_ratio_test(log_likelihood, null_log_likelihood, coefficients.len())?;

        Ok(Self {
            harrell_c_index,
            log_likelihood,
            partial_aic: aic(log_likelihood, coefficients.len()),
            lr_statistic,
            lr_df: coefficients.len(),
            lr_p_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use approx::assert_relative_eq;

    fn create_test_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true, false, true, true, false];
        let covariates = Array2::from_shape_vec((5, 2), vec![
            1.0, 2.0,
            0.0, 1.0,
            1.0, 0.0,
            -1.0, 1.0,
            0.0, -1.0,
        ]).unwrap();

        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_harrell_c_index() {
        let data = create_test_data();
        let risk_scores = Array1::from(vec![0.5, -0.2, 0.8, -0.1, -0.5]);
        let c = harrell_c_index(risk_scores.view(), data.times(), data.events()).unwrap();

        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn test_perfect_concordance() {
        let times = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let events = vec![true, true, true, true];
        let risk_scores = Array1::from(vec![4.0, 3.0, 2.0, 1.0]); // perfectly anti-correlated w/ time

        let c = harrell_c_index(risk_scores.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c, 1.0, epsilon = 1e-10);

        let flat = Array1::from(vec![1.0; 4]);
        let c = harrell_c_index(flat.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c, 0.5, epsilon = 1e-10);
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let risk_scores = Array1::from(vec![1.0, 2.0]);
        let times = Array1::from(vec![1.0, 2.0, 3.0]); // different length
        let events = vec![true, false];

        assert!(harrell_c_index(risk_scores.view(), times.view(), &events).is_err());
    }

    #[test]
    fn test_log_partial_likelihood_at_zero() {
        // no ties: sum over events of -ln |risk set| = -(ln 5 + ln 3 + ln 2)
        let data = create_test_data();
        let loglik = log_partial_likelihood(&data, Array1::zeros(2).view()).unwrap();
        assert_relative_eq!(loglik, -(30.0_f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_aic() {
        assert_relative_eq!(aic(-10.0, 3), 26.0);
    }

    #[test]
    fn test_likelihood_ratio_test() {
        // chi2(1) at 3.841459 -> p = 0.05
        let (stat, p) = likelihood_ratio_test(-8.0, -8.0 - 3.841_458_820_694_124 / 2.0, 1).unwrap();
        assert_relative_eq!(stat, 3.841_458_820_694_124, epsilon = 1e-9);
        assert_relative_eq!(p, 0.05, epsilon = 1e-6);
        assert!(likelihood_ratio_test(-1.0, -2.0, 0).is_err());
    }

    #[test]
    fn test_model_metrics() {
        let data = create_test_data();
        let metrics = ModelMetrics::compute(&data, &Array1::from(vec![0.3, -0.2])).unwrap();

        assert!((0.0..=1.0).contains(&metrics.harrell_c_index.unwrap()));
        assert!(metrics.log_likelihood.is_finite());
        assert_eq!(metrics.lr_df, 2);
        assert!(metrics.lr_p_value >= 0.0 && metrics.lr_p_value <= 1.0);
    }

    #[test]
    fn test_model_metrics_without_comparable_pairs() {
        // everyone dies the same day -> no pair can be ordered
        let covariates = Array2::from_shape_vec((3, 1), vec![0.0, 1.0, 2.0]).unwrap();
        let data = SurvivalData::new(vec![5.0; 3], vec![true; 3], covariates).unwrap();

        let metrics = ModelMetrics::compute(&data, &Array1::from(vec![0.4])).unwrap();
        assert_eq!(metrics.harrell_c_index, None);
        assert!(metrics.log_likelihood.is_finite());
    }
}
