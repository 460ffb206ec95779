use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use crate::error::{Error, Result};

/// survival data - times, events, and patient covariates
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,              // time to event/censoring
    events: Vec<bool>,               // true = event, false = censored
    covariates: Array2<f64>,         // design matrix (n_samples x n_features)
    feature_names: Vec<String>,      // one per covariate column
    descending_order: Vec<usize>,    // sample indices, latest time first
}

impl SurvivalData {
    /// make new survival data from raw vecs/arrays; columns get x0, x1, ... names
    pub fn new(
        times: Vec<f64>,         // survival/censoring times
        events: Vec<bool>,       // true = event occurred, false = censored
        covariates: Array2<f64>, // design matrix
    ) -> Result<Self> {
        let names = (0..covariates.ncols()).map(|j| format!("x{j}")).collect();
        Self::with_feature_names(times, events, covariates, names)
    }

    pub fn with_feature_names(
        times: Vec<f64>,
        events: Vec<bool>,
        covariates: Array2<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(Error::invalid_dimensions(
                format!("times len ({}) != events len ({})", n_samples, events.len())
            ));
        }

        if covariates.nrows() != n_samples {
            return Err(Error::invalid_dimensions(
                format!("covariates rows ({}) != n_samples ({})", covariates.nrows(), n_samples)
            ));
        }

        if feature_names.len() != covariates.ncols() {
            return Err(Error::invalid_dimensions(
                format!("{} feature names for {} columns", feature_names.len(), covariates.ncols())
            ));
        }

        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(Error::invalid_survival_data(
                "survival times must be non-negative & finite"
            ));
        }

        if covariates.iter().any(|x| !x.is_finite()) {
            return Err(Error::invalid_survival_data("covariates must be finite"));
        }

        // risk set at t = everyone at or after t in this order, so the
        // optimizer can grow it w/ one pass
        let mut descending_order: Vec<usize> = (0..n_samples).collect();
        descending_order.sort_by(|&a, &b| times[b].total_cmp(&times[a]));

        Ok(Self {
            times: Array1::from(times),
            events,
            covariates,
            feature_names,
            descending_order,
        })
    }

    /// how many patients
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many covariates per patient
    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    /// survival/censoring times
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> &[bool] {
        &self.events
    }

    /// design matrix
    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// sample indices sorted by time, latest first
    pub fn descending_order(&self) -> &[usize] {
        &self.descending_order
    }

    /// column means - cox coefficients don't move under centering
    pub fn covariate_means(&self) -> Array1<f64> {
        self.covariates
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_features()))
    }

    /// design matrix w/ each column shifted to mean 0
    pub fn centered_covariates(&self) -> Array2<f64> {
        &self.covariates - &self.covariate_means()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true, false, true, true, false];
        let covariates = Array2::from_shape_vec((5, 2), vec![
            1.0, 2.0,
            3.0, 4.0,
            5.0, 6.0,
            7.0, 8.0,
            9.0, 10.0,
        ]).unwrap();

        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_survival_data_creation() {
        let data = create_test_data();
        assert_eq!(data.n_samples(), 5);
        assert_eq!(data.n_features(), 2);
        assert_eq!(data.n_events(), 3);
        assert_eq!(data.feature_names(), &["x0".to_string(), "x1".to_string()]);
        assert_eq!(data.descending_order(), &[4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_invalid_dimensions() {
        let times = vec![1.0, 2.0];
        let events = vec![true]; // wrong length
        let covariates = Array2::zeros((2, 2));

        assert!(SurvivalData::new(times, events, covariates).is_err());

        let names = vec!["age".to_string()]; // one name, two columns
        assert!(SurvivalData::with_feature_names(vec![1.0, 2.0], vec![true, true], Array2::zeros((2, 2)), names).is_err());
    }

    #[test]
    fn test_invalid_times() {
        let times = vec![-1.0, 2.0]; // negative time
        let events = vec![true, false];
        let covariates = Array2::zeros((2, 2));

        assert!(SurvivalData::new(times, events, covariates).is_err());
    }

    #[test]
    fn test_zero_time_allowed() {
        let data = SurvivalData::new(vec![0.0, 2.0], vec![true, false], Array2::zeros((2, 1))).unwrap();
        assert_eq!(data.n_events(), 1);
        assert_eq!(data.descending_order(), &[1, 0]);
    }

    #[test]
    fn test_centering() {
        let data = create_test_data();
        let means = data.covariate_means();
        assert_relative_eq!(means[0], 5.0, epsilon = 1e-10);
        assert_relative_eq!(means[1], 6.0, epsilon = 1e-10);

        let centered = data.centered_covariates();
        for j in 0..data.n_features() {
            assert_relative_eq!(centered.column(j).sum(), 0.0, epsilon = 1e-10);
        }
    }
}
