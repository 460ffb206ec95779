//! patient records -> cox design matrix
//!
//! `age` stays continuous. sex / stage / treatment are one-hot encoded with
//! their levels sorted by name and the first level dropped as the reference,
//! so there is no intercept column and no dummy trap.

use ndarray::{Array1, Array2, ArrayView2};
use std::collections::BTreeSet;
use tracing::debug;

use crate::{
    data::SurvivalData,
    error::{Error, Result},
    records::Patient,
};

// relative residual below which a column counts as a combination of earlier ones
const RANK_TOLERANCE: f64 = 1e-10;

/// one categorical column: group prefix + the value of each row
struct Categorical {
    prefix: &'static str,
    values: Vec<String>,
}

impl Categorical {
    /// (column name, indicator column) for every non-reference level present
    fn dummies(&self) -> Vec<(String, Vec<f64>)> {
        let levels: BTreeSet<&str> = self.values.iter().map(String::as_str).collect();
        levels
            .into_iter()
            .skip(1) // reference level
            .map(|level| {
                let column = self.values.iter().map(|v| f64::from(u8::from(v == level))).collect();
                (format!("{}_{}", self.prefix, level), column)
            })
            .collect()
    }
}

/// design matrix + column names for the patient table
pub fn patient_design(patients: &[Patient]) -> Result<(Array2<f64>, Vec<String>)> {
    let mut columns: Vec<(String, Vec<f64>)> = vec![(
        "age".to_string(),
        patients.iter().map(|p| f64::from(p.age)).collect(),
    )];

    let groups = [
        Categorical { prefix: "sex", values: patients.iter().map(|p| p.sex.to_string()).collect() },
        Categorical { prefix: "stage", values: patients.iter().map(|p| p.stage.to_string()).collect() },
        Categorical { prefix: "treatment", values: patients.iter().map(|p| p.treatment.to_string()).collect() },
    ];
    for group in &groups {
        columns.extend(group.dummies());
    }

    let n_rows = patients.len();
    let mut matrix = Array2::zeros((n_rows, columns.len()));
    for (j, (_, values)) in columns.iter().enumerate() {
        matrix.column_mut(j).assign(&Array1::from(values.clone()));
    }

    let names: Vec<String> = columns.into_iter().map(|(name, _)| name).collect();
    debug!(rows = n_rows, columns = ?names, "built design matrix");
    Ok((matrix, names))
}

/// survival data for the cox fit: durations = days survived, events = event status
pub fn survival_data_from_patients(patients: &[Patient]) -> Result<SurvivalData> {
    let (covariates, names) = patient_design(patients)?;
    let times = patients.iter().map(|p| f64::from(p.days_survived)).collect();
    let events = patients.iter().map(|p| p.event_observed).collect();
    SurvivalData::with_feature_names(times, events, covariates, names)
}

/// refuse designs the fit can't identify: constant columns, then linear dependence
pub fn validate_design(covariates: ArrayView2<f64>, names: &[String]) -> Result<()> {
    let n_rows = covariates.nrows();
    if n_rows == 0 {
        return Err(Error::invalid_survival_data("design matrix has no rows"));
    }

    let mut centered: Vec<Array1<f64>> = Vec::with_capacity(covariates.ncols());
    for (j, column) in covariates.columns().into_iter().enumerate() {
        let mean = column.sum() / n_rows as f64;
        let c = column.mapv(|x| x - mean);
        if c.iter().all(|&x| x.abs() <= f64::EPSILON * mean.abs().max(1.0)) {
            return Err(Error::ZeroVariance { column: names[j].clone() });
        }
        centered.push(c);
    }

    // gram-schmidt on centered columns; centering absorbs the implicit baseline
    let mut basis: Vec<Array1<f64>> = Vec::new();
    let mut dependent = Vec::new();
    for (j, column) in centered.into_iter().enumerate() {
        let norm = column.dot(&column).sqrt();
        let mut residual = column;
        for q in &basis {
            let projection = q.dot(&residual);
            residual.scaled_add(-projection, q);
        }

        let residual_norm = residual.dot(&residual).sqrt();
        if residual_norm <= RANK_TOLERANCE * norm {
            dependent.push(names[j].clone());
        } else {
            basis.push(residual / residual_norm);
        }
    }

    if !dependent.is_empty() {
        return Err(Error::Collinear { columns: dependent });
    }
    Ok(())
}
