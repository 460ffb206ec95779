use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("model not fitted yet - call fit() first")]
    ModelNotFitted,

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("numerical issues: {message}")]
    NumericalError { message: String },

    #[error("survival data is broken: {message}")]
    InvalidSurvivalData { message: String },

    #[error("collinear covariates, design matrix is not full rank: {}", columns.join(", "))]
    Collinear { columns: Vec<String> },

    #[error("covariate {column} has zero variance")]
    ZeroVariance { column: String },

    #[error("undefined fill rate for site {site_id}: target enrollment is 0")]
    UndefinedFillRate { site_id: String },

    #[error("bad record in {table} (row {row}): {message}")]
    InvalidRecord { table: String, row: usize, message: String },

    #[error("{} not available, run the pipeline", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("pipeline: {message}")]
    Pipeline { message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }

    pub fn invalid_survival_data(message: impl Into<String>) -> Self {
        Self::InvalidSurvivalData { message: message.into() }
    }

    pub fn invalid_record(table: impl Into<String>, row: usize, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            table: table.into(),
            row,
            message: message.into(),
        }
    }

    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::Pipeline { message: message.into() }
    }

    /// bad-input errors: the task halts on these w/o retrying
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Collinear { .. }
                | Self::ZeroVariance { .. }
                | Self::UndefinedFillRate { .. }
                | Self::InvalidParameter { .. }
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_message() {
        let err = Error::ArtifactMissing { path: PathBuf::from("data/ehr_oncology_cleaned.csv") };
        assert_eq!(
            err.to_string(),
            "data/ehr_oncology_cleaned.csv not available, run the pipeline"
        );
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::UndefinedFillRate { site_id: "S001".into() }.is_configuration_error());
        assert!(Error::Collinear { columns: vec!["a".into(), "b".into()] }.is_configuration_error());
        assert!(!Error::numerical_error("nan").is_configuration_error());
    }
}
