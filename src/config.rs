//! configuration + data directory layout
//!
//! data directory resolution, highest priority first:
//! 1. command-line argument
//! 2. `CLINLYTIX_DATA_DIR`
//! 3. `data_dir` in the TOML config file
//! 4. `./data`

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::pipeline::RetryPolicy;

pub const DATA_DIR_ENV: &str = "CLINLYTIX_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "data";

/// where every stage reads and writes. threaded explicitly into each stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn raw_patients(&self) -> PathBuf {
        self.data_dir.join("ehr_oncology.csv")
    }

    pub fn raw_sites(&self) -> PathBuf {
        self.data_dir.join("trial_protocol.csv")
    }

    pub fn raw_pro_scores(&self) -> PathBuf {
        self.data_dir.join("pro_scores.csv")
    }

    pub fn patients(&self) -> PathBuf {
        self.data_dir.join("ehr_oncology_cleaned.csv")
    }

    pub fn sites(&self) -> PathBuf {
        self.data_dir.join("trial_protocol_cleaned.csv")
    }

    pub fn pro_scores(&self) -> PathBuf {
        self.data_dir.join("pro_scores_cleaned.csv")
    }

    pub fn feasibility_report(&self) -> PathBuf {
        self.data_dir.join("site_feasibility_report.csv")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("outputs")
    }

    /// one step-function file per cohort, e.g. `km_curve_stage_iii.csv`
    pub fn survival_curve(&self, cohort: &str) -> PathBuf {
        let slug: String = cohort
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        self.output_dir().join(format!("km_curve_{slug}.csv"))
    }

    pub fn cox_summary_text(&self) -> PathBuf {
        self.output_dir().join("cox_summary.txt")
    }

    pub fn cox_summary_table(&self) -> PathBuf {
        self.output_dir().join("cox_summary.csv")
    }

    /// date of the last successful scheduled run
    pub fn last_run_marker(&self) -> PathBuf {
        self.output_dir().join("last_run")
    }
}

/// retry settings as they appear in TOML
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub retries: u32,
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        // one retry, one minute apart
        Self { retries: 1, delay_secs: 60 }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy::new(settings.retries, Duration::from_secs(settings.delay_secs))
    }
}

/// cox fit settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoxSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub l2_penalty: f64,
    pub alpha: f64, // significance level
}

impl Default for CoxSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-7,
            l2_penalty: 0.0,
            alpha: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub retry: RetrySettings,
    pub cox: CoxSettings,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("can't read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cox.max_iterations == 0 {
            return Err(Error::Config("cox.max_iterations must be > 0".into()));
        }
        if !(self.cox.tolerance > 0.0) {
            return Err(Error::Config(format!("cox.tolerance must be > 0, got {}", self.cox.tolerance)));
        }
        if !(self.cox.l2_penalty >= 0.0) {
            return Err(Error::Config(format!("cox.l2_penalty must be >= 0, got {}", self.cox.l2_penalty)));
        }
        if !(self.cox.alpha > 0.0 && self.cox.alpha < 1.0) {
            return Err(Error::Config(format!("cox.alpha must be in (0, 1), got {}", self.cox.alpha)));
        }
        Ok(())
    }

    /// resolve the data directory: cli arg > env var > config file > ./data
    pub fn resolve_data_dir(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(DATA_DIR_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
        if let Some(path) = &self.data_dir {
            return path.clone();
        }
        PathBuf::from(DEFAULT_DATA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.retry, RetrySettings { retries: 1, delay_secs: 60 });
        assert_eq!(config.cox.max_iterations, 100);
        assert_eq!(config.data_dir, None);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str(
            r#"
            data_dir = "/srv/clinlytix"

            [retry]
            retries = 3

            [cox]
            l2_penalty = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.retries, 3);
        assert_eq!(config.retry.delay_secs, 60);
        assert_eq!(config.cox.l2_penalty, 0.1);
        assert_eq!(config.cox.tolerance, 1e-7);
        assert_eq!(
            config.resolve_data_dir(Some(Path::new("/tmp/override"))),
            PathBuf::from("/tmp/override")
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_toml_str("[cox]\nalpha = 1.5").is_err());
        assert!(Config::from_toml_str("[cox]\nmax_iterations = 0").is_err());
        assert!(Config::from_toml_str("[retry]\nretries = \"lots\"").is_err());
    }

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("/data");
        assert_eq!(layout.patients(), PathBuf::from("/data/ehr_oncology_cleaned.csv"));
        assert_eq!(
            layout.survival_curve("Stage III"),
            PathBuf::from("/data/outputs/km_curve_stage_iii.csv")
        );
    }
}
