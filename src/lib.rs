//! # clinlytix
//!
//! trial feasibility + survival analytics over oncology patient records, run as a daily pipeline
//!
//! ## what you get
//!
//! - site feasibility: eligible patient counts + projected fill rates per trial site
//! - kaplan-meier survival curves per stage w/ greenwood confidence bands
//! - cox proportional hazards w/ efron ties, SEs, p-values and fit statistics
//! - a small DAG runner w/ retries, parallel stages and a daily schedule
//!
//! ## quick start
//!
//! ```rust
//! use clinlytix::{kaplan_meier, CoxModel, SurvivalData};
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // product-limit curve for one cohort
//! let curve = kaplan_meier("demo", &[5.0, 10.0, 10.0, 15.0], &[true, true, false, true])?;
//! assert_eq!(curve.median_survival_time(), Some(10.0));
//!
//! // cox fit on a toy design
//! let times = vec![1.0, 2.5, 3.2, 4.1, 5.0, 6.3];
//! let events = vec![true, false, true, true, true, false]; // true = died, false = censored
//! let covariates = Array2::from_shape_vec((6, 1), vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0])?;
//! let data = SurvivalData::new(times, events, covariates)?;
//!
//! let mut model = CoxModel::new().with_l2_penalty(0.1);
//! model.fit(&data)?;
//! let risk_scores = model.predict(data.covariates())?;
//! # assert_eq!(risk_scores.len(), 6);
//! # Ok(())
//! # }
//! ```

pub mod cleaning;
pub mod config;
pub mod data;
pub mod design;
pub mod error;
pub mod feasibility;
pub mod io;
pub mod kaplan_meier;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod pipeline;
pub mod records;
pub mod stages;

pub use config::{Config, DataLayout};
pub use data::SurvivalData;
pub use error::{Error, Result};
pub use feasibility::{assess_site, assess_sites, FeasibilityResult};
pub use kaplan_meier::{kaplan_meier, SurvivalCurve};
pub use model::{CoxModel, CoxModelSummary};
pub use pipeline::{Dag, Executor, RetryPolicy, Task, TaskState};
pub use records::{AllowedSex, Patient, ProScore, Sex, Stage, TrialSite, Treatment};
