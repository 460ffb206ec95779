//! product-limit (kaplan-meier) survival curves
//!
//! S(t_i) = S(t_{i-1}) * (1 - d_i / n_i) over the distinct observed times.
//! events and censorings sharing a time are one step: the events move S,
//! the censorings only leave the risk set for the steps after.
//! every curve opens at (0, 1.0), also when deaths happen at time 0; those
//! get their own step at time 0 right after the opening point.
//!
//! confidence bands use greenwood's variance on the log(-log) scale, which
//! keeps them inside [0, 1].

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;

use crate::{
    error::{Error, Result},
    records::{Patient, Stage},
};

/// one step of the curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub time: f64,
    pub survival: f64,
    pub at_risk: usize,
    pub events: usize,
    pub censored: usize,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// right-continuous step function for one cohort
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalCurve {
    pub cohort: String,
    pub points: Vec<CurvePoint>,
}

impl SurvivalCurve {
    /// S(t): value of the last step at or before t (1.0 before the first step)
    pub fn survival_at(&self, time: f64) -> f64 {
        let idx = self.points.partition_point(|p| p.time <= time);
        if idx == 0 {
            1.0
        } else {
            self.points[idx - 1].survival
        }
    }

    /// first time the curve reaches 0.5 or below
    pub fn median_survival_time(&self) -> Option<f64> {
        self.points.iter().find(|p| p.survival <= 0.5).map(|p| p.time)
    }

    pub fn total_events(&self) -> usize {
        self.points.iter().map(|p| p.events).sum()
    }
}

fn z_critical(confidence: f64) -> f64 {
    // normal(0, 1) is always constructible
    Normal::new(0.0, 1.0).map_or(1.959_964, |n| n.inverse_cdf(0.5 + confidence / 2.0))
}

/// log(-log) band around `survival` given greenwood's running sum
fn confidence_band(survival: f64, greenwood_sum: f64, z: f64) -> (f64, f64) {
    if survival <= 0.0 {
        return (0.0, 0.0);
    }
    if survival >= 1.0 {
        return (1.0, 1.0);
    }

    let log_s = survival.ln();
    let se = (greenwood_sum / (log_s * log_s)).sqrt();
    let lower = survival.powf((z * se).exp());
    let upper = survival.powf((-z * se).exp());
    (lower, upper)
}

/// fit one curve from (duration, event) pairs; 95% bands
pub fn kaplan_meier(cohort: impl Into<String>, durations: &[f64], events: &[bool]) -> Result<SurvivalCurve> {
    kaplan_meier_with_confidence(cohort, durations, events, 0.95)
}

pub fn kaplan_meier_with_confidence(
    cohort: impl Into<String>,
    durations: &[f64],
    events: &[bool],
    confidence: f64,
) -> Result<SurvivalCurve> {
    if durations.len() != events.len() {
        return Err(Error::invalid_dimensions(format!(
            "durations len ({}) != events len ({})",
            durations.len(),
            events.len()
        )));
    }
    if durations.is_empty() {
        return Err(Error::invalid_survival_data("no observations in cohort"));
    }
    if durations.iter().any(|&t| t < 0.0 || !t.is_finite()) {
        return Err(Error::invalid_survival_data("durations must be non-negative & finite"));
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(Error::invalid_parameter("confidence", confidence.to_string()));
    }

    // sort by time, then tally (events, censored) per distinct time
    let mut order: Vec<usize> = (0..durations.len()).collect();
    order.sort_by(|&a, &b| durations[a].total_cmp(&durations[b]));

    let mut tallies: Vec<(f64, usize, usize)> = Vec::new();
    for idx in order {
        let time = durations[idx];
        match tallies.last_mut() {
            Some((t, d, c)) if *t == time => {
                if events[idx] {
                    *d += 1;
                } else {
                    *c += 1;
                }
            }
            _ => tallies.push((time, usize::from(events[idx]), usize::from(!events[idx]))),
        }
    }

    let z = z_critical(confidence);
    let mut points = Vec::with_capacity(tallies.len() + 1);

    // a censor-only time 0 is already the opening point
    let (first_time, first_deaths, _) = tallies[0];
    if first_time > 0.0 || first_deaths > 0 {
        points.push(CurvePoint {
            time: 0.0,
            survival: 1.0,
            at_risk: durations.len(),
            events: 0,
            censored: 0,
            ci_lower: 1.0,
            ci_upper: 1.0,
        });
    }

    let mut at_risk = durations.len();
    let mut survival = 1.0;
    let mut greenwood_sum = 0.0;

    for (time, deaths, censored) in tallies {
        // at_risk >= deaths + censored > 0 here, everyone left has duration >= time
        if deaths > 0 {
            let n = at_risk as f64;
            let d = deaths as f64;
            survival *= 1.0 - d / n;
            if deaths < at_risk {
                greenwood_sum += d / (n * (n - d));
            }
        }

        let (ci_lower, ci_upper) = confidence_band(survival, greenwood_sum, z);
        points.push(CurvePoint {
            time,
            survival,
            at_risk,
            events: deaths,
            censored,
            ci_lower,
            ci_upper,
        });

        at_risk -= deaths + censored;
    }

    Ok(SurvivalCurve { cohort: cohort.into(), points })
}

/// one curve per stage present in the population, ordered I..IV
pub fn curves_by_stage(patients: &[Patient]) -> Result<Vec<SurvivalCurve>> {
    let mut cohorts: BTreeMap<Stage, (Vec<f64>, Vec<bool>)> = BTreeMap::new();
    for patient in patients {
        let (durations, events) = cohorts.entry(patient.stage).or_default();
        durations.push(f64::from(patient.days_survived));
        events.push(patient.event_observed);
    }

    cohorts
        .into_iter()
        .map(|(stage, (durations, events))| kaplan_meier(format!("Stage {stage}"), &durations, &events))
        .collect()
}
