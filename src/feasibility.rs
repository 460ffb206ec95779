//! site feasibility: how many patients in the population would a site's
//! eligibility criteria admit, relative to its enrollment target

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    records::{AllowedSex, Patient, Stage, TrialSite},
};

/// one report row per site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityResult {
    pub site_id: String,
    pub country: String,
    pub required_stage: Stage,
    pub allowed_sex: AllowedSex,
    pub target_enrollment: u32,
    pub eligible_patients: usize,
    pub projected_fill_rate: f64,
}

/// population w/ duplicate ids removed, first occurrence wins
pub fn unique_patients(patients: &[Patient]) -> Vec<&Patient> {
    let mut seen = HashSet::with_capacity(patients.len());
    let unique: Vec<&Patient> = patients.iter().filter(|p| seen.insert(p.id.as_str())).collect();

    let duplicates = patients.len() - unique.len();
    if duplicates > 0 {
        warn!(duplicates, "duplicate patient ids ignored for feasibility counts");
    }
    unique
}

/// eligible / target rounded half-to-even at 2 dp, done on integers so
/// ties like 1/8 = 0.125 land exactly
pub fn fill_rate(eligible: usize, target: u32) -> Option<f64> {
    if target == 0 {
        return None;
    }

    let numerator = eligible as u128 * 100;
    let target = u128::from(target);
    let (quotient, remainder) = (numerator / target, numerator % target);

    let hundredths = match (2 * remainder).cmp(&target) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + (quotient % 2), // tie -> even
    };

    Some(hundredths as f64 / 100.0)
}

fn assess(site: &TrialSite, population: &[&Patient]) -> Result<FeasibilityResult> {
    site.validate()?;

    let eligible_patients = population.iter().filter(|p| site.admits(p)).count();
    let projected_fill_rate = fill_rate(eligible_patients, site.target_enrollment)
        .ok_or_else(|| Error::UndefinedFillRate { site_id: site.site_id.clone() })?;

    debug!(site = %site.site_id, eligible_patients, projected_fill_rate, "assessed site");

    Ok(FeasibilityResult {
        site_id: site.site_id.clone(),
        country: site.country.clone(),
        required_stage: site.required_stage,
        allowed_sex: site.allowed_sex,
        target_enrollment: site.target_enrollment,
        eligible_patients,
        projected_fill_rate,
    })
}

/// match one site against the full population
pub fn assess_site(site: &TrialSite, patients: &[Patient]) -> Result<FeasibilityResult> {
    assess(site, &unique_patients(patients))
}

/// every site in input order. the first zero-target or malformed site fails
/// the whole batch so no partial report gets written
pub fn assess_sites(sites: &[TrialSite], patients: &[Patient]) -> Result<Vec<FeasibilityResult>> {
    let population = unique_patients(patients);
    sites.iter().map(|site| assess(site, &population)).collect()
}
