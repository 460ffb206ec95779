//! cleaning stage: raw extracts -> typed, schema-conformant tables
//!
//! data-quality problems are logged and counted here, never raised. only a
//! missing input file or an io failure stops the stage.

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    config::DataLayout,
    error::Result,
    io::{read_table_lenient, write_table},
    records::{iso_date, Patient, ProScore, TrialSite},
};

/// what the cleaning pass found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub patients: usize,
    pub unreadable_patients: usize,
    pub survival_mismatches: usize,
    pub sites: usize,
    pub dropped_sites: usize,
    pub pro_rows: usize,
    pub dropped_pro_rows: usize,
}

/// trial row before coercion - numbers may be blank, strings unnormalized
#[derive(Debug, Deserialize)]
struct RawTrialSite {
    trial_id: String,
    site_id: String,
    country: String,
    eligibility_age_min: Option<f64>,
    eligibility_age_max: Option<f64>,
    eligibility_stage: String,
    allowed_sex: String,
    target_enrollment: Option<f64>,
    protocol_date: String,
}

fn whole_number(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v as u32)
}

impl RawTrialSite {
    /// coerce + normalize; Err carries the reason the row is unusable
    fn normalize(self) -> std::result::Result<TrialSite, String> {
        let age_min = whole_number(self.eligibility_age_min).ok_or("eligibility_age_min missing")?;
        let age_max = whole_number(self.eligibility_age_max).ok_or("eligibility_age_max missing")?;
        let target_enrollment = whole_number(self.target_enrollment).ok_or("target_enrollment missing")?;
        let required_stage = self.eligibility_stage.parse().map_err(|e| format!("{e}"))?;
        let allowed_sex = self.allowed_sex.parse().map_err(|e| format!("{e}"))?;
        let protocol_date = iso_date::parse(&self.protocol_date).ok_or("protocol_date not an iso date")?;

        Ok(TrialSite {
            trial_id: self.trial_id.trim().to_string(),
            site_id: self.site_id.trim().to_string(),
            country: self.country.trim().to_string(),
            age_min,
            age_max,
            required_stage,
            allowed_sex,
            target_enrollment,
            protocol_date,
        })
    }
}

pub fn clean_patients(patients: &[Patient]) -> usize {
    let mismatches = patients.iter().filter(|p| p.survival_mismatch()).count();
    if mismatches > 0 {
        warn!(rows = mismatches, "rows have mismatched survival days");
    } else {
        info!("survival days match follow-up");
    }
    mismatches
}

/// clip to [1, 5], drop incomplete rows, recompute totals. returns (kept, dropped)
pub fn clean_pro_scores(scores: Vec<ProScore>) -> (Vec<ProScore>, usize) {
    let before = scores.len();
    let kept: Vec<ProScore> = scores
        .into_iter()
        .filter(ProScore::is_complete)
        .map(|mut score| {
            score.clip_scores();
            score
        })
        .collect();

    let dropped = before - kept.len();
    if dropped > 0 {
        warn!(rows = dropped, "dropped PRO rows w/ missing scores");
    }
    (kept, dropped)
}

/// run the whole cleaning pass over the raw files in `layout`
pub fn run(layout: &DataLayout) -> Result<CleaningReport> {
    let mut report = CleaningReport::default();

    let (patients, unreadable) = read_table_lenient::<Patient>(&layout.raw_patients())?;
    report.unreadable_patients = unreadable;
    report.survival_mismatches = clean_patients(&patients);
    report.patients = patients.len();
    write_table(&layout.patients(), &patients)?;

    let (raw_sites, unreadable) = read_table_lenient::<RawTrialSite>(&layout.raw_sites())?;
    report.dropped_sites = unreadable;
    let mut sites = Vec::with_capacity(raw_sites.len());
    for raw in raw_sites {
        let site_id = raw.site_id.clone();
        match raw.normalize() {
            Ok(site) => sites.push(site),
            Err(reason) => {
                warn!(site = %site_id, %reason, "dropping trial site");
                report.dropped_sites += 1;
            }
        }
    }
    report.sites = sites.len();
    write_table(&layout.sites(), &sites)?;

    let (scores, unreadable) = read_table_lenient::<ProScore>(&layout.raw_pro_scores())?;
    let (scores, dropped) = clean_pro_scores(scores);
    report.pro_rows = scores.len();
    report.dropped_pro_rows = dropped + unreadable;
    write_table(&layout.pro_scores(), &scores)?;

    info!(
        patients = report.patients,
        sites = report.sites,
        pro_rows = report.pro_rows,
        "all datasets cleaned"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_table;
    use crate::records::{AllowedSex, Stage};
    use std::fs;

    fn raw_site(stage: &str, sex: &str, target: Option<f64>) -> RawTrialSite {
        RawTrialSite {
            trial_id: "CT2025".into(),
            site_id: " S001 ".into(),
            country: "UK".into(),
            eligibility_age_min: Some(18.0),
            eligibility_age_max: Some(80.0),
            eligibility_stage: stage.into(),
            allowed_sex: sex.into(),
            target_enrollment: target,
            protocol_date: "2023-01-01".into(),
        }
    }

    #[test]
    fn test_site_normalization() {
        let site = raw_site(" iv", "any ", Some(90.0)).normalize().unwrap();
        assert_eq!(site.site_id, "S001");
        assert_eq!(site.required_stage, Stage::IV);
        assert_eq!(site.allowed_sex, AllowedSex::Any);
        assert_eq!(site.target_enrollment, 90);

        assert!(raw_site("III", "Male", None).normalize().is_err());
        assert!(raw_site("III", "Male", Some(12.5)).normalize().is_err());
        assert!(raw_site("IX", "Male", Some(12.0)).normalize().is_err());
    }

    #[test]
    fn test_pro_cleaning_policy() {
        let score = |fatigue: Option<f64>| ProScore {
            patient_id: "P0001".into(),
            visit_day: 30,
            fatigue_score: fatigue,
            pain_score: Some(2.0),
            mobility_score: Some(9.0),
            emotional_score: Some(3.0),
            total_score: None,
        };

        let (kept, dropped) = clean_pro_scores(vec![score(Some(4.0)), score(None), score(Some(-1.0))]);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].mobility_score, Some(5.0));
        assert_eq!(kept[0].total_score, Some(14.0));
        assert_eq!(kept[1].fatigue_score, Some(1.0));
    }

    #[test]
    fn test_run_writes_cleaned_tables() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());

        fs::write(
            layout.raw_patients(),
            "patient_id,age,sex,cancer_type,stage,treatment,diagnosis_date,days_survived,last_followup_date,event_status\n\
             P0001,52,Male,Lung,III,Chemo,2019-02-01,400,2020-03-07,1\n\
             P0002,61,Female,Breast,II,Surgery,2019-05-10,999,2019-11-26,0\n",
        )
        .unwrap();
        fs::write(
            layout.raw_sites(),
            "trial_id,site_id,country,eligibility_age_min,eligibility_age_max,eligibility_stage,allowed_sex,target_enrollment,protocol_date\n\
             CT2025,S001,US,18,80,iii,male,60,2023-01-01\n\
             CT2025,S002,UK,18,80,IV,Any,,2023-01-01\n",
        )
        .unwrap();
        fs::write(
            layout.raw_pro_scores(),
            "patient_id,visit_day,fatigue_score,pain_score,mobility_score,emotional_score,total_score\n\
             P0001,30,6,2,3,4,15\n\
             P0001,60,,2,3,4,\n",
        )
        .unwrap();

        let report = run(&layout).unwrap();
        assert_eq!(report.patients, 2);
        assert_eq!(report.survival_mismatches, 1);
        assert_eq!(report.sites, 1);
        assert_eq!(report.dropped_sites, 1);
        assert_eq!(report.pro_rows, 1);
        assert_eq!(report.dropped_pro_rows, 1);

        let sites: Vec<TrialSite> = read_table(&layout.sites()).unwrap();
        assert_eq!(sites[0].required_stage, Stage::III);
        assert_eq!(sites[0].allowed_sex, AllowedSex::Male);

        let scores: Vec<ProScore> = read_table(&layout.pro_scores()).unwrap();
        assert_eq!(scores[0].total_score, Some(14.0));
    }
}
