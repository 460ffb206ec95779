//! typed patient / site / PRO records
//!
//! rows come in as csv (see [`crate::io`]), these types only carry
//! validation predicates - the engines do the work.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// patient sex as recorded in the ehr extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Sex {
    Male,
    Female,
}

/// sex criterion on a trial site - `Any` disables the predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum AllowedSex {
    Male,
    Female,
    Any,
}

/// cancer stage, ordinal I < II < III < IV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Stage {
    I,
    II,
    III,
    IV,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Treatment {
    Chemo,
    Combo,
    Radiation,
    Surgery,
}

/// "  male " -> "Male"
fn capitalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl FromStr for Sex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match capitalize(s).as_str() {
            "Male" => Ok(Self::Male),
            "Female" => Ok(Self::Female),
            _ => Err(Error::invalid_parameter("sex", s)),
        }
    }
}

impl FromStr for AllowedSex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match capitalize(s).as_str() {
            "Male" => Ok(Self::Male),
            "Female" => Ok(Self::Female),
            "Any" => Ok(Self::Any),
            _ => Err(Error::invalid_parameter("allowed_sex", s)),
        }
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "I" => Ok(Self::I),
            "II" => Ok(Self::II),
            "III" => Ok(Self::III),
            "IV" => Ok(Self::IV),
            _ => Err(Error::invalid_parameter("stage", s)),
        }
    }
}

impl FromStr for Treatment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match capitalize(s).as_str() {
            "Chemo" => Ok(Self::Chemo),
            "Combo" => Ok(Self::Combo),
            "Radiation" => Ok(Self::Radiation),
            "Surgery" => Ok(Self::Surgery),
            _ => Err(Error::invalid_parameter("treatment", s)),
        }
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {$(
        impl TryFrom<String> for $ty {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                value.parse()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    )*};
}

string_conversions!(Sex, AllowedSex, Stage, Treatment);

impl AllowedSex {
    pub fn admits(self, sex: Sex) -> bool {
        match self {
            Self::Any => true,
            Self::Male => sex == Sex::Male,
            Self::Female => sex == Sex::Female,
        }
    }
}

/// iso dates; pandas sometimes writes a midnight time component, which is dropped
pub(crate) mod iso_date {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, FORMAT)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok().map(|dt| dt.date()))
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("not an iso date: {raw:?}")))
    }
}

/// 0/1 event column <-> bool
pub(crate) mod event_flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(observed: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*observed))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(de::Error::custom(format!("event_status must be 0 or 1, got {other}"))),
        }
    }
}

/// one row of the oncology ehr extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(rename = "patient_id")]
    pub id: String,
    pub age: u32,
    pub sex: Sex,
    pub cancer_type: String,
    pub stage: Stage,
    pub treatment: Treatment,
    #[serde(with = "iso_date")]
    pub diagnosis_date: NaiveDate,
    pub days_survived: u32,
    #[serde(with = "iso_date")]
    pub last_followup_date: NaiveDate,
    #[serde(rename = "event_status", with = "event_flag")]
    pub event_observed: bool, // true = died, false = censored
}

impl Patient {
    /// days between diagnosis and last follow-up
    pub fn follow_up_days(&self) -> i64 {
        (self.last_followup_date - self.diagnosis_date).num_days()
    }

    /// recorded survival disagrees w/ the dates - flagged, never fatal
    pub fn survival_mismatch(&self) -> bool {
        self.follow_up_days() != i64::from(self.days_survived)
    }
}

/// one site of a trial protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSite {
    pub trial_id: String,
    pub site_id: String,
    pub country: String,
    #[serde(rename = "eligibility_age_min")]
    pub age_min: u32,
    #[serde(rename = "eligibility_age_max")]
    pub age_max: u32,
    #[serde(rename = "eligibility_stage")]
    pub required_stage: Stage,
    pub allowed_sex: AllowedSex,
    pub target_enrollment: u32,
    #[serde(with = "iso_date")]
    pub protocol_date: NaiveDate,
}

impl TrialSite {
    pub fn validate(&self) -> Result<()> {
        if self.age_min > self.age_max {
            return Err(Error::invalid_parameter(
                format!("{} eligibility age range", self.site_id),
                format!("{}..{}", self.age_min, self.age_max),
            ));
        }
        Ok(())
    }

    /// the full eligibility predicate: age in [min, max], exact stage, sex unless Any
    pub fn admits(&self, patient: &Patient) -> bool {
        (self.age_min..=self.age_max).contains(&patient.age)
            && patient.stage == self.required_stage
            && self.allowed_sex.admits(patient.sex)
    }
}

pub const SCORE_MIN: f64 = 1.0;
pub const SCORE_MAX: f64 = 5.0;

/// patient-reported outcome scores for one visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProScore {
    pub patient_id: String,
    pub visit_day: u32,
    pub fatigue_score: Option<f64>,
    pub pain_score: Option<f64>,
    pub mobility_score: Option<f64>,
    pub emotional_score: Option<f64>,
    pub total_score: Option<f64>,
}

impl ProScore {
    fn scores_mut(&mut self) -> [&mut Option<f64>; 4] {
        [
            &mut self.fatigue_score,
            &mut self.pain_score,
            &mut self.mobility_score,
            &mut self.emotional_score,
        ]
    }

    /// all four component scores present
    pub fn is_complete(&self) -> bool {
        [self.fatigue_score, self.pain_score, self.mobility_score, self.emotional_score]
            .iter()
            .all(Option::is_some)
    }

    /// clip every score into [1, 5] and recompute the total (None if any score is missing)
    pub fn clip_scores(&mut self) {
        let mut total = Some(0.0);
        for score in self.scores_mut() {
            *score = score.map(|s| s.clamp(SCORE_MIN, SCORE_MAX));
            total = total.zip(*score).map(|(acc, s)| acc + s);
        }
        self.total_score = total;
    }
}

#[cfg(test)]
pub(crate) fn sample_patient(id: &str, age: u32, sex: Sex, stage: Stage) -> Patient {
    let diagnosis_date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    Patient {
        id: id.to_string(),
        age,
        sex,
        cancer_type: "Lung".to_string(),
        stage,
        treatment: Treatment::Chemo,
        diagnosis_date,
        days_survived: 365,
        last_followup_date: diagnosis_date + chrono::Duration::days(365),
        event_observed: false,
    }
}
