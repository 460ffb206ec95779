//! the concrete clinlytix stages and the daily DAG that sequences them
//!
//! clean -> {survival, feasibility} -> refresh_dashboard

use std::fs;

use tracing::info;

use crate::{
    cleaning::{self, CleaningReport},
    config::{Config, CoxSettings, DataLayout},
    design::survival_data_from_patients,
    error::{Error, Result},
    feasibility::{assess_sites, FeasibilityResult},
    io::{read_table, write_table},
    kaplan_meier::{curves_by_stage, SurvivalCurve},
    model::{CoxModel, CoxModelSummary},
    pipeline::{Dag, Task},
    records::{Patient, TrialSite},
};

pub const CLEAN: &str = "clean";
pub const SURVIVAL: &str = "survival";
pub const FEASIBILITY: &str = "feasibility";
pub const REFRESH_DASHBOARD: &str = "refresh_dashboard";

/// raw extracts -> cleaned tables
pub fn clean(layout: &DataLayout) -> Result<CleaningReport> {
    cleaning::run(layout)
}

/// cleaned patients + sites -> `site_feasibility_report.csv`
pub fn feasibility(layout: &DataLayout) -> Result<Vec<FeasibilityResult>> {
    let patients: Vec<Patient> = read_table(&layout.patients())?;
    let sites: Vec<TrialSite> = read_table(&layout.sites())?;

    let results = assess_sites(&sites, &patients)?;
    write_table(&layout.feasibility_report(), &results)?;

    info!(
        sites = results.len(),
        path = %layout.feasibility_report().display(),
        "feasibility report written"
    );
    Ok(results)
}

/// what the survival stage produced
#[derive(Debug, Clone)]
pub struct SurvivalOutputs {
    pub curves: Vec<SurvivalCurve>,
    pub summary: CoxModelSummary,
}

/// km curves per stage + the cox fit; the curves are written even if the fit is refused
pub fn survival(layout: &DataLayout, settings: &CoxSettings) -> Result<SurvivalOutputs> {
    let patients: Vec<Patient> = read_table(&layout.patients())?;
    if patients.is_empty() {
        return Err(Error::invalid_survival_data("patient table is empty"));
    }

    let curves = curves_by_stage(&patients)?;
    for curve in &curves {
        write_table(&layout.survival_curve(&curve.cohort), &curve.points)?;
    }

    let data = survival_data_from_patients(&patients)?;
    let mut model = CoxModel::new()
        .with_l2_penalty(settings.l2_penalty)
        .with_max_iterations(settings.max_iterations)
        .with_tolerance(settings.tolerance)
        .with_alpha(settings.alpha);
    model.fit(&data)?;
    let summary = model.summary()?;

    fs::create_dir_all(layout.output_dir())?;
    fs::write(layout.cox_summary_text(), summary.render())?;
    write_table(&layout.cox_summary_table(), &summary.rows)?;

    info!(
        cohorts = curves.len(),
        covariates = summary.rows.len(),
        converged = summary.converged,
        "survival outputs written"
    );
    Ok(SurvivalOutputs { curves, summary })
}

/// checks every declared output exists, then logs that the dashboard data is fresh
pub fn refresh_dashboard(layout: &DataLayout) -> Result<()> {
    let mut expected = vec![
        layout.feasibility_report(),
        layout.cox_summary_text(),
        layout.cox_summary_table(),
    ];
    let patients: Vec<Patient> = read_table(&layout.patients())?;
    for curve in curves_by_stage(&patients)? {
        expected.push(layout.survival_curve(&curve.cohort));
    }

    if let Some(missing) = expected.into_iter().find(|path| !path.exists()) {
        return Err(Error::ArtifactMissing { path: missing });
    }

    info!(data_dir = %layout.data_dir().display(), "dashboard data refreshed");
    Ok(())
}

/// the daily pipeline over `layout`
pub fn build_pipeline(layout: &DataLayout, config: &Config) -> Result<Dag> {
    let mut dag = Dag::new();

    let l = layout.clone();
    dag.add_task(Task::new(CLEAN, move || {
        clean(&l)?;
        Ok(())
    }))?;

    let l = layout.clone();
    let settings = config.cox.clone();
    dag.add_task(Task::new(SURVIVAL, move || {
        survival(&l, &settings)?;
        Ok(())
    }))?;

    let l = layout.clone();
    dag.add_task(Task::new(FEASIBILITY, move || {
        feasibility(&l)?;
        Ok(())
    }))?;

    let l = layout.clone();
    dag.add_task(Task::new(REFRESH_DASHBOARD, move || {
        refresh_dashboard(&l)?;
        Ok(())
    }))?;

    dag.add_dependency(CLEAN, SURVIVAL)?;
    dag.add_dependency(CLEAN, FEASIBILITY)?;
    dag.add_dependency(SURVIVAL, REFRESH_DASHBOARD)?;
    dag.add_dependency(FEASIBILITY, REFRESH_DASHBOARD)?;
    Ok(dag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_shape() {
        let dag = build_pipeline(&DataLayout::new("/nowhere"), &Config::default()).unwrap();
        assert_eq!(
            dag.topological_order().unwrap(),
            vec![CLEAN, SURVIVAL, FEASIBILITY, REFRESH_DASHBOARD]
        );
        assert_eq!(dag.upstream(REFRESH_DASHBOARD).unwrap(), vec![SURVIVAL, FEASIBILITY]);
    }

    #[test]
    fn test_stages_need_cleaned_data() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());

        let err = feasibility(&layout).unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing { .. }));
        assert!(err.to_string().ends_with("not available, run the pipeline"));
        assert!(survival(&layout, &CoxSettings::default()).is_err());
        assert!(refresh_dashboard(&layout).is_err());
    }
}
