use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use clinlytix::{
    feasibility::assess_sites,
    kaplan_meier::kaplan_meier,
    metrics::{harrell_c_index, log_partial_likelihood},
    records::{AllowedSex, Patient, Sex, Stage, Treatment, TrialSite},
    CoxModel, SurvivalData,
};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

fn generate_synthetic_data(n_samples: usize, n_features: usize) -> SurvivalData {
    let mut rng = StdRng::seed_from_u64(42);

    let covariates = Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-2.0..2.0));

    // first 3 features carry the signal
    let true_coefficients = Array1::from(vec![0.5, -0.3, 0.2]);
    let n_coef = n_features.min(3);

    let mut times = Vec::with_capacity(n_samples);
    let mut events = Vec::with_capacity(n_samples);
    for row in covariates.rows() {
        let linear_pred = row
            .slice(ndarray::s![0..n_coef])
            .dot(&true_coefficients.slice(ndarray::s![0..n_coef]));

        let hazard = 0.1 * linear_pred.exp();
        let time = -rng.gen_range(f64::EPSILON..1.0_f64).ln() / hazard;
        let censoring_time = rng.gen_range(1.0..20.0);

        if time < censoring_time {
            times.push(time);
            events.push(true);
        } else {
            times.push(censoring_time);
            events.push(false);
        }
    }

    SurvivalData::new(times, events, covariates).unwrap()
}

fn generate_population(n: usize) -> Vec<Patient> {
    let mut rng = StdRng::seed_from_u64(7);
    let stages = [Stage::I, Stage::II, Stage::III, Stage::IV];
    let treatments = [Treatment::Chemo, Treatment::Combo, Treatment::Radiation, Treatment::Surgery];
    let diagnosis_date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();

    (0..n)
        .map(|i| {
            let days = rng.gen_range(180..2000);
            Patient {
                id: format!("P{i:05}"),
                age: rng.gen_range(30..86),
                sex: if rng.gen_bool(0.5) { Sex::Male } else { Sex::Female },
                cancer_type: "Lung".to_string(),
                stage: stages[rng.gen_range(0..4)],
                treatment: treatments[rng.gen_range(0..4)],
                diagnosis_date,
                days_survived: days,
                last_followup_date: diagnosis_date + chrono::Duration::days(i64::from(days)),
                event_observed: rng.gen_bool(0.5),
            }
        })
        .collect()
}

fn benchmark_cox_fitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("cox_fitting");

    for &n_samples in [50, 100, 200, 500].iter() {
        for &n_features in [5, 10, 20].iter() {
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("{}x{}", n_samples, n_features)),
                &(n_samples, n_features),
                |b, &(n_samples, n_features)| {
                    let data = generate_synthetic_data(n_samples, n_features);
                    b.iter(|| {
                        let mut model = CoxModel::new()
                            .with_max_iterations(100)
                            .with_tolerance(1e-6);
                        model.fit(black_box(&data)).unwrap();
                    });
                },
            );
        }
    }
    group.finish();
}

fn benchmark_ridge_fitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("ridge_fitting");

    let data = generate_synthetic_data(200, 15);

    for &l2_penalty in [0.0, 0.01, 0.1, 1.0].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("l2_{}", l2_penalty)),
            &l2_penalty,
            |b, &l2_penalty| {
                b.iter(|| {
                    let mut model = CoxModel::new().with_l2_penalty(l2_penalty);
                    model.fit(black_box(&data)).unwrap();
                });
            },
        );
    }
    group.finish();
}

fn benchmark_metrics_computation(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");

    let data = generate_synthetic_data(300, 8);
    let mut model = CoxModel::new();
    model.fit(&data).unwrap();
    let risk_scores = model.predict(data.covariates()).unwrap();
    let coefficients = model.coefficients().unwrap().to_owned();

    group.bench_function("harrell_c_index", |b| {
        b.iter(|| {
            harrell_c_index(
                black_box(risk_scores.view()),
                black_box(data.times()),
                black_box(data.events()),
            ).unwrap();
        });
    });

    group.bench_function("log_partial_likelihood", |b| {
        b.iter(|| {
            log_partial_likelihood(black_box(&data), black_box(coefficients.view())).unwrap();
        });
    });

    group.finish();
}

fn benchmark_kaplan_meier(c: &mut Criterion) {
    let mut group = c.benchmark_group("kaplan_meier");

    for &n_samples in [100, 1000, 10000].iter() {
        let data = generate_synthetic_data(n_samples, 1);
        let durations = data.times().to_vec();
        let events = data.events().to_vec();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_samples", n_samples)),
            &n_samples,
            |b, _| {
                b.iter(|| {
                    kaplan_meier("bench", black_box(&durations), black_box(&events)).unwrap();
                });
            },
        );
    }
    group.finish();
}

fn benchmark_feasibility(c: &mut Criterion) {
    let patients = generate_population(5000);
    let protocol_date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let sites: Vec<TrialSite> = (0..50)
        .map(|i| TrialSite {
            trial_id: "CT2025".to_string(),
            site_id: format!("S{i:03}"),
            country: "US".to_string(),
            age_min: 18,
            age_max: 60 + (i % 20),
            required_stage: [Stage::I, Stage::II, Stage::III, Stage::IV][i as usize % 4],
            allowed_sex: [AllowedSex::Male, AllowedSex::Female, AllowedSex::Any][i as usize % 3],
            target_enrollment: 50,
            protocol_date,
        })
        .collect();

    c.bench_function("assess_50_sites_5000_patients", |b| {
        b.iter(|| assess_sites(black_box(&sites), black_box(&patients)).unwrap());
    });
}

criterion_group!(
    benches,
    benchmark_cox_fitting,
    benchmark_ridge_fitting,
    benchmark_metrics_computation,
    benchmark_kaplan_meier,
    benchmark_feasibility
);
criterion_main!(benches);
