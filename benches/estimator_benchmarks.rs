use causalkit::causal::dml::fold_assignment;
use causalkit::config::DmlConfig;
use causalkit::models::{BoostedRegressor, BoosterConfig, LinearRegression, LogisticRegression, Regressor};
use causalkit::{ate_with_pvalue, double_ml, doubly_robust, ipw, t_learner, x_learner, Matrix, Table};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

fn simulate(n: usize) -> Table {
    let mut rng = StdRng::seed_from_u64(0);
    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let t: Vec<f64> = x
        .iter()
        .map(|xi| if rng.gen::<f64>() < 1.0 / (1.0 + (-xi).exp()) { 1.0 } else { 0.0 })
        .collect();
    let y: Vec<f64> = x
        .iter()
        .zip(&t)
        .map(|(xi, ti)| xi + ti * (1.0 + 0.5 * xi) + rng.gen_range(-1.0..1.0))
        .collect();
    Table::from_columns(vec![("x", x), ("t", t), ("y", y)]).expect("valid table")
}

pub fn estimator_benchmarks(c: &mut Criterion) {
    let table = simulate(10_000);
    let covs = ["x"];

    c.bench_function("ate_with_pvalue", |b| {
        b.iter(|| ate_with_pvalue(black_box(&table), "t", "y"))
    });
    c.bench_function("ipw", |b| b.iter(|| ipw(black_box(&table), "x", "t", "y")));
    c.bench_function("doubly_robust", |b| {
        b.iter(|| doubly_robust(black_box(&table), "x", "t", "y"))
    });
    c.bench_function("t_learner linear", |b| {
        b.iter(|| t_learner(black_box(&table), &table, &covs, "t", "y", LinearRegression::new()))
    });
    c.bench_function("x_learner linear", |b| {
        b.iter(|| {
            x_learner(
                black_box(&table),
                &table,
                &covs,
                "t",
                "y",
                LinearRegression::new(),
                LogisticRegression::default(),
            )
        })
    });
    c.bench_function("double_ml linear", |b| {
        b.iter(|| {
            double_ml(
                black_box(&table),
                &table,
                &covs,
                "t",
                "y",
                LinearRegression::new(),
                &DmlConfig::default(),
            )
        })
    });
    c.bench_function("fold_assignment", |b| b.iter(|| fold_assignment(black_box(10_000), 5, 0)));

    let mut booster_train = c.benchmark_group("booster_train");
    booster_train.sample_size(10);
    booster_train.measurement_time(Duration::from_secs(20));
    let x = table.select(&covs).expect("covariates present");
    let y = table.column("y").expect("outcome present");
    let data = Matrix::new(&x, table.n_rows(), 1);
    booster_train.bench_function("BoostedRegressor fit", |b| {
        b.iter(|| {
            let mut model = BoostedRegressor::new(BoosterConfig {
                n_estimators: 50,
                ..Default::default()
            });
            model.fit(black_box(&data), black_box(y))
        })
    });
    booster_train.finish();
}

criterion_group!(benches, estimator_benchmarks);
criterion_main!(benches);
