use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use goalrs::{
    ActivityLevel, CalculationInput, FixedClock, Gender, GoalCalculationOrchestrator,
    GoalCalculators, GoalFormula, InMemoryStore, ProfileFingerprint, UserProfile,
};

/// Benchmarks for the goal formulas and the orchestration path
///
/// The cached path should stay well below the cost of a full recalculation.

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn create_benchmark_profile(i: usize) -> UserProfile {
    let genders = [Gender::Male, Gender::Female, Gender::Other];
    let levels = [
        ActivityLevel::Sedentary,
        ActivityLevel::Light,
        ActivityLevel::Moderate,
        ActivityLevel::Active,
        ActivityLevel::VeryActive,
    ];

    UserProfile::new(format!("user_{}", i))
        .with_birthdate(NaiveDate::from_ymd_opt(1940 + (i % 70) as i32, 1 + (i % 12) as u32, 1).unwrap())
        .with_gender(genders[i % genders.len()])
        .with_height_cm(Decimal::from(150 + (i % 50) as u32))
        .with_weight_kg(dec!(50) + Decimal::from((i % 60) as u32))
        .with_activity_level(levels[i % levels.len()])
}

fn bench_formulas(c: &mut Criterion) {
    let calculators = GoalCalculators::standard();
    let input =
        CalculationInput::new(30, Gender::Male, dec!(180), dec!(75), ActivityLevel::Sedentary).unwrap();

    let mut group = c.benchmark_group("Goal Formulas");
    group.bench_function("steps", |b| b.iter(|| calculators.steps.calculate(black_box(&input))));
    group.bench_function("calories", |b| b.iter(|| calculators.calories.calculate(black_box(&input))));
    group.bench_function("heart_points", |b| {
        b.iter(|| calculators.heart_points.calculate(black_box(&input)))
    });
    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let profile = create_benchmark_profile(7);
    c.bench_function("profile_fingerprint", |b| {
        b.iter(|| ProfileFingerprint::of(black_box(&profile), today()))
    });
}

fn bench_orchestrator(c: &mut Criterion) {
    let store = Arc::new(InMemoryStore::new());
    store.upsert_profile(create_benchmark_profile(0));
    let orchestrator = GoalCalculationOrchestrator::new(store.clone(), store.clone())
        .with_clock(Arc::new(FixedClock::at_date(today())));

    let mut group = c.benchmark_group("Calculate And Store");
    group.bench_function("cache_hit", |b| {
        b.iter(|| orchestrator.calculate_and_store(black_box("user_0"), false))
    });
    group.bench_function("forced", |b| {
        b.iter(|| orchestrator.calculate_and_store(black_box("user_0"), true))
    });
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Batch Recalculation");

    for &size in &[10, 100, 1000] {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..size {
            store.upsert_profile(create_benchmark_profile(i));
        }
        let orchestrator = GoalCalculationOrchestrator::new(store.clone(), store)
            .with_clock(Arc::new(FixedClock::at_date(today())));
        let users: Vec<String> = (0..size).map(|i| format!("user_{}", i)).collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("calculate_batch", size), &users, |b, users| {
            b.iter(|| orchestrator.calculate_batch(users, true))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_formulas,
    bench_fingerprint,
    bench_orchestrator,
    bench_batch
);
criterion_main!(benches);
