use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use omnipd::fitting::calculate_omnipd_model;
use omnipd::models::{Activity, ActivitySummary, DataPoint, Sport};
use omnipd::power_curve::{mean_maximal_power, resample_power, MmpExtractor};
use omnipd::OmniPdParams;

/// Benchmarks for model fitting and best-effort extraction

fn bench_model_fit(c: &mut Criterion) {
    let truth = OmniPdParams::new(280.0, 20_000.0, 1150.0, 30.0);
    let mut group = c.benchmark_group("OmniPD Fit");

    for &count in &[6usize, 12, 48] {
        // Log-spaced durations from 2 s to 2 h
        let durations: Vec<f64> = (0..count)
            .map(|i| 2.0 * (3600.0f64).powf(i as f64 / (count - 1) as f64))
            .collect();
        let powers: Vec<f64> = durations
            .iter()
            .enumerate()
            .map(|(i, &t)| truth.power_at(t).unwrap() + if i % 2 == 0 { 3.0 } else { -3.0 })
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("calculate_omnipd_model", count),
            &(durations, powers),
            |b, (durations, powers)| {
                b.iter(|| calculate_omnipd_model(black_box(durations), black_box(powers)));
            },
        );
    }

    group.finish();
}

fn create_activity(seconds: u32) -> Activity {
    let samples: Vec<DataPoint> = (0..seconds)
        .map(|t| DataPoint {
            timestamp: t,
            power: Some(150 + ((t * 37) % 250) as u16),
            ..Default::default()
        })
        .collect();
    Activity {
        id: format!("bench_{}", seconds),
        date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        start_time: None,
        sport: Sport::Cycling,
        duration_seconds: seconds,
        summary: ActivitySummary::from_samples(&samples),
        samples,
        source: None,
    }
}

fn bench_mmp_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("MMP Extraction");

    for &hours in &[1u32, 3, 6] {
        let activity = create_activity(hours * 3600);
        group.throughput(Throughput::Elements(activity.samples.len() as u64));

        group.bench_with_input(BenchmarkId::new("extract", hours), &activity, |b, activity| {
            let extractor = MmpExtractor::new();
            b.iter(|| extractor.extract(black_box(activity)));
        });

        let series = resample_power(&activity.samples);
        group.bench_with_input(BenchmarkId::new("mmp_20min", hours), &series, |b, series| {
            b.iter(|| mean_maximal_power(black_box(series), 1200));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_model_fit, bench_mmp_extraction);
criterion_main!(benches);
