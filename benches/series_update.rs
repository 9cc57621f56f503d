//! Throughput of the streaming engine and of a rolling entry point.
//!
//! Run with: `cargo bench --bench series_update`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dxtc::{
    lower, ArgValue, DType, ExpandingPolicy, IrFunction, IrModule, LowerOptions, ModuleInstance,
    SeriesState, Tensor,
};

/// Deterministic series with a missing value every 17th step.
fn generate_series(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| {
            if i % 17 == 16 {
                f64::NAN
            } else {
                100.0 + (i as f64 * 0.1).sin() * 2.0
            }
        })
        .collect()
}

const SIZES: &[usize] = &[1_000, 10_000, 100_000];
const WINDOWS: &[usize] = &[5, 50, 500];

fn bench_series_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("series_state");
    let data = generate_series(100_000);
    for &window in WINDOWS {
        group.throughput(Throughput::Elements(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(window), &window, |b, &window| {
            b.iter(|| {
                let mut state = SeriesState::<f64>::new(window, ExpandingPolicy::PartialMean)
                    .expect("valid window");
                let mut last = 0.0;
                for &v in &data {
                    last = state.update(black_box(v));
                }
                last
            })
        });
    }
    group.finish();
}

fn bench_ts_mean_entry(c: &mut Criterion) {
    let module = IrModule::new().with_function(
        IrFunction::new("ts")
            .with_kernel("my_ts_mean")
            .param("data", &[-1], DType::Float32)
            .param("window", &[1], DType::Int32),
    );
    let mut group = c.benchmark_group("ts_mean_entry");
    for &size in SIZES {
        let options = LowerOptions {
            max_series: size,
            ..LowerOptions::default()
        };
        let emitted = lower(&module, &options).expect("module lowers");
        let instance = ModuleInstance::load(&emitted);
        let values: Vec<f32> = generate_series(size).into_iter().map(|v| v as f32).collect();
        let mut args = vec![
            ArgValue::from(Tensor::from_vec(values)),
            ArgValue::from(Tensor::scalar(20i32)),
            ArgValue::from(Tensor::zeros(DType::Float32, &[size])),
        ];
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| instance.invoke("ts", black_box(&mut args)).expect("call succeeds"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_series_state, bench_ts_mean_entry);
criterion_main!(benches);
