//! Environment Benchmarks
//!
//! Hot paths on the control loop:
//! 1. FactoryEnergyEnv::step() - once per control cycle
//! 2. RegisterStore::write()/read() - nine state writes per step plus monitor reads
//! 3. ExperienceBuffer::sample() - batch extraction for external trainers
//!
//! ## Performance Targets
//! - Environment step: < 10µs (21 units, 9 register writes)
//! - Register write: < 100ns
//! - Sampling: < 100µs for a batch of 64

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use lader_core::{mapping, RegisterStore};
use lader_sim::{EnvConfig, EpisodeRunner, Experience, ExperienceBuffer, FactoryEnergyEnv, FixedPolicy};

fn create_env() -> FactoryEnergyEnv {
    let store = Arc::new(RegisterStore::with_default_mapping().expect("default mapping"));
    FactoryEnergyEnv::new(EnvConfig::default(), store).expect("default env")
}

// ============================================================================
// Environment
// ============================================================================

fn bench_env_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("env/step");
    for action in [0_i64, 4, 7] {
        let mut env = create_env();
        env.reset(42).expect("reset");

        group.bench_with_input(BenchmarkId::from_parameter(action), &action, |b, &action| {
            b.iter(|| env.step(black_box(action)).expect("step"))
        });
    }
    group.finish();
}

fn bench_env_reset(c: &mut Criterion) {
    let mut env = create_env();
    c.bench_function("env/reset", |b| b.iter(|| env.reset(black_box(42)).expect("reset")));
}

fn bench_runner_episode(c: &mut Criterion) {
    let mut group = c.benchmark_group("runner/episode");
    group.throughput(Throughput::Elements(100));
    group.bench_function("100_ticks", |b| {
        let mut runner = EpisodeRunner::new(create_env());
        let mut policy = FixedPolicy::new(6).expect("policy");
        b.iter(|| runner.run(&mut policy, 1, 100).expect("run"))
    });
    group.finish();
}

// ============================================================================
// Register store
// ============================================================================

fn bench_register_write(c: &mut Criterion) {
    let store = RegisterStore::with_default_mapping().expect("default mapping");
    c.bench_function("registers/write", |b| {
        b.iter(|| store.write(mapping::TOTAL_POWER, black_box(321.4)).expect("write"))
    });
}

fn bench_register_snapshot(c: &mut Criterion) {
    let store = RegisterStore::with_default_mapping().expect("default mapping");
    c.bench_function("registers/snapshot", |b| b.iter(|| black_box(store.snapshot())));
}

// ============================================================================
// Experience buffer
// ============================================================================

fn fill_buffer(size: usize) -> ExperienceBuffer {
    let mut env = create_env();
    let mut observation = env.reset(7).expect("reset");
    let mut buffer = ExperienceBuffer::new(size);
    for i in 0..size {
        let action = (i % 8) as i64;
        let result = env.step(action).expect("step");
        buffer.push(Experience::new(
            observation,
            action as u8,
            result.reward,
            result.observation,
            result.terminated,
            result.truncated,
        ));
        observation = result.observation;
    }
    buffer
}

fn bench_experience_buffer_sample(c: &mut Criterion) {
    let buffer = fill_buffer(1000);
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    let mut group = c.benchmark_group("experience_buffer/sample");
    for batch_size in [16, 32, 64] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| b.iter(|| buffer.sample_batch(black_box(batch_size), &mut rng)),
        );
    }
    group.finish();
}

criterion_group!(env_benches, bench_env_step, bench_env_reset, bench_runner_episode);

criterion_group!(register_benches, bench_register_write, bench_register_snapshot);

criterion_group!(buffer_benches, bench_experience_buffer_sample);

criterion_main!(env_benches, register_benches, buffer_benches);
