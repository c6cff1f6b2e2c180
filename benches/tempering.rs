use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ndarray::arr1;
use pt_mcmc::distributions::GaussianMixture;
use pt_mcmc::ladder::TemperatureLadder;
use pt_mcmc::parallel_tempering::ParallelTempering;

fn make_sampler() -> ParallelTempering<f64, GaussianMixture<f64>> {
    let target = GaussianMixture::isotropic(vec![arr1(&[-3.0, -3.0]), arr1(&[3.0, 3.0])], 1.0);
    let ladder = TemperatureLadder::geometric(0.5, 0.01).unwrap();
    ParallelTempering::new(target, &[0.0, 0.0], 1.0, true, ladder)
        .unwrap()
        .set_seed(0)
}

fn bench_run(c: &mut Criterion) {
    c.bench_function("pt_run_100_steps", |b| {
        b.iter_batched(
            make_sampler,
            |mut pt| pt.run(100, 5).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_ladder(c: &mut Criterion) {
    c.bench_function("geometric_ladder", |b| {
        b.iter(|| TemperatureLadder::<f64>::geometric(0.5, 0.01).unwrap())
    });
}

criterion_group!(benches, bench_run, bench_ladder);
criterion_main!(benches);
