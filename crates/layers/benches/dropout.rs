// Copyright 2025 Irreducible Inc.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use half::f16;
use strata_compute::Element;
use strata_compute_test_utils::layer::DropoutFixture;
use strata_layers::{ExecMode, Layer};

fn bench_dropout<T: Element>(c: &mut Criterion) {
	let mut group = c.benchmark_group(format!("dropout/{}", T::DTYPE));

	for (dim0, dim1) in [(32, 320), (1024, 1024)] {
		let mut fixture = DropoutFixture::<T>::new(&[dim0, dim1], 0.5, 0);
		fixture.input.fill(T::from_f32(1.0)).unwrap();

		let id = format!("{dim0}x{dim1}");
		group.throughput(Throughput::Elements((dim0 * dim1) as u64));
		group.bench_function(BenchmarkId::new("fprop_training", &id), |bench| {
			bench.iter(|| fixture.layer.fprop(ExecMode::Training).unwrap())
		});
		group.bench_function(BenchmarkId::new("fprop_bprop", &id), |bench| {
			bench.iter(|| {
				fixture.layer.fprop(ExecMode::Training).unwrap();
				fixture.layer.bprop().unwrap();
			})
		});
		group.bench_function(BenchmarkId::new("fprop_inference", &id), |bench| {
			bench.iter(|| fixture.layer.fprop(ExecMode::Inference).unwrap())
		});
	}

	group.finish()
}

criterion_group!(dropout, bench_dropout::<f32>, bench_dropout::<f16>);
criterion_main!(dropout);
