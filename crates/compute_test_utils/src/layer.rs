// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use rand::{prelude::StdRng, SeedableRng};
use strata_compute::{
	cpu::{CpuDevice, CpuDeviceConfig},
	Buffer, Element, Tensor,
};
use strata_layers::{DropoutLayer, ExecMode, Layer};

use crate::data::{assert_close, gaussian_data};

/// A dropout layer over a freshly allocated buffer.
pub struct DropoutFixture<T: Element> {
	pub buffer: Arc<Buffer>,
	pub input: Tensor<T>,
	pub output: Tensor<T>,
	pub layer: DropoutLayer<T>,
}

impl<T: Element> DropoutFixture<T> {
	pub fn new(dims: &[usize], rate: f32, seed: u64) -> Self {
		let device = CpuDevice::new(CpuDeviceConfig::default().with_seed(seed));
		let buffer = Buffer::create(Arc::new(device));
		let input = buffer.reserve::<T>(dims).unwrap();
		let output = buffer.reserve::<T>(dims).unwrap();
		let layer = DropoutLayer::new(
			input.clone(),
			output.clone(),
			&buffer,
			rate,
			buffer.device().as_ref(),
		)
		.unwrap();
		buffer.allocate().unwrap();

		Self {
			buffer,
			input,
			output,
			layer,
		}
	}
}

fn count_zeros<T: Element>(values: &[T]) -> usize {
	values.iter().filter(|x| x.to_f32() == 0.0).count()
}

/// Training-mode dropout zeroes about `rate` of the elements and rescales the rest.
pub fn test_generic_dropout_fprop<T: Element>(dim0: usize, dim1: usize, rate: f32) {
	let mut rng = StdRng::seed_from_u64(0);
	let mut fixture = DropoutFixture::<T>::new(&[dim0, dim1], rate, 0);
	let len = dim0 * dim1;

	let h_in = gaussian_data::<T>(&mut rng, len, 0.0, 1.0);
	fixture.input.copy_from_host(&h_in).unwrap();

	fixture.layer.fprop(ExecMode::Training).unwrap();
	let h_out = fixture.output.copy_to_host().unwrap();

	let zero_fraction = count_zeros(&h_out) as f32 / len as f32;
	assert!(
		(zero_fraction - rate).abs() <= 0.05 * rate,
		"zero fraction {zero_fraction} too far from rate {rate}"
	);

	let keep_prob = 1.0 - rate;
	for (&x, &y) in h_in.iter().zip(&h_out) {
		if y.to_f32() != 0.0 {
			assert_close(y, x.to_f32() / keep_prob);
		}
	}
}

/// The backward pass zeroes exactly the positions zeroed by the paired forward pass.
pub fn test_generic_dropout_bprop<T: Element>(dim0: usize, dim1: usize, rate: f32) {
	let mut rng = StdRng::seed_from_u64(1);
	let mut fixture = DropoutFixture::<T>::new(&[dim0, dim1], rate, 1);
	let len = dim0 * dim1;

	let h_in = gaussian_data::<T>(&mut rng, len, 0.0, 1.0);
	fixture.input.copy_from_host(&h_in).unwrap();
	fixture.layer.fprop(ExecMode::Training).unwrap();
	let h_out = fixture.output.copy_to_host().unwrap();

	let h_grad = gaussian_data::<T>(&mut rng, len, 0.0, 1.0);
	fixture.output.copy_from_host(&h_grad).unwrap();
	fixture.layer.bprop().unwrap();
	let h_in_grad = fixture.input.copy_to_host().unwrap();

	let keep_prob = 1.0 - rate;
	for ((&y, &dy), &dx) in h_out.iter().zip(&h_grad).zip(&h_in_grad) {
		if y.to_f32() == 0.0 {
			assert_eq!(dx.to_f32(), 0.0);
		} else {
			assert_close(dx, dy.to_f32() / keep_prob);
		}
	}
}

/// Inference-mode dropout copies its input unchanged, however often it runs.
pub fn test_generic_dropout_inference<T: Element>(dim0: usize, dim1: usize, rate: f32) {
	let mut rng = StdRng::seed_from_u64(2);
	let mut fixture = DropoutFixture::<T>::new(&[dim0, dim1], rate, 2);

	let h_in = gaussian_data::<T>(&mut rng, dim0 * dim1, 0.0, 1.0);
	fixture.input.copy_from_host(&h_in).unwrap();

	for _ in 0..2 {
		fixture.layer.fprop(ExecMode::Inference).unwrap();
		assert_eq!(fixture.output.copy_to_host().unwrap(), h_in);
	}
}

/// The retention mask drawn by one training forward pass from a device seeded with `seed`.
pub fn dropout_mask<T: Element>(dims: &[usize], rate: f32, seed: u64) -> Vec<f32> {
	let mut fixture = DropoutFixture::<T>::new(dims, rate, seed);
	fixture.layer.fprop(ExecMode::Training).unwrap();
	fixture.layer.mask().copy_to_host().unwrap()
}
