// Copyright 2025 Irreducible Inc.

use std::{f32::consts::TAU, iter::repeat_with};

use rand::Rng;
use strata_compute::Element;

/// Samples `n` values from a normal distribution with the given mean and standard deviation.
pub fn gaussian_data<T: Element>(rng: &mut impl Rng, n: usize, mean: f32, stddev: f32) -> Vec<T> {
	// Box-Muller transform; `1 - u` keeps the logarithm argument in (0, 1].
	repeat_with(|| {
		let u1 = 1.0 - rng.gen::<f32>();
		let u2 = rng.gen::<f32>();
		let z = (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos();
		T::from_f32(mean + stddev * z)
	})
	.take(n)
	.collect()
}

/// Asserts that `actual` equals `expected` up to the rounding of `T`.
pub fn assert_close<T: Element>(actual: T, expected: f32) {
	let tolerance = 2.0 * T::EPSILON * expected.abs().max(1.0);
	assert!(
		(actual.to_f32() - expected).abs() <= tolerance,
		"expected {expected}, got {actual:?} ({} type)",
		T::DTYPE
	);
}
