// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use assert_matches::assert_matches;
use rand::{prelude::StdRng, SeedableRng};
use strata_compute::{Buffer, ComputeDevice, Element, Error};

use crate::data::gaussian_data;

/// Device pointers of every tensor become available exactly when the buffer is allocated.
pub fn test_generic_device_pointer_lifecycle<T: Element>(device: Arc<dyn ComputeDevice>) {
	let buffer = Buffer::create(device);
	let tensors = [[32, 320], [1, 7], [5, 5]]
		.iter()
		.map(|dims| buffer.reserve::<T>(dims).unwrap())
		.collect::<Vec<_>>();

	for tensor in &tensors {
		assert_matches!(tensor.device_pointer(), Err(Error::NotAllocated(_)));
	}

	buffer.allocate().unwrap();

	let mut ptrs = tensors
		.iter()
		.map(|tensor| tensor.device_pointer().unwrap())
		.collect::<Vec<_>>();
	for (tensor, ptr) in tensors.iter().zip(&ptrs) {
		assert_eq!(ptr.buffer, buffer.id());
		assert_eq!(ptr.len, tensor.size_in_bytes());
		assert_eq!(ptr.offset % buffer.device().alignment(), 0);
	}

	// Regions of distinct reservations are disjoint.
	ptrs.sort_by_key(|ptr| ptr.offset);
	for pair in ptrs.windows(2) {
		assert!(pair[0].offset + pair[0].len <= pair[1].offset);
	}
	assert!(ptrs.last().unwrap().offset + ptrs.last().unwrap().len <= buffer.size_in_bytes());

	assert_matches!(buffer.reserve::<T>(&[1]), Err(Error::AlreadyAllocated(_)));
}

/// Data written to one tensor does not leak into its neighbours.
pub fn test_generic_host_roundtrip<T: Element>(device: Arc<dyn ComputeDevice>) {
	let mut rng = StdRng::seed_from_u64(0);

	let buffer = Buffer::create(device);
	let a = buffer.reserve::<T>(&[3, 5]).unwrap();
	let b = buffer.reserve::<T>(&[17]).unwrap();
	buffer.allocate().unwrap();

	let a_data = gaussian_data::<T>(&mut rng, a.num_elements(), 0.0, 1.0);
	let b_data = gaussian_data::<T>(&mut rng, b.num_elements(), 0.0, 1.0);
	a.copy_from_host(&a_data).unwrap();
	b.copy_from_host(&b_data).unwrap();

	assert_eq!(a.copy_to_host().unwrap(), a_data);
	assert_eq!(b.copy_to_host().unwrap(), b_data);
}
