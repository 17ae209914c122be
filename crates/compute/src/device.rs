// Copyright 2025 Irreducible Inc.

use std::{
	fmt::Debug,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
};

use bytemuck::zeroed_vec;
use rand::rngs::StdRng;

use crate::alloc::Error;

/// A hardware abstraction for the device that executes kernels.
///
/// Work issued to a device executes in issue order on a single stream. Host code only observes
/// results after a [`Self::synchronize`] point, which every device-to-host transfer performs.
pub trait ComputeDevice: Debug + Send + Sync {
	/// Ordinal of the device.
	fn id(&self) -> usize;

	/// Alignment in bytes of every region carved out of a device allocation.
	fn alignment(&self) -> usize;

	/// Total memory budget of the device, in bytes.
	fn capacity(&self) -> usize;

	/// Bytes not currently claimed by any live allocation.
	fn available(&self) -> usize;

	/// Allocates `n` bytes of zeroed device memory.
	///
	/// The memory is returned to the device when the allocation is dropped.
	fn alloc(&self, n: usize) -> Result<DeviceAllocation, Error>;

	/// Forks a random generator from the device's seeded random source.
	///
	/// Generators forked from devices constructed with the same seed produce the same sequence, in
	/// fork order.
	fn seed_generator(&self) -> StdRng;

	/// Blocks the host until all issued work has completed.
	fn synchronize(&self);
}

/// Tracks how many bytes of a fixed capacity are claimed.
#[derive(Debug)]
pub struct MemoryBudget {
	capacity: usize,
	used: AtomicUsize,
}

impl MemoryBudget {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			used: AtomicUsize::new(0),
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn available(&self) -> usize {
		self.capacity - self.used.load(Ordering::Acquire)
	}

	fn try_claim(&self, n: usize) -> Result<(), Error> {
		self.used
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
				used.checked_add(n).filter(|&total| total <= self.capacity)
			})
			.map(|_| ())
			.map_err(|used| Error::OutOfMemory {
				requested: n,
				available: self.capacity - used,
			})
	}

	fn release(&self, n: usize) {
		self.used.fetch_sub(n, Ordering::AcqRel);
	}
}

/// One contiguous block of device memory, charged against a [`MemoryBudget`].
#[derive(Debug)]
pub struct DeviceAllocation {
	words: Vec<u64>,
	len: usize,
	budget: Arc<MemoryBudget>,
}

impl DeviceAllocation {
	/// Claims `n` bytes from `budget` and backs them with zeroed host memory.
	pub fn new(budget: Arc<MemoryBudget>, n: usize) -> Result<Self, Error> {
		budget.try_claim(n)?;
		Ok(Self {
			words: zeroed_vec(n.div_ceil(std::mem::size_of::<u64>())),
			len: n,
			budget,
		})
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn as_bytes(&self) -> &[u8] {
		&bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
	}

	pub fn as_bytes_mut(&mut self) -> &mut [u8] {
		&mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
	}
}

impl Drop for DeviceAllocation {
	fn drop(&mut self) {
		self.budget.release(self.len);
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_budget_is_returned_on_drop() {
		let budget = Arc::new(MemoryBudget::new(1024));
		{
			let allocation = DeviceAllocation::new(budget.clone(), 1000).unwrap();
			assert_eq!(allocation.len(), 1000);
			assert_eq!(allocation.as_bytes().len(), 1000);
			assert_eq!(budget.available(), 24);
			assert_matches!(
				DeviceAllocation::new(budget.clone(), 25),
				Err(Error::OutOfMemory {
					requested: 25,
					available: 24
				})
			);
		}
		assert_eq!(budget.available(), 1024);
	}

	#[test]
	fn test_allocation_is_zeroed() {
		let budget = Arc::new(MemoryBudget::new(64));
		let allocation = DeviceAllocation::new(budget, 13).unwrap();
		assert!(allocation.as_bytes().iter().all(|&b| b == 0));
	}
}
