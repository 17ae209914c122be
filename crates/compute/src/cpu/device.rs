// Copyright 2025 Irreducible Inc.

use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc, Mutex,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use strata_utils::env::usize_env;

use crate::{
	alloc::Error,
	device::{ComputeDevice, DeviceAllocation, MemoryBudget},
};

/// Environment variable overriding [`CpuDeviceConfig::memory_limit`].
pub const MEMORY_LIMIT_ENV: &str = "STRATA_DEVICE_MEMORY_LIMIT";

#[derive(Debug, Clone)]
pub struct CpuDeviceConfig {
	pub device_id: usize,
	/// Memory budget in bytes.
	pub memory_limit: usize,
	/// Seed of the device random source.
	pub seed: u64,
}

impl Default for CpuDeviceConfig {
	fn default() -> Self {
		Self {
			device_id: 0,
			memory_limit: 1 << 30,
			seed: 0,
		}
	}
}

impl CpuDeviceConfig {
	/// Default configuration with the memory limit taken from [`MEMORY_LIMIT_ENV`] when set.
	pub fn from_env() -> Self {
		let mut config = Self::default();
		if let Some(memory_limit) = usize_env(MEMORY_LIMIT_ENV) {
			config.memory_limit = memory_limit;
		}
		config
	}

	pub fn with_memory_limit(mut self, memory_limit: usize) -> Self {
		self.memory_limit = memory_limit;
		self
	}

	pub fn with_seed(mut self, seed: u64) -> Self {
		self.seed = seed;
		self
	}
}

#[derive(Debug)]
pub struct CpuDevice {
	id: usize,
	budget: Arc<MemoryBudget>,
	rng: Mutex<StdRng>,
	sync_count: AtomicUsize,
}

impl CpuDevice {
	pub const ALIGNMENT: usize = 256;

	pub fn new(config: CpuDeviceConfig) -> Self {
		tracing::debug!(
			device = config.device_id,
			memory_limit = config.memory_limit,
			seed = config.seed,
			"creating CPU device"
		);
		Self {
			id: config.device_id,
			budget: Arc::new(MemoryBudget::new(config.memory_limit)),
			rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
			sync_count: AtomicUsize::new(0),
		}
	}

	/// Number of host synchronization points reached so far.
	pub fn sync_count(&self) -> usize {
		self.sync_count.load(Ordering::Relaxed)
	}
}

impl Default for CpuDevice {
	fn default() -> Self {
		Self::new(CpuDeviceConfig::default())
	}
}

impl ComputeDevice for CpuDevice {
	fn id(&self) -> usize {
		self.id
	}

	fn alignment(&self) -> usize {
		Self::ALIGNMENT
	}

	fn capacity(&self) -> usize {
		self.budget.capacity()
	}

	fn available(&self) -> usize {
		self.budget.available()
	}

	fn alloc(&self, n: usize) -> Result<DeviceAllocation, Error> {
		DeviceAllocation::new(self.budget.clone(), n)
	}

	fn seed_generator(&self) -> StdRng {
		let seed: u64 = self.rng.lock().expect("mutex is always available").gen();
		StdRng::seed_from_u64(seed)
	}

	fn synchronize(&self) {
		// Kernels on the CPU device complete before their launch returns.
		self.sync_count.fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rand::RngCore;

	use super::*;

	#[test]
	fn test_alloc_within_limit() {
		let device = CpuDevice::new(CpuDeviceConfig::default().with_memory_limit(4096));
		let allocation = device.alloc(4096).unwrap();
		assert_eq!(device.available(), 0);
		assert_matches!(device.alloc(1), Err(Error::OutOfMemory { .. }));
		drop(allocation);
		assert_eq!(device.available(), 4096);
	}

	#[test]
	fn test_seed_generator_is_reproducible() {
		let config = CpuDeviceConfig::default().with_seed(7);
		let a = CpuDevice::new(config.clone());
		let b = CpuDevice::new(config);

		let (mut a1, mut a2) = (a.seed_generator(), a.seed_generator());
		let (mut b1, mut b2) = (b.seed_generator(), b.seed_generator());
		assert_eq!(a1.next_u64(), b1.next_u64());
		assert_eq!(a2.next_u64(), b2.next_u64());
	}

	#[test]
	fn test_memory_limit_from_env() {
		// Tests run on parallel threads sharing one environment.
		static ENV_LOCK: Mutex<()> = Mutex::new(());
		let _guard = ENV_LOCK.lock().unwrap();

		std::env::set_var(MEMORY_LIMIT_ENV, " 4096 ");
		let config = CpuDeviceConfig::from_env();
		assert_eq!(config.memory_limit, 4096);
		assert_eq!(CpuDevice::new(config).capacity(), 4096);

		let default_limit = CpuDeviceConfig::default().memory_limit;
		std::env::set_var(MEMORY_LIMIT_ENV, "lots");
		assert_eq!(CpuDeviceConfig::from_env().memory_limit, default_limit);

		std::env::remove_var(MEMORY_LIMIT_ENV);
		assert_eq!(CpuDeviceConfig::from_env().memory_limit, default_limit);
	}

	#[test]
	fn test_forked_generators_differ() {
		let device = CpuDevice::default();
		let mut first = device.seed_generator();
		let mut second = device.seed_generator();
		assert_ne!(first.next_u64(), second.next_u64());
	}
}
