// Copyright 2025 Irreducible Inc.

use std::{
	fmt::{self, Display},
	ops::Range,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
};

use static_assertions::assert_impl_all;
use strata_utils::{checked_arithmetics::checked_product, ensure};
use tracing::instrument;

use crate::{
	alloc::BumpAllocator,
	device::{ComputeDevice, DeviceAllocation},
	dtype::Element,
	error::Error,
	tensor::{Tensor, TensorRegion},
};

static NEXT_BUFFER_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-unique identifier of a [`Buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(usize);

impl Display for BufferId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "buffer #{}", self.0)
	}
}

/// Address of a bound tensor region: the owning arena and a byte range inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr {
	pub buffer: BufferId,
	pub offset: usize,
	pub len: usize,
}

#[derive(Debug)]
enum State {
	Reserving(BumpAllocator),
	Allocated(DeviceAllocation),
	Failed,
}

#[derive(Debug)]
struct Inner {
	state: State,
	/// Byte range of every reservation, indexed by slot.
	regions: Vec<Range<usize>>,
	size: usize,
}

/// Two-phase arena of device memory.
///
/// While *reserving*, [`Self::reserve`] records shape requests and hands out unbound tensors.
/// [`Self::allocate`] then performs one contiguous device allocation covering every reservation
/// and binds the tensors to their offsets. After that the layout is frozen. If the allocation
/// fails the buffer is unusable and the whole graph that reserved from it has to be rebuilt.
///
/// Tensors and layers hold weak references to the buffer; the memory is released when the last
/// strong reference, held by the graph builder, is dropped.
#[derive(Debug)]
pub struct Buffer {
	id: BufferId,
	device: Arc<dyn ComputeDevice>,
	inner: Mutex<Inner>,
}

assert_impl_all!(Buffer: Send, Sync);

impl Buffer {
	pub fn create(device: Arc<dyn ComputeDevice>) -> Arc<Self> {
		let id = BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed));
		let planner = BumpAllocator::new(device.alignment());
		Arc::new(Self {
			id,
			device,
			inner: Mutex::new(Inner {
				state: State::Reserving(planner),
				regions: Vec::new(),
				size: 0,
			}),
		})
	}

	pub fn id(&self) -> BufferId {
		self.id
	}

	pub fn device(&self) -> &Arc<dyn ComputeDevice> {
		&self.device
	}

	/// Reserves a region for a tensor of shape `dims`.
	///
	/// The returned tensor is not backed by memory until [`Self::allocate`] succeeds.
	///
	/// ## Preconditions
	///
	/// * `dims` must have at least one dimension, and every dimension must be non-zero.
	pub fn reserve<T: Element>(self: &Arc<Self>, dims: &[usize]) -> Result<Tensor<T>, Error> {
		ensure!(
			!dims.is_empty(),
			Error::InvalidShape {
				dims: dims.to_vec(),
				reason: "at least one dimension is required",
			}
		);
		ensure!(
			dims.iter().all(|&dim| dim > 0),
			Error::InvalidShape {
				dims: dims.to_vec(),
				reason: "dimensions must be non-zero",
			}
		);
		let n_bytes = checked_product(dims)
			.and_then(|n_elems| n_elems.checked_mul(T::SIZE))
			.ok_or_else(|| Error::InvalidShape {
				dims: dims.to_vec(),
				reason: "size overflows the address space",
			})?;

		let mut inner = self.lock();
		let Inner {
			state,
			regions,
			size,
		} = &mut *inner;
		let planner = match state {
			State::Reserving(planner) => planner,
			State::Allocated(_) => return Err(Error::AlreadyAllocated(self.id)),
			State::Failed => return Err(Error::Failed(self.id)),
		};
		let region = planner.alloc(n_bytes)?;
		*size = planner.size();

		let slot = regions.len();
		tracing::trace!(buffer = %self.id, slot, ?dims, dtype = %T::DTYPE, "reserved tensor");
		regions.push(region);

		Ok(Tensor::new(Arc::downgrade(self), self.id, slot, dims.to_vec()))
	}

	/// Backs every reservation with a single device allocation.
	///
	/// On failure the buffer transitions to a terminal failed state.
	#[instrument(skip_all, name = "Buffer::allocate", fields(buffer = %self.id), level = "debug")]
	pub fn allocate(&self) -> Result<(), Error> {
		let mut inner = self.lock();
		match inner.state {
			State::Reserving(_) => {}
			State::Allocated(_) => return Err(Error::AlreadyAllocated(self.id)),
			State::Failed => return Err(Error::Failed(self.id)),
		}

		let size = inner.size;
		match self.device.alloc(size) {
			Ok(memory) => {
				tracing::debug!(bytes = size, tensors = inner.regions.len(), "allocated buffer");
				inner.state = State::Allocated(memory);
				Ok(())
			}
			Err(err) => {
				tracing::warn!(bytes = size, %err, "buffer allocation failed");
				inner.state = State::Failed;
				Err(err.into())
			}
		}
	}

	/// Whether the buffer still accepts reservations.
	pub fn is_reserving(&self) -> bool {
		matches!(self.lock().state, State::Reserving(_))
	}

	pub fn is_allocated(&self) -> bool {
		matches!(self.lock().state, State::Allocated(_))
	}

	/// Bytes needed to back all reservations, including alignment padding.
	pub fn size_in_bytes(&self) -> usize {
		self.lock().size
	}

	/// Number of tensors reserved from this buffer.
	pub fn num_reservations(&self) -> usize {
		self.lock().regions.len()
	}

	pub(crate) fn device_pointer(&self, slot: usize) -> Result<DevicePtr, Error> {
		let inner = self.lock();
		ensure!(matches!(inner.state, State::Allocated(_)), Error::NotAllocated(self.id));
		let region = inner
			.regions
			.get(slot)
			.ok_or(Error::ForeignTensor(self.id))?;
		Ok(DevicePtr {
			buffer: self.id,
			offset: region.start,
			len: region.len(),
		})
	}

	/// Runs a kernel over the allocated arena.
	///
	/// The arena stays locked for the duration of `kernel`, which borrows tensor regions from the
	/// provided [`KernelMemory`]. A panicking kernel poisons the lock, and every later call on the
	/// buffer panics; the graph owning it must be rebuilt.
	pub fn launch<R>(
		&self,
		kernel: impl FnOnce(&mut KernelMemory<'_>) -> Result<R, Error>,
	) -> Result<R, Error> {
		let mut inner = self.lock();
		let Inner { state, regions, .. } = &mut *inner;
		let memory = match state {
			State::Allocated(memory) => memory,
			State::Reserving(_) | State::Failed => return Err(Error::NotAllocated(self.id)),
		};

		let mut kernel_memory = KernelMemory {
			buffer: self.id,
			bytes: memory.as_bytes_mut(),
			regions,
		};
		kernel(&mut kernel_memory)
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().expect("mutex is always available")
	}
}

/// The allocated arena of one [`Buffer`], as seen by a running kernel.
pub struct KernelMemory<'a> {
	buffer: BufferId,
	bytes: &'a mut [u8],
	regions: &'a [Range<usize>],
}

impl KernelMemory<'_> {
	pub fn buffer_id(&self) -> BufferId {
		self.buffer
	}

	/// Borrows the regions of `N` tensors at once.
	///
	/// The regions are returned in argument order. Fails if any tensor was reserved from another
	/// buffer, or if two of the tensors share memory (e.g. a tensor and its view).
	pub fn regions<const N: usize>(
		&mut self,
		tensors: [TensorRegion; N],
	) -> Result<[&mut [u8]; N], Error> {
		let mut order = Vec::with_capacity(N);
		for (index, tensor) in tensors.iter().enumerate() {
			ensure!(tensor.buffer == self.buffer, Error::ForeignTensor(self.buffer));
			let range = self
				.regions
				.get(tensor.slot)
				.cloned()
				.ok_or(Error::ForeignTensor(self.buffer))?;
			order.push((index, range));
		}
		order.sort_by_key(|(_, range)| range.start);

		let mut borrowed: [Option<&mut [u8]>; N] = std::array::from_fn(|_| None);
		let mut rest = &mut *self.bytes;
		let mut cursor = 0;
		for (index, range) in order {
			ensure!(range.start >= cursor, Error::AliasedRegions(self.buffer));
			let (_, tail) = std::mem::take(&mut rest).split_at_mut(range.start - cursor);
			let (region, tail) = tail.split_at_mut(range.len());
			borrowed[index] = Some(region);
			rest = tail;
			cursor = range.end;
		}

		Ok(borrowed.map(|region| region.expect("every index is assigned exactly once")))
	}
}
