// Copyright 2025 Irreducible Inc.

use std::{
	marker::PhantomData,
	sync::{Arc, Weak},
};

use static_assertions::assert_impl_all;
use strata_utils::{checked_arithmetics::checked_product, ensure};

use crate::{
	buffer::{Buffer, BufferId, DevicePtr},
	dtype::{as_elements, as_elements_mut, DType, Element},
	error::Error,
};

/// Identifies the region of a tensor inside its buffer's offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorRegion {
	pub(crate) buffer: BufferId,
	pub(crate) slot: usize,
}

/// A typed, shaped view into a region of a [`Buffer`].
///
/// The tensor does not own memory. It refers to its buffer weakly, so cloning or dropping a
/// tensor never allocates or frees device memory.
#[derive(Debug, Clone)]
pub struct Tensor<T: Element> {
	dims: Vec<usize>,
	region: TensorRegion,
	buffer: Weak<Buffer>,
	_marker: PhantomData<T>,
}

assert_impl_all!(Tensor<f32>: Send, Sync);

impl<T: Element> Tensor<T> {
	pub(crate) fn new(
		buffer: Weak<Buffer>,
		buffer_id: BufferId,
		slot: usize,
		dims: Vec<usize>,
	) -> Self {
		Self {
			dims,
			region: TensorRegion {
				buffer: buffer_id,
				slot,
			},
			buffer,
			_marker: PhantomData,
		}
	}

	pub fn dims(&self) -> &[usize] {
		&self.dims
	}

	pub fn dtype(&self) -> DType {
		T::DTYPE
	}

	pub fn num_elements(&self) -> usize {
		self.dims.iter().product()
	}

	pub fn size_in_bytes(&self) -> usize {
		self.num_elements() * T::SIZE
	}

	pub fn buffer_id(&self) -> BufferId {
		self.region.buffer
	}

	pub fn region(&self) -> TensorRegion {
		self.region
	}

	pub fn belongs_to(&self, buffer: &Buffer) -> bool {
		self.region.buffer == buffer.id()
	}

	/// Upgrades the back-reference to the owning buffer.
	pub fn buffer(&self) -> Result<Arc<Buffer>, Error> {
		self.buffer.upgrade().ok_or(Error::BufferDropped)
	}

	/// Address of the tensor's memory.
	///
	/// Fails with [`Error::NotAllocated`] until the owning buffer has been allocated.
	pub fn device_pointer(&self) -> Result<DevicePtr, Error> {
		self.buffer()?.device_pointer(self.region.slot)
	}

	/// Creates a tensor with a different shape over the same memory.
	///
	/// The view aliases `self`; kernels cannot borrow both at once.
	pub fn view(&self, dims: &[usize]) -> Result<Self, Error> {
		ensure!(
			!dims.is_empty() && dims.iter().all(|&dim| dim > 0),
			Error::InvalidShape {
				dims: dims.to_vec(),
				reason: "dimensions must be non-empty and non-zero",
			}
		);
		ensure!(
			checked_product(dims) == Some(self.num_elements()),
			Error::InvalidShape {
				dims: dims.to_vec(),
				reason: "view must have the same number of elements",
			}
		);
		Ok(Self {
			dims: dims.to_vec(),
			..self.clone()
		})
	}

	/// Copies `src` from the host into the tensor.
	pub fn copy_from_host(&self, src: &[T]) -> Result<(), Error> {
		ensure!(
			src.len() == self.num_elements(),
			Error::LengthMismatch {
				expected: self.num_elements(),
				actual: src.len(),
			}
		);
		self.buffer()?.launch(|mem| {
			let [dst] = mem.regions([self.region])?;
			as_elements_mut::<T>(dst).copy_from_slice(src);
			Ok(())
		})
	}

	/// Copies the tensor to host memory, synchronizing with the device first.
	pub fn copy_to_host(&self) -> Result<Vec<T>, Error> {
		let buffer = self.buffer()?;
		buffer.device().synchronize();
		buffer.launch(|mem| {
			let [src] = mem.regions([self.region])?;
			Ok(as_elements::<T>(src).to_vec())
		})
	}

	/// Sets every element to `value`.
	pub fn fill(&self, value: T) -> Result<(), Error> {
		self.buffer()?.launch(|mem| {
			let [dst] = mem.regions([self.region])?;
			as_elements_mut::<T>(dst).fill(value);
			Ok(())
		})
	}
}
