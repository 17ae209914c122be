// Copyright 2025 Irreducible Inc.

use std::fmt::{self, Debug, Display};

use half::f16;

/// Numeric element kinds supported by device tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
	F32,
	F16,
}

impl DType {
	pub const fn size_in_bytes(self) -> usize {
		match self {
			Self::F32 => 4,
			Self::F16 => 2,
		}
	}
}

impl Display for DType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::F32 => write!(f, "f32"),
			Self::F16 => write!(f, "f16"),
		}
	}
}

mod sealed {
	pub trait Sealed {}

	impl Sealed for f32 {}
	impl Sealed for half::f16 {}
}

/// A scalar type that can live in device memory.
///
/// The set of implementors is closed: single precision `f32` and half precision [`f16`].
/// Arithmetic on elements is carried out in `f32`; conversions back to the element type round to
/// nearest, ties to even.
pub trait Element:
	sealed::Sealed + bytemuck::Pod + Debug + PartialEq + Send + Sync + 'static
{
	const DTYPE: DType;
	const SIZE: usize = Self::DTYPE.size_in_bytes();
	const ZERO: Self;
	/// Machine epsilon of the element type, expressed in `f32`.
	const EPSILON: f32;

	fn to_f32(self) -> f32;

	fn from_f32(val: f32) -> Self;
}

impl Element for f32 {
	const DTYPE: DType = DType::F32;
	const ZERO: Self = 0.0;
	const EPSILON: f32 = f32::EPSILON;

	#[inline(always)]
	fn to_f32(self) -> f32 {
		self
	}

	#[inline(always)]
	fn from_f32(val: f32) -> Self {
		val
	}
}

impl Element for f16 {
	const DTYPE: DType = DType::F16;
	const ZERO: Self = f16::ZERO;
	const EPSILON: f32 = 0.000_976_562_5;

	#[inline(always)]
	fn to_f32(self) -> f32 {
		f16::to_f32(self)
	}

	#[inline(always)]
	fn from_f32(val: f32) -> Self {
		f16::from_f32(val)
	}
}

/// Reinterprets a device region as elements.
///
/// ## Preconditions
///
/// * `bytes` must start at an offset aligned to `T` and have a length that is a multiple of
///   `T::SIZE`. Regions handed out by [`crate::KernelMemory`] always satisfy this.
pub fn as_elements<T: Element>(bytes: &[u8]) -> &[T] {
	bytemuck::cast_slice(bytes)
}

/// Mutable counterpart of [`as_elements`].
pub fn as_elements_mut<T: Element>(bytes: &mut [u8]) -> &mut [T] {
	bytemuck::cast_slice_mut(bytes)
}
