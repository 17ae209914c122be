// Copyright 2025 Irreducible Inc.

//! Device memory model for the execution core.
//!
//! Memory is organised in two phases. Components first [`Buffer::reserve`] typed regions of a
//! [`Buffer`], receiving unbound [`Tensor`] handles, and then a single [`Buffer::allocate`] call
//! backs every reservation with one contiguous device allocation. Kernels borrow the bound
//! regions through [`Buffer::launch`].

pub mod alloc;
pub mod buffer;
pub mod cpu;
pub mod device;
pub mod dtype;
mod error;
pub mod tensor;

pub use buffer::{Buffer, BufferId, DevicePtr, KernelMemory};
pub use device::{ComputeDevice, DeviceAllocation, MemoryBudget};
pub use dtype::{DType, Element};
pub use error::Error;
pub use tensor::{Tensor, TensorRegion};
