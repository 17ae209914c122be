// Copyright 2025 Irreducible Inc.

//! Reference CPU implementation of a compute device.
//!
//! Device memory is host memory and kernels run synchronously on the calling thread. It is used to
//! validate the abstract interfaces and as the algorithmic reference for accelerated devices.

mod device;

pub use device::{CpuDevice, CpuDeviceConfig, MEMORY_LIMIT_ENV};
