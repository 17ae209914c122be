// Copyright 2025 Irreducible Inc.

//! Layers executing forward and backward passes over tensors bound to a shared [`Buffer`].
//!
//! [`Buffer`]: strata_compute::Buffer

mod activation;
mod dropout;
mod error;
mod layer;
mod network;

pub use activation::{ActivationLayer, ElementwiseKernel, Relu, ReluLayer};
pub use dropout::DropoutLayer;
pub use error::Error;
pub use layer::{ExecMode, Layer};
pub use network::{Network, NetworkBuilder};
