// Copyright 2025 Irreducible Inc.

use std::fmt;

use strata_compute::{Buffer, Element, Tensor};
use strata_utils::ensure;

use crate::error::Error;

/// Execution mode of a forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecMode {
	/// Stochastic layers are active and record the state needed by the backward pass.
	Training,
	/// Every layer is deterministic and no backward state is recorded.
	Inference,
}

impl fmt::Display for ExecMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Training => write!(f, "training"),
			Self::Inference => write!(f, "inference"),
		}
	}
}

/// A node of the layer graph.
///
/// A layer reads its input tensor and writes its output tensor during [`Self::fprop`]. During
/// [`Self::bprop`] the same tensors carry gradients the other way: the output tensor holds the
/// gradient with respect to the output, and the layer overwrites the input tensor with the gradient
/// with respect to the input.
///
/// Shapes are fixed at construction. Every tensor a layer touches lives in the buffer it was
/// constructed with, and that buffer must be allocated before either pass runs.
pub trait Layer: Send + Sync {
	fn name(&self) -> &'static str;

	fn input_dims(&self) -> &[usize];

	fn output_dims(&self) -> &[usize];

	fn fprop(&mut self, mode: ExecMode) -> Result<(), Error>;

	fn bprop(&mut self) -> Result<(), Error>;
}

/// Checks the constructor arguments shared by layers that map a tensor onto one of equal shape.
pub(crate) fn check_elementwise_io<T: Element>(
	input: &Tensor<T>,
	output: &Tensor<T>,
	buffer: &Buffer,
) -> Result<(), Error> {
	ensure!(
		input.dims() == output.dims(),
		Error::InvalidArgument(format!(
			"input shape {:?} does not match output shape {:?}",
			input.dims(),
			output.dims()
		))
	);
	ensure!(
		buffer.is_reserving(),
		Error::InvalidArgument(format!("{} no longer accepts reservations", buffer.id()))
	);
	ensure!(
		input.belongs_to(buffer) && output.belongs_to(buffer),
		Error::InvalidArgument(format!("layer tensors must be reserved from {}", buffer.id()))
	);
	// Views share their region with the tensor they were made from.
	ensure!(
		input.region() != output.region(),
		Error::InvalidArgument("input and output must be distinct tensors".into())
	);
	Ok(())
}

