// Copyright 2025 Irreducible Inc.

use std::{fmt::Debug, sync::Arc};

use rayon::prelude::*;
use strata_compute::{
	dtype::{as_elements, as_elements_mut},
	Buffer, Element, Tensor,
};
use tracing::instrument;

use crate::{
	error::Error,
	layer::{check_elementwise_io, ExecMode, Layer},
};

/// An elementwise activation kernel.
///
/// Kernels mutate their output slice in place and never allocate.
pub trait ElementwiseKernel: Debug + Send + Sync {
	const NAME: &'static str;

	fn forward<T: Element>(&self, input: &[T], output: &mut [T]);

	/// Computes the input gradient from the forward input and the output gradient.
	fn backward<T: Element>(&self, input: &[T], out_grad: &[T], in_grad: &mut [T]);
}

/// Rectified linear unit, `max(x, 0)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relu;

impl ElementwiseKernel for Relu {
	const NAME: &'static str = "ReLU";

	fn forward<T: Element>(&self, input: &[T], output: &mut [T]) {
		output
			.par_iter_mut()
			.zip(input.par_iter())
			.for_each(|(y, &x)| {
				*y = if x.to_f32() > 0.0 { x } else { T::ZERO };
			});
	}

	fn backward<T: Element>(&self, input: &[T], out_grad: &[T], in_grad: &mut [T]) {
		in_grad
			.par_iter_mut()
			.zip(input.par_iter())
			.zip(out_grad.par_iter())
			.for_each(|((dx, &x), &dy)| {
				*dx = if x.to_f32() > 0.0 { dy } else { T::ZERO };
			});
	}
}

/// A layer applying an [`ElementwiseKernel`].
///
/// The backward pass overwrites the input tensor with the input gradient, so the forward input is
/// kept in a state tensor reserved next to it.
#[derive(Debug)]
pub struct ActivationLayer<T: Element, K: ElementwiseKernel> {
	input: Tensor<T>,
	output: Tensor<T>,
	saved_input: Tensor<T>,
	kernel: K,
	forward_done: bool,
}

pub type ReluLayer<T> = ActivationLayer<T, Relu>;

impl<T: Element, K: ElementwiseKernel> ActivationLayer<T, K> {
	pub fn new(
		input: Tensor<T>,
		output: Tensor<T>,
		buffer: &Arc<Buffer>,
		kernel: K,
	) -> Result<Self, Error> {
		check_elementwise_io(&input, &output, buffer)?;
		let saved_input = buffer.reserve::<T>(input.dims())?;

		Ok(Self {
			input,
			output,
			saved_input,
			kernel,
			forward_done: false,
		})
	}
}

impl<T: Element, K: ElementwiseKernel> Layer for ActivationLayer<T, K> {
	fn name(&self) -> &'static str {
		K::NAME
	}

	fn input_dims(&self) -> &[usize] {
		self.input.dims()
	}

	fn output_dims(&self) -> &[usize] {
		self.output.dims()
	}

	#[instrument(skip_all, name = "ActivationLayer::fprop", fields(kernel = K::NAME, mode = %mode), level = "debug")]
	fn fprop(&mut self, mode: ExecMode) -> Result<(), Error> {
		let buffer = self.input.buffer()?;
		let regions = [
			self.input.region(),
			self.output.region(),
			self.saved_input.region(),
		];
		let kernel = &self.kernel;

		buffer.launch(|mem| {
			let [input, output, saved] = mem.regions(regions)?;
			saved.copy_from_slice(input);
			kernel.forward(as_elements::<T>(input), as_elements_mut::<T>(output));
			Ok(())
		})?;

		self.forward_done = true;
		Ok(())
	}

	#[instrument(skip_all, name = "ActivationLayer::bprop", fields(kernel = K::NAME), level = "debug")]
	fn bprop(&mut self) -> Result<(), Error> {
		if !self.forward_done {
			return Err(Error::InvalidState("activation bprop requires a preceding fprop"));
		}

		let buffer = self.input.buffer()?;
		let regions = [
			self.input.region(),
			self.output.region(),
			self.saved_input.region(),
		];
		let kernel = &self.kernel;

		buffer.launch(|mem| {
			let [in_grad, out_grad, saved] = mem.regions(regions)?;
			kernel.backward(
				as_elements::<T>(saved),
				as_elements::<T>(out_grad),
				as_elements_mut::<T>(in_grad),
			);
			Ok(())
		})?;
		Ok(())
	}
}
