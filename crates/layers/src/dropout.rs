// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use rand::{rngs::StdRng, Rng};
use rayon::prelude::*;
use static_assertions::assert_impl_all;
use strata_compute::{
	dtype::{as_elements, as_elements_mut},
	Buffer, ComputeDevice, Element, Tensor,
};
use strata_utils::ensure;
use tracing::instrument;

use crate::{
	error::Error,
	layer::{check_elementwise_io, ExecMode, Layer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskState {
	/// No training forward pass since construction or the last inference pass.
	Empty,
	/// A training forward pass recorded the mask and no backward pass has used it yet.
	Recorded,
	/// The recorded mask was used by a backward pass.
	Consumed,
}

/// Inverted dropout.
///
/// In training mode every element is independently kept with probability `1 - rate` and scaled by
/// `1 / (1 - rate)`; dropped elements become zero. The retention decisions are stored in a mask
/// tensor reserved next to the layer's input and output, and the following backward pass routes
/// gradients through exactly the kept elements. In inference mode the layer is the identity.
///
/// Retention is decided in `f32` from the layer's own generator, so layers of different element
/// types forked from identically seeded devices draw identical masks.
#[derive(Debug)]
pub struct DropoutLayer<T: Element> {
	input: Tensor<T>,
	output: Tensor<T>,
	/// 1.0 for kept elements, 0.0 for dropped ones.
	mask: Tensor<f32>,
	rate: f32,
	keep_prob: f32,
	rng: StdRng,
	state: MaskState,
}

assert_impl_all!(DropoutLayer<f32>: Layer, Send, Sync);

impl<T: Element> DropoutLayer<T> {
	/// Creates the layer and reserves its mask in `buffer`.
	///
	/// ## Preconditions
	///
	/// * `buffer` must still be reserving, and `input` and `output` must have been reserved from
	///   it with identical shapes.
	/// * `rate` must lie in the open interval `(0, 1)`.
	pub fn new(
		input: Tensor<T>,
		output: Tensor<T>,
		buffer: &Arc<Buffer>,
		rate: f32,
		device: &dyn ComputeDevice,
	) -> Result<Self, Error> {
		ensure!(
			rate > 0.0 && rate < 1.0,
			Error::InvalidArgument(format!("dropout rate must be in (0, 1), got {rate}"))
		);
		check_elementwise_io(&input, &output, buffer)?;

		let mask = buffer.reserve::<f32>(input.dims())?;
		tracing::debug!(rate, dims = ?input.dims(), dtype = %T::DTYPE, "created dropout layer");

		Ok(Self {
			input,
			output,
			mask,
			rate,
			keep_prob: 1.0 - rate,
			rng: device.seed_generator(),
			state: MaskState::Empty,
		})
	}

	pub fn rate(&self) -> f32 {
		self.rate
	}

	/// The retention mask recorded by the last training forward pass.
	pub fn mask(&self) -> &Tensor<f32> {
		&self.mask
	}

	fn fprop_training(&mut self) -> Result<(), Error> {
		let buffer = self.input.buffer()?;
		let regions = [self.input.region(), self.output.region(), self.mask.region()];
		let (rate, keep_prob) = (self.rate, self.keep_prob);
		let rng = &mut self.rng;

		buffer.launch(|mem| {
			let [input, output, mask] = mem.regions(regions)?;
			let input = as_elements::<T>(input);
			let output = as_elements_mut::<T>(output);
			let mask = as_elements_mut::<f32>(mask);

			// Draws are sequential so that the mask only depends on the generator state.
			for keep in mask.iter_mut() {
				*keep = if rng.gen::<f32>() >= rate { 1.0 } else { 0.0 };
			}

			output
				.par_iter_mut()
				.zip(input.par_iter())
				.zip(mask.par_iter())
				.for_each(|((out, &x), &keep)| {
					*out = if keep != 0.0 {
						T::from_f32(x.to_f32() / keep_prob)
					} else {
						T::ZERO
					};
				});
			Ok(())
		})?;

		self.state = MaskState::Recorded;
		Ok(())
	}

	fn fprop_inference(&mut self) -> Result<(), Error> {
		let buffer = self.input.buffer()?;
		let regions = [self.input.region(), self.output.region()];

		buffer.launch(|mem| {
			let [input, output] = mem.regions(regions)?;
			output.copy_from_slice(input);
			Ok(())
		})?;

		self.state = MaskState::Empty;
		Ok(())
	}
}

impl<T: Element> Layer for DropoutLayer<T> {
	fn name(&self) -> &'static str {
		"Dropout"
	}

	fn input_dims(&self) -> &[usize] {
		self.input.dims()
	}

	fn output_dims(&self) -> &[usize] {
		self.output.dims()
	}

	#[instrument(skip_all, name = "DropoutLayer::fprop", fields(rate = self.rate, %mode), level = "debug")]
	fn fprop(&mut self, mode: ExecMode) -> Result<(), Error> {
		match mode {
			ExecMode::Training => self.fprop_training(),
			ExecMode::Inference => self.fprop_inference(),
		}
	}

	#[instrument(skip_all, name = "DropoutLayer::bprop", fields(rate = self.rate), level = "debug")]
	fn bprop(&mut self) -> Result<(), Error> {
		match self.state {
			MaskState::Recorded => {}
			MaskState::Empty => {
				return Err(Error::InvalidState(
					"dropout bprop requires a preceding training-mode fprop",
				))
			}
			MaskState::Consumed => {
				return Err(Error::InvalidState(
					"dropout mask was already used by a previous bprop",
				))
			}
		}

		let buffer = self.input.buffer()?;
		let regions = [self.input.region(), self.output.region(), self.mask.region()];
		let keep_prob = self.keep_prob;

		buffer.launch(|mem| {
			let [in_grad, out_grad, mask] = mem.regions(regions)?;
			let in_grad = as_elements_mut::<T>(in_grad);
			let out_grad = as_elements::<T>(out_grad);
			let mask = as_elements::<f32>(mask);

			in_grad
				.par_iter_mut()
				.zip(out_grad.par_iter())
				.zip(mask.par_iter())
				.for_each(|((dx, &dy), &keep)| {
					*dx = if keep != 0.0 {
						T::from_f32(dy.to_f32() / keep_prob)
					} else {
						T::ZERO
					};
				});
			Ok(())
		})?;

		self.state = MaskState::Consumed;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use half::f16;
	use strata_compute::cpu::{CpuDevice, CpuDeviceConfig};

	use super::*;

	fn dropout<T: Element>(
		dims: &[usize],
		rate: f32,
	) -> (Arc<Buffer>, Result<DropoutLayer<T>, Error>) {
		let device = Arc::new(CpuDevice::default());
		let buffer = Buffer::create(device.clone());
		let input = buffer.reserve::<T>(dims).unwrap();
		let output = buffer.reserve::<T>(dims).unwrap();
		let layer = DropoutLayer::new(input, output, &buffer, rate, device.as_ref());
		(buffer, layer)
	}

	#[test]
	fn test_rate_bounds() {
		for rate in [0.0, 1.0, -0.5, 1.5, f32::NAN] {
			let (_buffer, layer) = dropout::<f32>(&[4, 4], rate);
			assert_matches!(layer, Err(Error::InvalidArgument(_)));
		}
	}

	#[test]
	fn test_shape_mismatch() {
		let device = Arc::new(CpuDevice::default());
		let buffer = Buffer::create(device.clone());
		let input = buffer.reserve::<f32>(&[4, 4]).unwrap();
		let output = buffer.reserve::<f32>(&[4, 8]).unwrap();
		assert_matches!(
			DropoutLayer::new(input, output, &buffer, 0.5, device.as_ref()),
			Err(Error::InvalidArgument(_))
		);
	}

	#[test]
	fn test_requires_reserving_buffer() {
		let device = Arc::new(CpuDevice::default());
		let buffer = Buffer::create(device.clone());
		let input = buffer.reserve::<f32>(&[4]).unwrap();
		let output = buffer.reserve::<f32>(&[4]).unwrap();
		buffer.allocate().unwrap();
		assert_matches!(
			DropoutLayer::new(input, output, &buffer, 0.5, device.as_ref()),
			Err(Error::InvalidArgument(_))
		);
	}

	#[test]
	fn test_rejects_tensors_from_other_buffer() {
		let device = Arc::new(CpuDevice::default());
		let buffer = Buffer::create(device.clone());
		let other = Buffer::create(device.clone());
		let input = other.reserve::<f32>(&[4]).unwrap();
		let output = buffer.reserve::<f32>(&[4]).unwrap();
		assert_matches!(
			DropoutLayer::new(input, output, &buffer, 0.5, device.as_ref()),
			Err(Error::InvalidArgument(_))
		);
	}

	#[test]
	fn test_rejects_aliased_input_and_output() {
		let device = Arc::new(CpuDevice::default());
		let buffer = Buffer::create(device.clone());
		let tensor = buffer.reserve::<f32>(&[4, 4]).unwrap();
		assert_matches!(
			DropoutLayer::new(tensor.clone(), tensor.clone(), &buffer, 0.5, device.as_ref()),
			Err(Error::InvalidArgument(_))
		);
		let view = tensor.view(&[4, 4]).unwrap();
		assert_matches!(
			DropoutLayer::new(tensor, view, &buffer, 0.5, device.as_ref()),
			Err(Error::InvalidArgument(_))
		);
		// Rejected layers leave no mask behind.
		assert_eq!(buffer.num_reservations(), 1);
	}

	#[test]
	fn test_rejects_failed_buffer() {
		let device = Arc::new(CpuDevice::new(CpuDeviceConfig::default().with_memory_limit(64)));
		let buffer = Buffer::create(device.clone());
		let input = buffer.reserve::<f32>(&[64]).unwrap();
		let output = buffer.reserve::<f32>(&[64]).unwrap();
		assert!(buffer.allocate().is_err());
		assert_matches!(
			DropoutLayer::new(input, output, &buffer, 0.5, device.as_ref()),
			Err(Error::InvalidArgument(_))
		);
	}

	#[test]
	fn test_reserves_mask() {
		let (buffer, layer) = dropout::<f16>(&[8, 8], 0.5);
		let layer = layer.unwrap();
		assert_eq!(buffer.num_reservations(), 3);
		assert_eq!(layer.mask().dims(), &[8, 8]);
	}

	#[test]
	fn test_fprop_before_allocation() {
		let (_buffer, layer) = dropout::<f32>(&[8], 0.5);
		let mut layer = layer.unwrap();
		assert_matches!(
			layer.fprop(ExecMode::Training),
			Err(Error::Compute(strata_compute::Error::NotAllocated(_)))
		);
	}

	#[test]
	fn test_bprop_state_machine() {
		let (buffer, layer) = dropout::<f32>(&[16], 0.5);
		let mut layer = layer.unwrap();
		buffer.allocate().unwrap();

		assert_matches!(layer.bprop(), Err(Error::InvalidState(_)));

		layer.fprop(ExecMode::Training).unwrap();
		layer.bprop().unwrap();
		assert_matches!(layer.bprop(), Err(Error::InvalidState(_)));

		layer.fprop(ExecMode::Training).unwrap();
		layer.fprop(ExecMode::Inference).unwrap();
		assert_matches!(layer.bprop(), Err(Error::InvalidState(_)));
	}

	#[test]
	fn test_inference_is_identity() {
		let (buffer, layer) = dropout::<f32>(&[2, 3], 0.75);
		let mut layer = layer.unwrap();
		buffer.allocate().unwrap();

		let data = [0.5, -1.0, 2.0, 0.0, 3.25, -7.5];
		layer.input.copy_from_host(&data).unwrap();
		layer.fprop(ExecMode::Inference).unwrap();
		assert_eq!(layer.output.copy_to_host().unwrap(), data);
	}
}
