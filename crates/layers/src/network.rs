// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use strata_compute::{Buffer, ComputeDevice, Element, Tensor};
use tracing::instrument;

use crate::{
	activation::{Relu, ReluLayer},
	dropout::DropoutLayer,
	error::Error,
	layer::{ExecMode, Layer},
};

/// Builds a chain of layers whose tensors all live in one [`Buffer`].
///
/// Every appended layer reads the previous layer's output tensor and reserves a fresh output
/// tensor of the same shape. [`Self::build`] allocates the buffer.
pub struct NetworkBuilder<T: Element> {
	device: Arc<dyn ComputeDevice>,
	buffer: Arc<Buffer>,
	input: Tensor<T>,
	head: Tensor<T>,
	layers: Vec<Box<dyn Layer>>,
}

impl<T: Element> NetworkBuilder<T> {
	/// Starts a network whose input tensor has shape `dims`.
	pub fn new(device: Arc<dyn ComputeDevice>, dims: &[usize]) -> Result<Self, Error> {
		let buffer = Buffer::create(device.clone());
		let input = buffer.reserve::<T>(dims)?;
		Ok(Self {
			device,
			buffer,
			head: input.clone(),
			input,
			layers: Vec::new(),
		})
	}

	/// Appends a layer constructed from the current head tensor and a newly reserved output.
	pub fn push<L, F>(mut self, make_layer: F) -> Result<Self, Error>
	where
		L: Layer + 'static,
		F: FnOnce(Tensor<T>, Tensor<T>, &Arc<Buffer>, &dyn ComputeDevice) -> Result<L, Error>,
	{
		let output = self.buffer.reserve::<T>(self.head.dims())?;
		let layer = make_layer(
			self.head.clone(),
			output.clone(),
			&self.buffer,
			self.device.as_ref(),
		)?;
		self.layers.push(Box::new(layer));
		self.head = output;
		Ok(self)
	}

	pub fn dropout(self, rate: f32) -> Result<Self, Error> {
		self.push(|input, output, buffer, device| {
			DropoutLayer::new(input, output, buffer, rate, device)
		})
	}

	pub fn relu(self) -> Result<Self, Error> {
		self.push(|input, output, buffer, _device| ReluLayer::new(input, output, buffer, Relu))
	}

	/// Allocates the buffer backing every tensor of the network.
	pub fn build(self) -> Result<Network<T>, Error> {
		self.buffer.allocate()?;
		tracing::debug!(
			buffer = %self.buffer.id(),
			bytes = self.buffer.size_in_bytes(),
			layers = self.layers.len(),
			"built network"
		);
		Ok(Network {
			buffer: self.buffer,
			input: self.input,
			output: self.head,
			layers: self.layers,
		})
	}
}

/// An ordered chain of layers over one allocated [`Buffer`].
///
/// The network owns the buffer; its layers and tensors refer to it weakly.
pub struct Network<T: Element> {
	buffer: Arc<Buffer>,
	input: Tensor<T>,
	output: Tensor<T>,
	layers: Vec<Box<dyn Layer>>,
}

impl<T: Element> Network<T> {
	pub fn input(&self) -> &Tensor<T> {
		&self.input
	}

	/// Output of the last layer, or the input when the network has no layers.
	pub fn output(&self) -> &Tensor<T> {
		&self.output
	}

	pub fn buffer(&self) -> &Arc<Buffer> {
		&self.buffer
	}

	pub fn layer_names(&self) -> Vec<&'static str> {
		self.layers.iter().map(|layer| layer.name()).collect()
	}

	#[instrument(skip_all, name = "Network::fprop", fields(mode = %mode), level = "debug")]
	pub fn fprop(&mut self, mode: ExecMode) -> Result<(), Error> {
		for layer in &mut self.layers {
			layer.fprop(mode)?;
		}
		Ok(())
	}

	/// Propagates the gradient written into [`Self::output`] back to [`Self::input`].
	#[instrument(skip_all, name = "Network::bprop", level = "debug")]
	pub fn bprop(&mut self) -> Result<(), Error> {
		for layer in self.layers.iter_mut().rev() {
			layer.bprop()?;
		}
		Ok(())
	}
}
