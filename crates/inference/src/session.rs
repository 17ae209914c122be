// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use half::f16;
use strata_compute::{ComputeDevice, DType, Element};
use strata_layers::{ExecMode, Network, NetworkBuilder};
use strata_utils::ensure;
use tracing::instrument;

use crate::{
	config::{LayerConfig, ModelConfig, ModelRegistry},
	embedding::Embedding,
	error::{check_len, Error},
};

/// A served model.
pub trait InferenceModel: Send {
	fn model_name(&self) -> &str;

	/// Number of output values per sample.
	fn output_width(&self) -> usize;

	/// Runs inference for `num_samples` samples.
	///
	/// `dense` holds `dense_dim` features per sample and `row_indices` one row per slot per
	/// sample. The looked-up embedding vectors are written to `embedding_vectors` and the network
	/// output to `output`, both sample-major. If this fails, `output` may have been partially
	/// written.
	fn predict(
		&mut self,
		dense: &[f32],
		row_indices: &[i32],
		embedding_vectors: &mut [f32],
		output: &mut [f32],
		num_samples: usize,
	) -> Result<(), Error>;
}

/// Creates a session for `model_name` whose network computes in `dtype`.
pub fn create_session(
	model_name: &str,
	registry: &ModelRegistry,
	device: Arc<dyn ComputeDevice>,
	dtype: DType,
) -> Result<Box<dyn InferenceModel>, Error> {
	let session: Box<dyn InferenceModel> = match dtype {
		DType::F32 => Box::new(InferenceSession::<f32>::new(model_name, registry, device)?),
		DType::F16 => Box::new(InferenceSession::<f16>::new(model_name, registry, device)?),
	};
	Ok(session)
}

/// Inference over an embedding followed by a dense network with element type `T`.
///
/// The network is built once, sized for the model's `max_batch_size`; larger requests are
/// processed in consecutive chunks. Every forward pass runs in inference mode, so identical
/// requests produce identical outputs.
pub struct InferenceSession<T: Element = f32> {
	config: ModelConfig,
	embedding: Arc<dyn Embedding>,
	network: Network<T>,
	output_width: usize,
	/// Host copy of the network input for one chunk.
	staging: Vec<T>,
}

impl<T: Element> InferenceSession<T> {
	#[instrument(skip_all, name = "InferenceSession::new", fields(model = model_name, dtype = %T::DTYPE))]
	pub fn new(
		model_name: &str,
		registry: &ModelRegistry,
		device: Arc<dyn ComputeDevice>,
	) -> Result<Self, Error> {
		let model = registry
			.get(model_name)
			.ok_or_else(|| Error::ModelNotFound(model_name.to_string()))?;
		let config = model.config.clone();
		config.validate()?;

		let network = build_network::<T>(&config, device)?;
		let output_dims = network.output().dims();
		ensure!(
			output_dims.len() == 2 && output_dims[0] == config.max_batch_size,
			Error::InvalidConfig(format!("network output has unexpected shape {output_dims:?}"))
		);
		let output_width = output_dims[1];
		let staging = vec![T::ZERO; network.input().num_elements()];

		tracing::info!(
			layers = ?network.layer_names(),
			bytes = network.buffer().size_in_bytes(),
			"inference session ready"
		);

		Ok(Self {
			config,
			embedding: Arc::clone(&model.embedding),
			network,
			output_width,
			staging,
		})
	}

	pub fn config(&self) -> &ModelConfig {
		&self.config
	}

	pub fn network(&self) -> &Network<T> {
		&self.network
	}

	/// Runs the network over the first `chunk_len` samples starting at `chunk_start`.
	fn forward_chunk(
		&mut self,
		dense: &[f32],
		embedding_vectors: &[f32],
		output: &mut [f32],
		chunk_start: usize,
		chunk_len: usize,
	) -> Result<(), Error> {
		let dense_dim = self.config.dense_dim;
		let embedding_width = self.config.embedding_width();
		let input_width = self.config.input_width();

		// Rows past the end of the chunk stay zero.
		self.staging.fill(T::ZERO);
		for (i, row) in self
			.staging
			.chunks_exact_mut(input_width)
			.take(chunk_len)
			.enumerate()
		{
			let sample = chunk_start + i;
			let (dense_dst, embedding_dst) = row.split_at_mut(dense_dim);
			let dense_src = &dense[sample * dense_dim..][..dense_dim];
			let embedding_src = &embedding_vectors[sample * embedding_width..][..embedding_width];
			for (dst, &src) in dense_dst.iter_mut().zip(dense_src) {
				*dst = T::from_f32(src);
			}
			for (dst, &src) in embedding_dst.iter_mut().zip(embedding_src) {
				*dst = T::from_f32(src);
			}
		}

		self.network.input().copy_from_host(&self.staging)?;
		self.network.fprop(ExecMode::Inference)?;
		let result = self.network.output().copy_to_host()?;

		let output_chunk =
			&mut output[chunk_start * self.output_width..][..chunk_len * self.output_width];
		for (dst, src) in output_chunk.iter_mut().zip(&result) {
			*dst = src.to_f32();
		}
		Ok(())
	}
}

impl<T: Element> InferenceModel for InferenceSession<T> {
	fn model_name(&self) -> &str {
		&self.config.name
	}

	fn output_width(&self) -> usize {
		self.output_width
	}

	#[instrument(skip_all, name = "InferenceSession::predict", fields(model = %self.config.name, num_samples = num_samples))]
	fn predict(
		&mut self,
		dense: &[f32],
		row_indices: &[i32],
		embedding_vectors: &mut [f32],
		output: &mut [f32],
		num_samples: usize,
	) -> Result<(), Error> {
		ensure!(
			num_samples > 0,
			Error::ShapeMismatch {
				argument: "num_samples",
				reason: "at least one sample is required".into(),
			}
		);
		check_len("dense", dense.len(), num_samples, self.config.dense_dim)?;
		check_len("row_indices", row_indices.len(), num_samples, self.config.slot_num)?;
		check_len(
			"embedding_vectors",
			embedding_vectors.len(),
			num_samples,
			self.config.embedding_width(),
		)?;
		check_len("output", output.len(), num_samples, self.output_width)?;

		self.embedding.lookup(row_indices, embedding_vectors)?;

		let max_batch_size = self.config.max_batch_size;
		for chunk_start in (0..num_samples).step_by(max_batch_size) {
			let chunk_len = max_batch_size.min(num_samples - chunk_start);
			tracing::trace!(chunk_start, chunk_len, "forward chunk");
			self.forward_chunk(dense, embedding_vectors, output, chunk_start, chunk_len)?;
		}
		Ok(())
	}
}

fn build_network<T: Element>(
	config: &ModelConfig,
	device: Arc<dyn ComputeDevice>,
) -> Result<Network<T>, Error> {
	let mut builder =
		NetworkBuilder::<T>::new(device, &[config.max_batch_size, config.input_width()])?;
	for layer in &config.layers {
		builder = match *layer {
			LayerConfig::Dropout { rate } => builder.dropout(rate)?,
			LayerConfig::Relu => builder.relu()?,
		};
	}
	Ok(builder.build()?)
}
