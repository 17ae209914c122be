// Copyright 2025 Irreducible Inc.

use std::{collections::HashMap, sync::Arc};

use strata_utils::ensure;

use crate::{embedding::Embedding, error::Error};

/// A layer of the dense network, in execution order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerConfig {
	Dropout { rate: f32 },
	Relu,
}

/// Shape and layer graph of a served model.
///
/// Each sample consists of `dense_dim` dense features and one row index for each of `slot_num`
/// embedding slots. The network input row is the dense features followed by the looked-up
/// embedding vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
	pub name: String,
	pub dense_dim: usize,
	pub slot_num: usize,
	pub embedding_vec_size: usize,
	/// Number of samples the network processes per forward pass.
	pub max_batch_size: usize,
	pub layers: Vec<LayerConfig>,
}

impl ModelConfig {
	/// Width of the embedding part of a sample.
	pub fn embedding_width(&self) -> usize {
		self.slot_num * self.embedding_vec_size
	}

	/// Width of one network input row.
	pub fn input_width(&self) -> usize {
		self.dense_dim + self.embedding_width()
	}

	pub fn validate(&self) -> Result<(), Error> {
		ensure!(!self.name.is_empty(), Error::InvalidConfig("model name is empty".into()));
		ensure!(
			self.slot_num > 0 && self.embedding_vec_size > 0,
			Error::InvalidConfig(format!(
				"model {:?} needs at least one slot and a non-empty embedding vector",
				self.name
			))
		);
		ensure!(
			self.max_batch_size > 0,
			Error::InvalidConfig(format!("model {:?} has a zero max batch size", self.name))
		);
		ensure!(
			self.slot_num
				.checked_mul(self.embedding_vec_size)
				.and_then(|width| width.checked_add(self.dense_dim))
				.and_then(|width| width.checked_mul(self.max_batch_size))
				.is_some(),
			Error::InvalidConfig(format!("model {:?} is too large", self.name))
		);
		Ok(())
	}
}

/// A model config together with the embedding it serves from.
#[derive(Clone)]
pub struct RegisteredModel {
	pub config: ModelConfig,
	pub embedding: Arc<dyn Embedding>,
}

/// Models available for inference sessions, keyed by name.
#[derive(Default, Clone)]
pub struct ModelRegistry {
	models: HashMap<String, RegisteredModel>,
}

impl ModelRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a model, replacing any previous model of the same name.
	pub fn register(
		&mut self,
		config: ModelConfig,
		embedding: Arc<dyn Embedding>,
	) -> Result<(), Error> {
		config.validate()?;
		ensure!(
			embedding.slot_num() == config.slot_num
				&& embedding.embedding_vec_size() == config.embedding_vec_size,
			Error::InvalidConfig(format!(
				"model {:?} expects {} slots of width {}, embedding provides {} slots of width {}",
				config.name,
				config.slot_num,
				config.embedding_vec_size,
				embedding.slot_num(),
				embedding.embedding_vec_size()
			))
		);

		tracing::debug!(model = %config.name, layers = config.layers.len(), "registered model");
		self.models.insert(
			config.name.clone(),
			RegisteredModel {
				config,
				embedding,
			},
		);
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<&RegisteredModel> {
		self.models.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.models.contains_key(name)
	}
}
