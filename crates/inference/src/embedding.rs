// Copyright 2025 Irreducible Inc.

use std::iter::repeat_with;

use auto_impl::auto_impl;
use rand::{prelude::StdRng, Rng, SeedableRng};
use strata_utils::ensure;

use crate::error::{check_len, Error};

/// Maps sparse row indices to dense embedding vectors.
///
/// Each sample carries one row index per slot. A lookup writes one vector of
/// [`Self::embedding_vec_size`] values per index, in index order.
#[auto_impl(&, Box, Arc)]
pub trait Embedding: Send + Sync {
	fn slot_num(&self) -> usize;

	fn embedding_vec_size(&self) -> usize;

	fn vocabulary_size(&self) -> usize;

	fn lookup(&self, row_indices: &[i32], out: &mut [f32]) -> Result<(), Error>;
}

/// An embedding held entirely in memory as a row-major `vocabulary_size x embedding_vec_size`
/// table.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
	vocabulary_size: usize,
	embedding_vec_size: usize,
	slot_num: usize,
	values: Vec<f32>,
}

impl EmbeddingTable {
	pub fn new(
		vocabulary_size: usize,
		embedding_vec_size: usize,
		slot_num: usize,
		values: Vec<f32>,
	) -> Result<Self, Error> {
		ensure!(
			vocabulary_size > 0 && embedding_vec_size > 0 && slot_num > 0,
			Error::InvalidConfig(format!(
				"embedding dimensions must be non-zero: vocabulary {vocabulary_size}, \
				 vector size {embedding_vec_size}, slots {slot_num}"
			))
		);
		ensure!(
			Some(values.len()) == vocabulary_size.checked_mul(embedding_vec_size),
			Error::InvalidConfig(format!(
				"embedding table has {} values, expected {vocabulary_size} x {embedding_vec_size}",
				values.len()
			))
		);
		Ok(Self {
			vocabulary_size,
			embedding_vec_size,
			slot_num,
			values,
		})
	}

	/// A table with values drawn uniformly from `[-0.05, 0.05)`.
	pub fn random(
		vocabulary_size: usize,
		embedding_vec_size: usize,
		slot_num: usize,
		seed: u64,
	) -> Result<Self, Error> {
		let mut rng = StdRng::seed_from_u64(seed);
		let values = repeat_with(|| rng.gen_range(-0.05..0.05))
			.take(vocabulary_size.saturating_mul(embedding_vec_size))
			.collect();
		Self::new(vocabulary_size, embedding_vec_size, slot_num, values)
	}

	pub fn row(&self, index: usize) -> Option<&[f32]> {
		let start = index.checked_mul(self.embedding_vec_size)?;
		self.values.get(start..start + self.embedding_vec_size)
	}
}

impl Embedding for EmbeddingTable {
	fn slot_num(&self) -> usize {
		self.slot_num
	}

	fn embedding_vec_size(&self) -> usize {
		self.embedding_vec_size
	}

	fn vocabulary_size(&self) -> usize {
		self.vocabulary_size
	}

	fn lookup(&self, row_indices: &[i32], out: &mut [f32]) -> Result<(), Error> {
		check_len("embedding_vectors", out.len(), row_indices.len(), self.embedding_vec_size)?;

		for (&row, dst) in row_indices
			.iter()
			.zip(out.chunks_exact_mut(self.embedding_vec_size))
		{
			let src = usize::try_from(row)
				.ok()
				.and_then(|index| self.row(index))
				.ok_or(Error::RowOutOfRange {
					row,
					vocabulary_size: self.vocabulary_size,
				})?;
			dst.copy_from_slice(src);
		}
		Ok(())
	}
}
