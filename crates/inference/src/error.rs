// Copyright 2025 Irreducible Inc.

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("shape mismatch for {argument}: {reason}")]
	ShapeMismatch {
		argument: &'static str,
		reason: String,
	},
	#[error("row index {row} is outside the embedding vocabulary of {vocabulary_size} rows")]
	RowOutOfRange { row: i32, vocabulary_size: usize },
	#[error("model {0:?} is not registered")]
	ModelNotFound(String),
	#[error("invalid model config: {0}")]
	InvalidConfig(String),
	#[error("layer error: {0}")]
	Layer(#[from] strata_layers::Error),
	#[error("compute error: {0}")]
	Compute(#[from] strata_compute::Error),
}

/// Checks that a caller-provided slice has the length implied by the batch size.
pub(crate) fn check_len(
	argument: &'static str,
	actual: usize,
	num_samples: usize,
	width: usize,
) -> Result<(), Error> {
	let expected = num_samples
		.checked_mul(width)
		.ok_or_else(|| Error::ShapeMismatch {
			argument,
			reason: format!("{num_samples} samples of width {width} overflow"),
		})?;
	if actual != expected {
		return Err(Error::ShapeMismatch {
			argument,
			reason: format!(
				"expected {expected} elements ({num_samples} samples x {width}), got {actual}"
			),
		});
	}
	Ok(())
}
