// Copyright 2025 Irreducible Inc.

use crate::{alloc::Error as AllocError, buffer::BufferId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid tensor shape {dims:?}: {reason}")]
	InvalidShape {
		dims: Vec<usize>,
		reason: &'static str,
	},
	#[error("{0} is already allocated")]
	AlreadyAllocated(BufferId),
	#[error("{0} failed to allocate and must be rebuilt")]
	Failed(BufferId),
	#[error("{0} is not allocated")]
	NotAllocated(BufferId),
	#[error("the buffer backing the tensor has been dropped")]
	BufferDropped,
	#[error("expected {expected} elements, got {actual}")]
	LengthMismatch { expected: usize, actual: usize },
	#[error("kernel requested overlapping regions of {0}")]
	AliasedRegions(BufferId),
	#[error("tensor does not belong to {0}")]
	ForeignTensor(BufferId),
	#[error("allocation error: {0}")]
	Alloc(#[from] AllocError),
}
