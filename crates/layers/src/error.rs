// Copyright 2025 Irreducible Inc.

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	#[error("invalid state: {0}")]
	InvalidState(&'static str),
	#[error("compute error: {0}")]
	Compute(#[from] strata_compute::Error),
}
