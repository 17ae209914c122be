// Copyright 2025 Irreducible Inc.

use std::ops::Range;

use strata_utils::checked_arithmetics::checked_align_up;

/// Bump allocator over a device address range that is not backed by memory yet.
///
/// Every allocation starts at a multiple of the alignment, so the planned size is the sum of all
/// requests with each one padded up to the alignment. Offsets are handed out in request order and
/// never reused.
#[derive(Debug, Clone)]
pub struct BumpAllocator {
	alignment: usize,
	cursor: usize,
}

impl BumpAllocator {
	/// ## Pre-conditions
	///
	/// - `alignment` must be a power of two
	pub fn new(alignment: usize) -> Self {
		assert!(alignment.is_power_of_two(), "alignment must be a power of two");
		Self {
			alignment,
			cursor: 0,
		}
	}

	/// Allocates `n` bytes and returns the byte range assigned to them.
	pub fn alloc(&mut self, n: usize) -> Result<Range<usize>, Error> {
		let start = self.cursor;
		let end = start.checked_add(n).ok_or(Error::SizeOverflow)?;
		self.cursor = checked_align_up(end, self.alignment).ok_or(Error::SizeOverflow)?;
		Ok(start..end)
	}

	/// Total number of bytes needed to back every allocation so far.
	pub fn size(&self) -> usize {
		self.cursor
	}

	pub fn alignment(&self) -> usize {
		self.alignment
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("device is out of memory: requested {requested} bytes, {available} available")]
	OutOfMemory { requested: usize, available: usize },
	#[error("requested size overflows the device address space")]
	SizeOverflow,
}
