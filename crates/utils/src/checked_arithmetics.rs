// Copyright 2025 Irreducible Inc.

/// Rounds `val` up to the next multiple of `alignment`.
///
/// Returns `None` on overflow. `alignment` must be a power of two.
pub const fn checked_align_up(val: usize, alignment: usize) -> Option<usize> {
	assert!(alignment.is_power_of_two());

	match val.checked_add(alignment - 1) {
		Some(sum) => Some(sum & !(alignment - 1)),
		None => None,
	}
}

/// Product of all dimensions, or `None` if it overflows `usize`.
pub fn checked_product(dims: &[usize]) -> Option<usize> {
	dims.iter()
		.try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}
