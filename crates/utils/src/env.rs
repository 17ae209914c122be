// Copyright 2025 Irreducible Inc.

/// Read an unsigned integer from the environment variable.
///
/// Returns `None` if the variable is unset or does not parse.
pub fn usize_env(var: &str) -> Option<usize> {
	std::env::var(var).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_usize_env() {
		let var = "STRATA_UTILS_TEST_USIZE_ENV";
		std::env::remove_var(var);
		assert_eq!(usize_env(var), None);

		std::env::set_var(var, "not a number");
		assert_eq!(usize_env(var), None);

		std::env::set_var(var, "-3");
		assert_eq!(usize_env(var), None);

		std::env::set_var(var, "  1024\n");
		assert_eq!(usize_env(var), Some(1024));

		std::env::remove_var(var);
	}
}
