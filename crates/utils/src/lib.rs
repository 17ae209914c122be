// Copyright 2025 Irreducible Inc.

pub mod checked_arithmetics;
pub mod env;
pub mod error_utils;
pub mod tracing;
