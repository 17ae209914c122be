// Copyright 2025 Irreducible Inc.

//! Generic test routines, instantiated per element type by the tests of the other crates.

pub mod buffer;
pub mod data;
pub mod layer;
