// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use assert_matches::assert_matches;
use half::f16;
use strata_compute::cpu::CpuDevice;
use strata_layers::{Error, ExecMode, NetworkBuilder};

#[test]
fn test_half_precision_network_inference() {
	let device = Arc::new(CpuDevice::default());
	let mut network = NetworkBuilder::<f16>::new(device, &[2, 3])
		.and_then(|builder| builder.dropout(0.25))
		.and_then(|builder| builder.relu())
		.and_then(NetworkBuilder::build)
		.unwrap();

	let data = [-1.5f32, 0.5, 2.0, -0.25, 4.0, 0.0]
		.map(f16::from_f32)
		.to_vec();
	network.input().copy_from_host(&data).unwrap();
	network.fprop(ExecMode::Inference).unwrap();

	let expected = [0.0f32, 0.5, 2.0, 0.0, 4.0, 0.0].map(f16::from_f32).to_vec();
	assert_eq!(network.output().copy_to_host().unwrap(), expected);
}

#[test]
fn test_bprop_after_inference_fails() {
	let device = Arc::new(CpuDevice::default());
	let mut network = NetworkBuilder::<f32>::new(device, &[8])
		.and_then(|builder| builder.dropout(0.5))
		.and_then(NetworkBuilder::build)
		.unwrap();

	network.fprop(ExecMode::Inference).unwrap();
	assert_matches!(network.bprop(), Err(Error::InvalidState(_)));
}

#[test]
fn test_invalid_rate_aborts_build() {
	let device = Arc::new(CpuDevice::default());
	let result = NetworkBuilder::<f32>::new(device, &[8]).and_then(|builder| builder.dropout(1.0));
	assert_matches!(result.map(|_| ()), Err(Error::InvalidArgument(_)));
}
