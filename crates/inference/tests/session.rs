// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use assert_matches::assert_matches;
use strata_compute::{
	cpu::{CpuDevice, CpuDeviceConfig},
	DType,
};
use strata_inference::{
	create_session, EmbeddingTable, Error, InferenceModel, InferenceSession, LayerConfig,
	ModelConfig, ModelRegistry,
};

const DENSE_DIM: usize = 3;
const SLOT_NUM: usize = 2;
const VEC_SIZE: usize = 2;

fn toy_table() -> EmbeddingTable {
	// Row r holds [r, r + 0.5].
	let values = (0..8)
		.flat_map(|row| [row as f32, row as f32 + 0.5])
		.collect();
	EmbeddingTable::new(8, VEC_SIZE, SLOT_NUM, values).unwrap()
}

fn toy_registry(layers: Vec<LayerConfig>, max_batch_size: usize) -> ModelRegistry {
	let mut registry = ModelRegistry::new();
	registry
		.register(
			ModelConfig {
				name: "toy".into(),
				dense_dim: DENSE_DIM,
				slot_num: SLOT_NUM,
				embedding_vec_size: VEC_SIZE,
				max_batch_size,
				layers,
			},
			Arc::new(toy_table()),
		)
		.unwrap();
	registry
}

fn run(session: &mut dyn InferenceModel, dense: &[f32], rows: &[i32], num_samples: usize) -> Vec<f32> {
	let mut embeddings = vec![0.0; num_samples * SLOT_NUM * VEC_SIZE];
	let mut output = vec![0.0; num_samples * session.output_width()];
	session
		.predict(dense, rows, &mut embeddings, &mut output, num_samples)
		.unwrap();
	output
}

#[test]
fn test_identity_network_concatenates_dense_and_embeddings() {
	strata_utils::tracing::init_tracing();

	let num_samples = 4;
	let registry = toy_registry(vec![LayerConfig::Dropout { rate: 0.5 }], 4);
	let mut session =
		InferenceSession::<f32>::new("toy", &registry, Arc::new(CpuDevice::default())).unwrap();
	assert_eq!(session.model_name(), "toy");
	assert_eq!(session.output_width(), DENSE_DIM + SLOT_NUM * VEC_SIZE);

	let dense = (0..num_samples * DENSE_DIM)
		.map(|i| i as f32 * 0.25 - 1.0)
		.collect::<Vec<_>>();
	let rows = [0, 1, 7, 3, 2, 2, 5, 6];

	let mut embeddings = vec![0.0; num_samples * SLOT_NUM * VEC_SIZE];
	let mut output = vec![0.0; num_samples * session.output_width()];
	session
		.predict(&dense, &rows, &mut embeddings, &mut output, num_samples)
		.unwrap();

	let table = toy_table();
	let expected_embeddings = rows
		.iter()
		.flat_map(|&row| table.row(row as usize).unwrap().to_vec())
		.collect::<Vec<_>>();
	assert_eq!(embeddings, expected_embeddings);

	let expected = dense
		.chunks(DENSE_DIM)
		.zip(expected_embeddings.chunks(SLOT_NUM * VEC_SIZE))
		.flat_map(|(dense, embedding)| [dense, embedding].concat())
		.collect::<Vec<_>>();
	let bytes = |values: &[f32]| values.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<_>>();
	assert_eq!(bytes(&output), bytes(&expected));
}

#[test]
fn test_predict_is_idempotent() {
	let registry = toy_registry(
		vec![LayerConfig::Relu, LayerConfig::Dropout { rate: 0.3 }],
		8,
	);
	let mut session =
		InferenceSession::<f32>::new("toy", &registry, Arc::new(CpuDevice::default())).unwrap();

	let dense = [-1.0, 2.0, 0.5, 3.0, -0.5, 1.5];
	let rows = [4, 1, 0, 6];
	let first = run(&mut session, &dense, &rows, 2);
	let second = run(&mut session, &dense, &rows, 2);
	assert_eq!(first, second);
	assert!(first.iter().all(|&x| x >= 0.0));
}

#[test]
fn test_chunked_predict_matches_single_batch() {
	let num_samples = 7;
	let dense = (0..num_samples * DENSE_DIM)
		.map(|i| (i as f32).sin())
		.collect::<Vec<_>>();
	let rows = (0..num_samples * SLOT_NUM)
		.map(|i| (i % 8) as i32)
		.collect::<Vec<_>>();

	let device = Arc::new(CpuDevice::default());
	let layers = vec![LayerConfig::Relu];
	let mut chunked =
		InferenceSession::<f32>::new("toy", &toy_registry(layers.clone(), 3), device.clone())
			.unwrap();
	let mut single =
		InferenceSession::<f32>::new("toy", &toy_registry(layers, 8), device).unwrap();

	assert_eq!(
		run(&mut chunked, &dense, &rows, num_samples),
		run(&mut single, &dense, &rows, num_samples)
	);
}

#[test]
fn test_half_precision_session() {
	let registry = toy_registry(vec![LayerConfig::Dropout { rate: 0.5 }], 4);
	let device = Arc::new(CpuDevice::default());
	let mut half = create_session("toy", &registry, device.clone(), DType::F16).unwrap();
	let mut full = create_session("toy", &registry, device, DType::F32).unwrap();

	let dense = [0.1, -0.2, 0.3, 1.0 / 3.0, 7.0, -2.5];
	let rows = [1, 2, 3, 4];
	let half_output = run(half.as_mut(), &dense, &rows, 2);
	let full_output = run(full.as_mut(), &dense, &rows, 2);

	assert_eq!(half_output, run(half.as_mut(), &dense, &rows, 2));
	for (&h, &f) in half_output.iter().zip(&full_output) {
		assert!((h - f).abs() <= 0.001 * f.abs().max(1.0), "{h} vs {f}");
	}
}

#[test]
fn test_session_build_out_of_memory() {
	let registry = toy_registry(vec![LayerConfig::Relu], 1024);
	let device = Arc::new(CpuDevice::new(CpuDeviceConfig::default().with_memory_limit(4096)));
	assert_matches!(
		InferenceSession::<f32>::new("toy", &registry, device).map(|_| ()),
		Err(Error::Layer(strata_layers::Error::Compute(
			strata_compute::Error::Alloc(_)
		)))
	);
}
