// Copyright 2025 Irreducible Inc.

//! Inference pipeline: embedding lookup followed by a forward pass of the dense network.

mod config;
mod embedding;
mod error;
mod session;

pub use config::{LayerConfig, ModelConfig, ModelRegistry, RegisteredModel};
pub use embedding::{Embedding, EmbeddingTable};
pub use error::Error;
pub use session::{create_session, InferenceModel, InferenceSession};
