//! Adaptive retrieval-augmented question answering.
//!
//! [`AdaptiveRag`] decides per question whether to consult a knowledge base,
//! judges what it retrieves, and answers from the knowledge base, the web, or
//! both. External services are injected through the traits in
//! [`pipeline::services`]; Ollama, Qdrant and SearXNG adapters are provided.

pub mod embeddings;
pub mod error;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod searxng;
pub mod settings;
pub mod vector_db;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use pipeline::{
    types::{ConversationHistory, QueryRequest, QueryResult},
    AdaptiveRag,
};
