use async_trait::async_trait;
use ollama_rs::{generation::embeddings::request::GenerateEmbeddingsRequest, Ollama};
use tracing::debug;

use crate::error::{Error, Result, Service};
use crate::llm::ollama_client;
use crate::pipeline::services::Embedder;
use crate::settings::OllamaSettings;

/// Embeds query text with an Ollama embedding model.
///
/// Must be the model the knowledge base was indexed with.
pub struct OllamaEmbedder {
    client: Ollama,
    model: String,
}

impl OllamaEmbedder {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the Ollama URL is invalid.
    pub fn new(settings: &OllamaSettings) -> Result<Self> {
        Ok(Self {
            client: ollama_client(&settings.url)?,
            model: settings.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), text.to_string().into());
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| Error::call(Service::Embedding, e))?;

        let vector = response.embeddings.into_iter().next().ok_or_else(|| {
            Error::malformed(Service::Embedding, "no embedding returned for the query")
        })?;
        debug!(model = %self.model, dimensions = vector.len(), "Embedded query");
        Ok(vector)
    }
}
