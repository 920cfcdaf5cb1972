//! Capabilities the pipeline consumes.
//!
//! Each external collaborator is a trait object injected into
//! [`AdaptiveRag`](crate::pipeline::AdaptiveRag), so production adapters and
//! test stubs are interchangeable.

use async_trait::async_trait;
use schemars::gen::SchemaSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result, Service};
use crate::pipeline::schema::Verdict;
use crate::pipeline::types::{ConversationHistory, Document, Turn};

/// A request for output conforming to a JSON schema.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Name of the expected reply type, e.g. `SupportVerdict`.
    pub schema_name: String,
    /// JSON schema the reply must follow.
    pub schema: Value,
    /// System instruction for this call.
    pub instruction: String,
    /// Prior conversation turns, oldest first.
    pub history: Vec<Turn>,
    pub prompt: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends the request and returns the raw JSON text of the reply.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Read-only access to the pre-built knowledge base.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns at most `k` documents ranked by similarity to `query`.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// One result of a web search, passed to refinement unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Turns an image plus the user's words into a textual question.
#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    async fn describe(&self, query: &str, image: &[u8]) -> Result<String>;
}

/// Asks `generator` for a reply of type `T` and validates it.
///
/// # Errors
///
/// Returns [`Error::ServiceCallFailed`] if the call fails and
/// [`Error::MalformedServiceOutput`] if the reply does not parse as `T` or
/// fails [`Verdict::validate`].
pub(crate) async fn complete_as<T: Verdict>(
    generator: &dyn TextGenerator,
    instruction: &str,
    prompt: String,
    history: Option<&ConversationHistory>,
) -> Result<T> {
    let schema = SchemaSettings::draft07()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>();
    let schema = serde_json::to_value(&schema).map_err(|e| Error::Config(e.to_string()))?;

    let request = CompletionRequest {
        schema_name: T::schema_name(),
        schema,
        instruction: instruction.to_string(),
        history: history.map(|h| h.turns().to_vec()).unwrap_or_default(),
        prompt,
    };
    debug!(schema = %request.schema_name, prompt = %request.prompt, "Sending structured request");

    let raw = generator.complete(&request).await?;
    debug!(schema = %request.schema_name, raw_response = %raw, "Received structured reply");

    let verdict: T = serde_json::from_str(raw.trim()).map_err(|e| {
        Error::malformed(
            Service::Generation,
            format!("{} reply did not parse: {e}", request.schema_name),
        )
    })?;
    verdict.validate().map_err(|message| {
        Error::malformed(
            Service::Generation,
            format!("{}: {message}", request.schema_name),
        )
    })?;
    Ok(verdict)
}
