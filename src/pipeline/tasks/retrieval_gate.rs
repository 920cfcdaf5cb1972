use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::pipeline::{
    schema::{RetrievalDecision, RetrievalVerdict},
    services::{complete_as, TextGenerator},
};

const INSTRUCTION: &str = r#"You decide whether a question needs documents from a knowledge base before it can be answered.

Answer "No" for greetings, small talk, thanks, and questions about the assistant itself.
Answer "Yes" for anything that asks for facts, explanations, procedures, or troubleshooting help.

Respond only with the JSON object {"response": "Yes"} or {"response": "No"}."#;

pub struct RetrievalGateTask {
    generator: Arc<dyn TextGenerator>,
}

impl RetrievalGateTask {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Returns whether documents should be retrieved for `query`.
    ///
    /// A failed call is logged and treated as "Yes".
    #[instrument(name = "retrieval_gate", skip(self, query))]
    pub async fn should_retrieve(&self, query: &str) -> RetrievalDecision {
        let prompt = format!("Question: {query}");
        let generator = self.generator.as_ref();
        match complete_as::<RetrievalVerdict>(generator, INSTRUCTION, prompt, None).await {
            Ok(verdict) => {
                info!(decision = ?verdict.response, "Retrieval decision made");
                verdict.response
            }
            Err(e) => {
                warn!(error = %e, "Retrieval gate failed. Retrieving anyway.");
                RetrievalDecision::Yes
            }
        }
    }
}
