use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::Result;
use crate::pipeline::{
    schema::{Relevance, RelevanceVerdict, ScoreVerdict},
    services::{complete_as, TextGenerator},
    types::{Document, EvaluatedDocument, RelevanceScore},
};

const BINARY_INSTRUCTION: &str = r#"You judge whether a document is relevant to a question.

A document is "Relevant" when it contains information that helps answer the question, even partially.
Otherwise it is "Irrelevant".

Respond only with the JSON object {"response": "Relevant"} or {"response": "Irrelevant"}."#;

const SCORE_INSTRUCTION: &str = r#"You rate how relevant a document is to a question on a scale from 0 to 1.

0 means the document is unrelated. 1 means it directly and completely answers the question.

Respond only with the JSON object {"relevance_score": <number between 0 and 1>}."#;

pub struct RelevanceEvaluationTask {
    generator: Arc<dyn TextGenerator>,
}

impl RelevanceEvaluationTask {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Judges every document, keeping the input order.
    ///
    /// # Errors
    ///
    /// Fails on the first judgment that cannot be obtained.
    #[instrument(name = "relevance_evaluation", skip_all, fields(documents = documents.len()))]
    pub async fn evaluate_all(
        &self,
        query: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<EvaluatedDocument>> {
        let total = documents.len();
        let mut evaluated = Vec::with_capacity(total);
        for (i, document) in documents.into_iter().enumerate() {
            let relevance = self.evaluate(query, &document).await?;
            info!(
                document = i + 1,
                total,
                score = relevance.score,
                is_relevant = relevance.is_relevant,
                "Document evaluated"
            );
            evaluated.push(EvaluatedDocument {
                document,
                relevance,
            });
        }
        Ok(evaluated)
    }

    /// Obtains both judgments for one document. Neither is derived from the other.
    ///
    /// # Errors
    ///
    /// Returns the service error of whichever call failed.
    pub async fn evaluate(&self, query: &str, document: &Document) -> Result<RelevanceScore> {
        let prompt = format!("Question: {query}\n\nDocument:\n{}", document.content());

        let binary: RelevanceVerdict = complete_as(
            self.generator.as_ref(),
            BINARY_INSTRUCTION,
            prompt.clone(),
            None,
        )
        .await?;
        let continuous: ScoreVerdict =
            complete_as(self.generator.as_ref(), SCORE_INSTRUCTION, prompt, None).await?;

        Ok(RelevanceScore {
            score: continuous.relevance_score,
            is_relevant: binary.response == Relevance::Relevant,
        })
    }
}
