use std::{
    cmp::Ordering,
    fmt::{self, Write},
    sync::Arc,
};

use tracing::{debug, instrument};

use crate::error::Result;
use crate::pipeline::{
    schema::TextVerdict,
    services::{complete_as, TextGenerator},
    types::{ConversationHistory, EvaluatedDocument, ReferenceLink, WebSearchResult},
};

const DIRECT_INSTRUCTION: &str = r#"You are a helpful technical assistant.

Answer the user's message directly and concisely. Use the earlier conversation when it matters.

Respond only with the JSON object {"response": "..."}."#;

const GROUNDED_INSTRUCTION: &str = r#"You are a helpful technical assistant that answers from supplied context.

Base your answer on the context given with the question. Prefer facts from the context over your own knowledge.
If the context does not cover part of the question, say so briefly instead of inventing details.
Use the earlier conversation when it matters.

Respond only with the JSON object {"response": "..."}."#;

pub(crate) const RETRIEVED_DOCUMENT: &str = "Retrieved document";

/// What the answer is grounded on.
#[derive(Debug, Clone, Copy)]
pub enum GenerationContext<'a> {
    None,
    Web(&'a WebSearchResult),
    KnowledgeBase(&'a [EvaluatedDocument]),
    Hybrid {
        document: &'a EvaluatedDocument,
        key_points: &'a [String],
        web: &'a WebSearchResult,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedResponse {
    pub response: String,
    pub sources: Vec<ReferenceLink>,
}

pub struct ResponseGenerationTask {
    generator: Arc<dyn TextGenerator>,
}

impl ResponseGenerationTask {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// # Errors
    ///
    /// Returns the service error if the answer cannot be generated.
    #[instrument(name = "response_generation", skip_all, fields(mode = context.mode()))]
    pub async fn generate(
        &self,
        query: &str,
        context: GenerationContext<'_>,
        history: &ConversationHistory,
    ) -> Result<GeneratedResponse> {
        let (instruction, prompt) = match context.render()? {
            Some(rendered) => (
                GROUNDED_INSTRUCTION,
                format!("Context:\n{rendered}\n\nQuestion: {query}"),
            ),
            None => (DIRECT_INSTRUCTION, format!("Question: {query}")),
        };

        let verdict: TextVerdict =
            complete_as(self.generator.as_ref(), instruction, prompt, Some(history)).await?;
        let sources = context.sources();
        debug!(sources = sources.len(), "Generated response");

        Ok(GeneratedResponse {
            response: verdict.response.trim().to_string(),
            sources,
        })
    }
}

impl GenerationContext<'_> {
    fn mode(&self) -> &'static str {
        match self {
            GenerationContext::None => "no_context",
            GenerationContext::Web(_) => "web",
            GenerationContext::KnowledgeBase(_) => "knowledge_base",
            GenerationContext::Hybrid { .. } => "hybrid",
        }
    }

    fn render(&self) -> std::result::Result<Option<String>, fmt::Error> {
        let mut text = String::new();
        match self {
            GenerationContext::None => return Ok(None),
            GenerationContext::Web(web) => write_web(&mut text, web)?,
            GenerationContext::KnowledgeBase(documents) => {
                for doc in by_score(documents) {
                    write!(
                        text,
                        "Document (relevance: {:.2}):\n{}\n\n",
                        doc.score(),
                        doc.document.content()
                    )?;
                }
            }
            GenerationContext::Hybrid { key_points, web, .. } => {
                writeln!(text, "Key points from the knowledge base:")?;
                for point in *key_points {
                    writeln!(text, "- {point}")?;
                }
                writeln!(text)?;
                write_web(&mut text, web)?;
            }
        }
        Ok(Some(text.trim_end().to_string()))
    }

    fn sources(&self) -> Vec<ReferenceLink> {
        match self {
            GenerationContext::None => Vec::new(),
            GenerationContext::Web(web) => web.sources.clone(),
            GenerationContext::KnowledgeBase(documents) => by_score(documents)
                .into_iter()
                .filter_map(|doc| {
                    doc.document.source_url().map(|url| {
                        ReferenceLink::new(format!("Document (score: {:.2})", doc.score()), url)
                    })
                })
                .collect(),
            GenerationContext::Hybrid { document, web, .. } => document
                .document
                .source_url()
                .map(|url| ReferenceLink::new(RETRIEVED_DOCUMENT, url))
                .into_iter()
                .chain(web.sources.iter().cloned())
                .collect(),
        }
    }
}

fn write_web(text: &mut String, web: &WebSearchResult) -> fmt::Result {
    writeln!(text, "Web search findings:")?;
    writeln!(text, "{}", web.knowledge)?;
    if !web.sources.is_empty() {
        write!(text, "\nSources:\n")?;
        for source in &web.sources {
            writeln!(text, "{}: {}", source.title, source.url)?;
        }
    }
    Ok(())
}

/// Highest score first; equal scores keep their order.
fn by_score(documents: &[EvaluatedDocument]) -> Vec<&EvaluatedDocument> {
    let mut sorted: Vec<_> = documents.iter().collect();
    sorted.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));
    sorted
}
