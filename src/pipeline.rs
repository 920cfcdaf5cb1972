//! The adaptive retrieval-augmented generation pipeline.
//!
//! One query moves through a fixed sequence of stages: optional image
//! captioning, the retrieval gate, retrieval, relevance evaluation, strategy
//! selection, optional web search, answer generation and, for answers taken
//! from the knowledge base alone, self-assessment.

pub mod schema;
pub mod services;
pub(crate) mod tasks;
pub mod types;

use std::{cmp::Ordering, sync::Arc};

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::settings::PipelineSettings;

use self::schema::RetrievalDecision;
use self::services::{DocumentStore, ImageCaptioner, TextGenerator, WebSearch};
use self::tasks::{
    generation::{GeneratedResponse, GenerationContext, ResponseGenerationTask},
    refinement::KnowledgeRefinementTask,
    relevance::RelevanceEvaluationTask,
    retrieval_gate::RetrievalGateTask,
    self_assessment::SelfAssessmentTask,
    strategy::{best_document, knowledge_base_candidates, select_strategy, Strategy, Thresholds},
    web_search::WebSearchTask,
};
use self::types::{
    ConversationHistory, EvaluatedDocument, QueryRequest, QueryResult, RelevantDocument, NO_URL,
};

/// Returned in place of an answer that could not be generated.
pub const APOLOGY: &str =
    "Sorry, I encountered an error while processing your request. Please try again.";

/// Answers questions from a knowledge base, the web, or both.
///
/// Holds only shared capabilities and immutable settings, so one instance
/// can serve concurrent queries.
pub struct AdaptiveRag {
    settings: PipelineSettings,
    store: Arc<dyn DocumentStore>,
    captioner: Option<Arc<dyn ImageCaptioner>>,
    gate: RetrievalGateTask,
    evaluator: RelevanceEvaluationTask,
    refiner: Arc<KnowledgeRefinementTask>,
    web: WebSearchTask,
    responder: Arc<ResponseGenerationTask>,
    assessor: SelfAssessmentTask,
}

impl AdaptiveRag {
    pub fn builder() -> AdaptiveRagBuilder {
        AdaptiveRagBuilder::default()
    }

    fn thresholds(&self) -> Thresholds {
        Thresholds {
            lower: self.settings.lower_threshold,
            upper: self.settings.upper_threshold,
        }
    }

    /// Runs one query to completion.
    ///
    /// A failed final answer still yields a [`QueryResult`], carrying an
    /// apology and the relevant documents found so far.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or relevance evaluation fails.
    #[instrument(name = "adaptive_rag", skip_all, fields(session_id = %Uuid::new_v4()))]
    pub async fn run(&self, request: QueryRequest) -> Result<QueryResult> {
        let query = self.resolve_query(&request).await;
        info!(query = %query, history = request.history.len(), "Query received");

        if self.gate.should_retrieve(&query).await == RetrievalDecision::No {
            info!(strategy = %Strategy::NoRetrieval, "Answering without retrieval");
            let generated = self
                .answer(Strategy::NoRetrieval, &query, &[], &request.history)
                .await;
            return Ok(finish(generated, Vec::new()));
        }

        let documents = self.store.retrieve(&query, self.settings.top_k).await?;
        info!(documents = documents.len(), "Documents retrieved");
        let evaluated = self.evaluator.evaluate_all(&query, documents).await?;
        let relevant_docs = self.relevant_docs(&evaluated);

        let scores: Vec<f32> = evaluated.iter().map(EvaluatedDocument::score).collect();
        let strategy = select_strategy(&scores, self.thresholds());
        info!(
            %strategy,
            max_score = scores.iter().copied().reduce(f32::max),
            relevant_docs = relevant_docs.len(),
            "Strategy selected"
        );

        let generated = self
            .answer(strategy, &query, &evaluated, &request.history)
            .await;
        Ok(finish(generated, relevant_docs))
    }

    async fn answer(
        &self,
        strategy: Strategy,
        query: &str,
        evaluated: &[EvaluatedDocument],
        history: &ConversationHistory,
    ) -> Result<GeneratedResponse> {
        match strategy {
            Strategy::NoRetrieval => {
                self.responder
                    .generate(query, GenerationContext::None, history)
                    .await
            }
            Strategy::WebOnly => self.answer_from_web(query, history).await,
            Strategy::Hybrid => {
                let Some(document) = best_document(evaluated) else {
                    return self.answer_from_web(query, history).await;
                };
                let key_points = match self.refiner.refine(document.document.content()).await {
                    Ok(points) => points,
                    Err(e) => {
                        warn!(error = %e, "Refining the document failed. Using it as is.");
                        vec![document.document.content().trim().to_string()]
                    }
                };
                let web = self.web.run(query).await;
                self.responder
                    .generate(
                        query,
                        GenerationContext::Hybrid {
                            document,
                            key_points: &key_points,
                            web: &web,
                        },
                        history,
                    )
                    .await
            }
            Strategy::KnowledgeBaseOnly => {
                let candidates = knowledge_base_candidates(evaluated);
                info!(candidates = candidates.len(), "Answering from the knowledge base");
                if self.settings.self_assessment {
                    self.assessor.run(query, &candidates, history).await
                } else {
                    self.responder
                        .generate(
                            query,
                            GenerationContext::KnowledgeBase(&candidates),
                            history,
                        )
                        .await
                }
            }
        }
    }

    async fn answer_from_web(
        &self,
        query: &str,
        history: &ConversationHistory,
    ) -> Result<GeneratedResponse> {
        let web = self.web.run(query).await;
        self.responder
            .generate(query, GenerationContext::Web(&web), history)
            .await
    }

    /// The question text, replaced by a caption when an image is attached.
    async fn resolve_query(&self, request: &QueryRequest) -> String {
        let Some(image) = &request.image else {
            return request.query.clone();
        };
        let Some(captioner) = &self.captioner else {
            warn!("Image attached but no captioner configured. Ignoring the image.");
            return request.query.clone();
        };
        match captioner.describe(&request.query, image).await {
            Ok(caption) if !caption.trim().is_empty() => {
                info!(caption = %caption, "Image described");
                caption.trim().to_string()
            }
            Ok(_) => {
                warn!("Image caption was empty. Using the original query.");
                request.query.clone()
            }
            Err(e) => {
                warn!(error = %e, "Image captioning failed. Using the original query.");
                request.query.clone()
            }
        }
    }

    /// Documents scoring at least the lower threshold, best first.
    fn relevant_docs(&self, evaluated: &[EvaluatedDocument]) -> Vec<RelevantDocument> {
        let mut relevant: Vec<_> = evaluated
            .iter()
            .filter(|doc| doc.score() >= self.settings.lower_threshold)
            .collect();
        relevant.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));
        relevant
            .into_iter()
            .map(|doc| RelevantDocument {
                content_preview: doc.document.preview(self.settings.preview_chars),
                score: doc.score(),
                url: doc.document.source_url().unwrap_or(NO_URL).to_string(),
            })
            .collect()
    }
}

fn finish(
    generated: Result<GeneratedResponse>,
    relevant_docs: Vec<RelevantDocument>,
) -> QueryResult {
    match generated {
        Ok(generated) => QueryResult {
            final_response: generated.response,
            reference_links: generated.sources,
            relevant_docs,
        },
        Err(e) => {
            error!(error = %e, "Final answer generation failed");
            QueryResult {
                final_response: APOLOGY.to_string(),
                reference_links: Vec::new(),
                relevant_docs,
            }
        }
    }
}

/// Builder for [`AdaptiveRag`].
///
/// The generator, store and web search are required; the captioner is
/// optional and settings default to [`PipelineSettings::default`].
#[derive(Default)]
pub struct AdaptiveRagBuilder {
    settings: Option<PipelineSettings>,
    generator: Option<Arc<dyn TextGenerator>>,
    store: Option<Arc<dyn DocumentStore>>,
    search: Option<Arc<dyn WebSearch>>,
    captioner: Option<Arc<dyn ImageCaptioner>>,
}

impl AdaptiveRagBuilder {
    #[must_use]
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    #[must_use]
    pub fn captioner(mut self, captioner: Arc<dyn ImageCaptioner>) -> Self {
        self.captioner = Some(captioner);
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required capability is missing or the
    /// settings are invalid.
    pub fn build(self) -> Result<AdaptiveRag> {
        let settings = self.settings.unwrap_or_default();
        settings.validate()?;
        let generator = self
            .generator
            .ok_or_else(|| Error::Config("generator is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| Error::Config("store is required".to_string()))?;
        let search = self
            .search
            .ok_or_else(|| Error::Config("search is required".to_string()))?;

        let refiner = Arc::new(KnowledgeRefinementTask::new(generator.clone())?);
        let responder = Arc::new(ResponseGenerationTask::new(generator.clone()));

        Ok(AdaptiveRag {
            settings,
            store,
            captioner: self.captioner,
            gate: RetrievalGateTask::new(generator.clone()),
            evaluator: RelevanceEvaluationTask::new(generator.clone()),
            web: WebSearchTask::new(generator.clone(), search, refiner.clone()),
            refiner,
            assessor: SelfAssessmentTask::new(generator, responder.clone()),
            responder,
        })
    }
}
