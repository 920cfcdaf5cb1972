use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::{Error, Result, Service};
use crate::pipeline::{
    schema::{Support, SupportVerdict, Utility, UtilityVerdict},
    services::{complete_as, TextGenerator},
    tasks::generation::{GeneratedResponse, GenerationContext, ResponseGenerationTask},
    types::{ConversationHistory, EvaluatedDocument, ReferenceLink},
};

const SUPPORT_INSTRUCTION: &str = r#"You check whether an answer is backed by a source document.

"Fully supported": every claim in the answer is stated in or follows from the document.
"Partially supported": some claims are backed by the document, others are not.
"No support": the answer is not backed by the document or contradicts it.

Respond only with the JSON object {"response": "Fully supported"}, {"response": "Partially supported"} or {"response": "No support"}."#;

const UTILITY_INSTRUCTION: &str = r#"You rate how useful an answer is for the question asked.

Use a whole number from 1 to 5, where 1 means useless and 5 means it fully and clearly resolves the question.

Respond only with the JSON object {"response": <integer from 1 to 5>}."#;

pub(crate) const PRIMARY_SOURCE: &str = "Primary source";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub support: Support,
    pub utility: Utility,
}

impl Grade {
    fn rank(self) -> (bool, Utility) {
        (self.support == Support::FullySupported, self.utility)
    }
}

/// Index of the best grade: full support first, then utility.
///
/// The earliest of equally ranked grades wins.
pub fn select_best(grades: &[Grade]) -> Option<usize> {
    grades
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, Grade)>, (i, grade)| match best {
            Some((_, current)) if current.rank() >= grade.rank() => best,
            _ => Some((i, *grade)),
        })
        .map(|(i, _)| i)
}

/// Answers from each candidate separately and keeps the best graded answer.
pub struct SelfAssessmentTask {
    generator: Arc<dyn TextGenerator>,
    responder: Arc<ResponseGenerationTask>,
}

impl SelfAssessmentTask {
    pub fn new(generator: Arc<dyn TextGenerator>, responder: Arc<ResponseGenerationTask>) -> Self {
        Self {
            generator,
            responder,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::ServiceCallFailed`] when no candidate could be answered
    /// and graded.
    #[instrument(name = "self_assessment", skip_all, fields(candidates = candidates.len()))]
    pub async fn run(
        &self,
        query: &str,
        candidates: &[EvaluatedDocument],
        history: &ConversationHistory,
    ) -> Result<GeneratedResponse> {
        let mut answers = Vec::with_capacity(candidates.len());
        let mut grades = Vec::with_capacity(candidates.len());

        for (i, candidate) in candidates.iter().enumerate() {
            match self.answer_and_grade(query, candidate, history).await {
                Ok((response, grade)) => {
                    info!(
                        candidate = i + 1,
                        support = ?grade.support,
                        utility = grade.utility.get(),
                        "Candidate graded"
                    );
                    answers.push((response, candidate));
                    grades.push(grade);
                }
                Err(e) => warn!(candidate = i + 1, error = %e, "Skipping candidate"),
            }
        }

        let Some(best) = select_best(&grades) else {
            return Err(Error::call(
                Service::Generation,
                "no candidate could be answered and graded",
            ));
        };
        let (response, document) = answers.swap_remove(best);
        info!(candidate = best + 1, "Selected best graded answer");

        Ok(GeneratedResponse {
            response,
            sources: document
                .document
                .source_url()
                .map(|url| ReferenceLink::new(PRIMARY_SOURCE, url))
                .into_iter()
                .collect(),
        })
    }

    async fn answer_and_grade(
        &self,
        query: &str,
        candidate: &EvaluatedDocument,
        history: &ConversationHistory,
    ) -> Result<(String, Grade)> {
        let generated = self
            .responder
            .generate(
                query,
                GenerationContext::KnowledgeBase(std::slice::from_ref(candidate)),
                history,
            )
            .await?;

        let support: SupportVerdict = complete_as(
            self.generator.as_ref(),
            SUPPORT_INSTRUCTION,
            format!(
                "Document:\n{}\n\nAnswer:\n{}",
                candidate.document.content(),
                generated.response
            ),
            None,
        )
        .await?;

        let utility: UtilityVerdict = complete_as(
            self.generator.as_ref(),
            UTILITY_INSTRUCTION,
            format!("Question: {query}\n\nAnswer:\n{}", generated.response),
            None,
        )
        .await?;
        let utility = utility
            .utility()
            .ok_or_else(|| Error::malformed(Service::Generation, "utility outside 1..=5"))?;

        Ok((
            generated.response,
            Grade {
                support: support.response,
                utility,
            },
        ))
    }
}
