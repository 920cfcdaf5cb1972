use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pipeline::types::EvaluatedDocument;

/// How the answer's context is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    NoRetrieval,
    WebOnly,
    Hybrid,
    KnowledgeBaseOnly,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::NoRetrieval => "no_retrieval",
            Strategy::WebOnly => "web_only",
            Strategy::Hybrid => "hybrid",
            Strategy::KnowledgeBaseOnly => "kb_only",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub lower: f32,
    pub upper: f32,
}

/// Picks a strategy from the best relevance score.
///
/// Only the maximum matters, so the order of `scores` is irrelevant.
pub fn select_strategy(scores: &[f32], thresholds: Thresholds) -> Strategy {
    let Some(max) = scores.iter().copied().reduce(f32::max) else {
        return Strategy::WebOnly;
    };
    if max < thresholds.lower {
        Strategy::WebOnly
    } else if max < thresholds.upper {
        Strategy::Hybrid
    } else {
        Strategy::KnowledgeBaseOnly
    }
}

/// The document with the highest score; the first one wins ties.
pub fn best_document(documents: &[EvaluatedDocument]) -> Option<&EvaluatedDocument> {
    documents.iter().fold(None, |best, doc| match best {
        Some(current) if current.score() >= doc.score() => Some(current),
        _ => Some(doc),
    })
}

/// Documents judged "Relevant", or the best-scoring document when none was.
///
/// Empty only when `documents` is empty.
pub fn knowledge_base_candidates(documents: &[EvaluatedDocument]) -> Vec<EvaluatedDocument> {
    let relevant: Vec<_> = documents
        .iter()
        .filter(|doc| doc.relevance.is_relevant)
        .cloned()
        .collect();
    if !relevant.is_empty() {
        return relevant;
    }
    best_document(documents).cloned().into_iter().collect()
}
