use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata keys that may carry a document's citation URL, in lookup order.
const URL_KEYS: [&str; 3] = ["url", "source_url", "parent_url"];

pub(crate) const NO_URL: &str = "No URL available";

/// One passage returned by the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    content: String,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: HashMap<String, Value>) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// The first non-empty URL found under one of the known source keys.
    pub fn source_url(&self) -> Option<&str> {
        URL_KEYS.iter().find_map(|key| {
            self.metadata
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| !url.is_empty())
        })
    }

    /// The first `max_chars` characters of the content, with `...` appended
    /// when anything was cut.
    pub fn preview(&self, max_chars: usize) -> String {
        match self.content.char_indices().nth(max_chars) {
            Some((end, _)) => format!("{}...", &self.content[..end]),
            None => self.content.clone(),
        }
    }
}

/// The evaluator's two independent judgments of a document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub score: f32,
    pub is_relevant: bool,
}

/// A document together with its relevance judgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedDocument {
    pub document: Document,
    pub relevance: RelevanceScore,
}

impl EvaluatedDocument {
    pub fn score(&self) -> f32 {
        self.relevance.score
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceLink {
    pub title: String,
    pub url: String,
}

impl ReferenceLink {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Refined knowledge and the sources of one web search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub knowledge: String,
    pub sources: Vec<ReferenceLink>,
}

impl WebSearchResult {
    pub fn is_empty(&self) -> bool {
        self.knowledge.is_empty() && self.sources.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantDocument {
    pub content_preview: String,
    pub score: f32,
    pub url: String,
}

/// The final answer handed back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub final_response: String,
    pub reference_links: Vec<ReferenceLink>,
    pub relevant_docs: Vec<RelevantDocument>,
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Response:\n{}\n", self.final_response)?;

        if self.reference_links.is_empty() {
            writeln!(f, "Reference Links: None")?;
        } else {
            writeln!(f, "Reference Links:")?;
            for link in &self.reference_links {
                writeln!(f, "- {}: {}", link.title, link.url)?;
            }
        }

        if self.relevant_docs.is_empty() {
            return writeln!(f, "\nRelevant Documents: None");
        }
        writeln!(f, "\nRelevant Documents:")?;
        for (rank, doc) in self.relevant_docs.iter().enumerate() {
            writeln!(f, "\n[{}] Score: {:.2}", rank + 1, doc.score)?;
            writeln!(f, "URL: {}", doc.url)?;
            writeln!(f, "Preview: {}", doc.content_preview)?;
        }
        Ok(())
    }
}
