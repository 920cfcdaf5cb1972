use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::pipeline::{
    schema::RewriteVerdict,
    services::{complete_as, SearchHit, TextGenerator, WebSearch},
    tasks::refinement::KnowledgeRefinementTask,
    types::{ReferenceLink, WebSearchResult},
};

const REWRITE_INSTRUCTION: &str = r#"You rewrite questions into effective web search queries.

Keep the technical terms of the question. Drop filler words and politeness.
Produce a single query of a few keywords, without quotes or search operators.

Respond only with the JSON object {"query": "..."}."#;

const UNTITLED: &str = "Untitled";

/// Looks things up on the web and condenses the hits.
///
/// Never fails: every error along the way ends in an empty
/// [`WebSearchResult`] or, for the rewrite, in searching the original query.
pub struct WebSearchTask {
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn WebSearch>,
    refiner: Arc<KnowledgeRefinementTask>,
}

impl WebSearchTask {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn WebSearch>,
        refiner: Arc<KnowledgeRefinementTask>,
    ) -> Self {
        Self {
            generator,
            search,
            refiner,
        }
    }

    #[instrument(name = "web_search", skip_all)]
    pub async fn run(&self, query: &str) -> WebSearchResult {
        let search_query = self.rewrite_query(query).await;

        let hits = match self.search.search(&search_query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Web search failed. Continuing without web results.");
                return WebSearchResult::default();
            }
        };
        if hits.is_empty() {
            info!(query = %search_query, "Web search returned no results");
            return WebSearchResult::default();
        }

        let raw_text = match serde_json::to_string_pretty(&hits) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Could not serialize search results. Skipping web results.");
                return WebSearchResult::default();
            }
        };

        let key_points = match self.refiner.refine(&raw_text).await {
            Ok(points) => points,
            Err(e) => {
                warn!(error = %e, "Refining search results failed. Skipping web results.");
                return WebSearchResult::default();
            }
        };

        let sources = sources_from(&hits);
        info!(
            hits = hits.len(),
            sources = sources.len(),
            key_points = key_points.len(),
            "Web search completed"
        );
        WebSearchResult {
            knowledge: key_points.join("\n"),
            sources,
        }
    }

    /// Falls back to `query` itself when the rewrite cannot be obtained.
    pub async fn rewrite_query(&self, query: &str) -> String {
        let prompt = format!("Question: {query}");
        let generator = self.generator.as_ref();
        match complete_as::<RewriteVerdict>(generator, REWRITE_INSTRUCTION, prompt, None).await {
            Ok(verdict) => {
                let rewritten = verdict.query.trim().to_string();
                info!(original = %query, rewritten = %rewritten, "Rewrote search query");
                rewritten
            }
            Err(e) => {
                warn!(error = %e, "Query rewrite failed. Searching the original query.");
                query.to_string()
            }
        }
    }
}

/// Hits with a link, in search order.
fn sources_from(hits: &[SearchHit]) -> Vec<ReferenceLink> {
    hits.iter()
        .filter(|hit| !hit.link.trim().is_empty())
        .map(|hit| {
            let title = hit.title.trim();
            let title = if title.is_empty() { UNTITLED } else { title };
            ReferenceLink::new(title, hit.link.trim())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hit, ScriptedGenerator, StubSearch};

    fn task(generator: Arc<ScriptedGenerator>, search: Arc<StubSearch>) -> WebSearchTask {
        let refiner = Arc::new(KnowledgeRefinementTask::new(generator.clone()).unwrap());
        WebSearchTask::new(generator, search, refiner)
    }

    #[tokio::test]
    async fn knowledge_and_sources_come_from_one_search() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .reply("RewriteVerdict", r#"{"query":"matlab preallocate array"}"#)
                .reply("KeyPointsVerdict", r#"{"key_points":["- zeros","ones"]}"#),
        );
        let search = Arc::new(StubSearch::with_hits(vec![
            hit("Preallocation", "https://a.example"),
            hit("Arrays", "https://b.example"),
        ]));

        let result = task(generator.clone(), search.clone())
            .run("How do I preallocate an array?")
            .await;

        assert_eq!(search.queries(), ["matlab preallocate array"]);
        assert_eq!(result.knowledge, "zeros\nones");
        assert_eq!(
            result.sources,
            [
                ReferenceLink::new("Preallocation", "https://a.example"),
                ReferenceLink::new("Arrays", "https://b.example"),
            ]
        );
        let refine_prompt = &generator.requests_for("KeyPointsVerdict")[0].prompt;
        assert!(refine_prompt.contains("https://a.example"));
        assert!(refine_prompt.contains("Preallocation"));
    }

    #[tokio::test]
    async fn refinement_failure_gives_an_empty_result() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .reply("RewriteVerdict", r#"{"query":"q"}"#)
                .fail("KeyPointsVerdict"),
        );
        let search = Arc::new(StubSearch::with_hits(vec![hit("A", "https://a")]));

        let result = task(generator, search).run("question").await;

        assert!(result.knowledge.is_empty());
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn search_failure_gives_an_empty_result() {
        let generator =
            Arc::new(ScriptedGenerator::new().reply("RewriteVerdict", r#"{"query":"q"}"#));
        let search = Arc::new(StubSearch::failing());

        let result = task(generator.clone(), search).run("question").await;

        assert!(result.is_empty());
        assert!(generator.requests_for("KeyPointsVerdict").is_empty());
    }

    #[tokio::test]
    async fn rewrite_failure_searches_the_original_query() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .fail("RewriteVerdict")
                .reply("KeyPointsVerdict", r#"{"key_points":["fact"]}"#),
        );
        let search = Arc::new(StubSearch::with_hits(vec![hit("A", "https://a")]));

        let result = task(generator, search.clone())
            .run("original question")
            .await;

        assert_eq!(search.queries(), ["original question"]);
        assert_eq!(result.knowledge, "fact");
    }

    #[test]
    fn sources_skip_missing_links_and_name_untitled_hits() {
        let hits = vec![
            hit("First", "https://1"),
            SearchHit {
                title: "No link".to_string(),
                link: "  ".to_string(),
                snippet: String::new(),
            },
            SearchHit {
                title: String::new(),
                link: "https://3".to_string(),
                snippet: String::new(),
            },
        ];

        assert_eq!(
            sources_from(&hits),
            [
                ReferenceLink::new("First", "https://1"),
                ReferenceLink::new("Untitled", "https://3"),
            ]
        );
    }
}
