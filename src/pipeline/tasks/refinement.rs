use std::sync::Arc;

use regex::Regex;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::pipeline::{
    schema::KeyPointsVerdict,
    services::{complete_as, TextGenerator},
};

const INSTRUCTION: &str = r#"You extract key points from raw text.

Read the given text and list the facts that matter for answering questions about it.
Keep each key point to one self-contained sentence. Do not add information that is not in the text.
Keep the order in which the facts appear.

Respond only with the JSON object {"key_points": ["...", "..."]}."#;

/// Leading list markers such as `-`, `*`, `•`, `1.` or `1)`.
const BULLET_MARKER: &str = r"^(?:[-*•]|\d+[.)])\s*";

pub struct KnowledgeRefinementTask {
    generator: Arc<dyn TextGenerator>,
    bullet: Regex,
}

impl KnowledgeRefinementTask {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the marker pattern fails to compile.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Result<Self> {
        let bullet = Regex::new(BULLET_MARKER).map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { generator, bullet })
    }

    /// Condenses `raw_text` into an ordered list of key points.
    ///
    /// # Errors
    ///
    /// Returns the service error if the generation call fails or its reply is
    /// malformed.
    #[instrument(name = "knowledge_refinement", skip_all, fields(chars = raw_text.len()))]
    pub async fn refine(&self, raw_text: &str) -> Result<Vec<String>> {
        let prompt = format!("Text:\n{raw_text}");
        let verdict: KeyPointsVerdict =
            complete_as(self.generator.as_ref(), INSTRUCTION, prompt, None).await?;

        let key_points: Vec<String> = verdict
            .key_points
            .iter()
            .map(|point| self.clean(point))
            .filter(|point| !point.is_empty())
            .collect();
        debug!(key_points = key_points.len(), "Refined text into key points");
        Ok(key_points)
    }

    fn clean(&self, point: &str) -> String {
        self.bullet.replace(point.trim(), "").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[tokio::test]
    async fn markers_and_blank_points_are_removed() {
        let reply = r#"{"key_points":["- zeros preallocates", "  * use ones too ", "• reshape keeps data", "1. first", "2) second", "   ", "plain"]}"#;
        let generator = Arc::new(ScriptedGenerator::new().reply("KeyPointsVerdict", reply));
        let refiner = KnowledgeRefinementTask::new(generator).unwrap();

        let points = refiner.refine("raw").await.unwrap();

        assert_eq!(
            points,
            [
                "zeros preallocates",
                "use ones too",
                "reshape keeps data",
                "first",
                "second",
                "plain"
            ]
        );
    }

    #[tokio::test]
    async fn only_one_leading_marker_is_stripped() {
        let reply = r#"{"key_points":["-1 is returned on error"]}"#;
        let generator = Arc::new(ScriptedGenerator::new().reply("KeyPointsVerdict", reply));
        let refiner = KnowledgeRefinementTask::new(generator).unwrap();

        let points = refiner.refine("raw").await.unwrap();

        assert_eq!(points, ["1 is returned on error"]);
    }

    #[tokio::test]
    async fn failure_is_propagated() {
        let generator = Arc::new(ScriptedGenerator::new().fail("KeyPointsVerdict"));
        let refiner = KnowledgeRefinementTask::new(generator).unwrap();

        assert!(refiner.refine("raw").await.is_err());
    }
}
