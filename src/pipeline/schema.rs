//! Structured outputs requested from the generation service.
//!
//! Every judgment the pipeline asks for is a closed type here. Replies are
//! deserialized strictly and then checked with [`Verdict::validate`]; anything
//! outside the declared values is reported as malformed output instead of
//! being guessed at.

use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A reply shape the generation service can be constrained to.
pub trait Verdict: DeserializeOwned + JsonSchema {
    /// Checks constraints a JSON schema cannot express reliably.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RetrievalDecision {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Relevance {
    Relevant,
    Irrelevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Support {
    #[serde(rename = "Fully supported")]
    FullySupported,
    #[serde(rename = "Partially supported")]
    PartiallySupported,
    #[serde(rename = "No support")]
    NoSupport,
}

/// Usefulness of an answer, from 1 (useless) to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Utility(u8);

impl Utility {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct RetrievalVerdict {
    /// Whether the question needs documents to be answered well.
    pub(crate) response: RetrievalDecision,
}

impl Verdict for RetrievalVerdict {}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct RelevanceVerdict {
    /// Whether the document helps answer the question.
    pub(crate) response: Relevance,
}

impl Verdict for RelevanceVerdict {}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct ScoreVerdict {
    /// Relevance of the document to the question, between 0 and 1.
    pub(crate) relevance_score: f32,
}

impl Verdict for ScoreVerdict {
    fn validate(&self) -> Result<(), String> {
        if self.relevance_score.is_finite() && (0.0..=1.0).contains(&self.relevance_score) {
            Ok(())
        } else {
            Err(format!(
                "relevance_score {} is outside [0, 1]",
                self.relevance_score
            ))
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct TextVerdict {
    /// The generated answer.
    pub(crate) response: String,
}

impl Verdict for TextVerdict {
    fn validate(&self) -> Result<(), String> {
        non_blank("response", &self.response)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct RewriteVerdict {
    /// The question rewritten as a web search query.
    pub(crate) query: String,
}

impl Verdict for RewriteVerdict {
    fn validate(&self) -> Result<(), String> {
        non_blank("query", &self.query)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct KeyPointsVerdict {
    /// Key facts from the text, one per entry, in the order they appear.
    pub(crate) key_points: Vec<String>,
}

impl Verdict for KeyPointsVerdict {}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct SupportVerdict {
    /// How well the source backs the answer.
    pub(crate) response: Support,
}

impl Verdict for SupportVerdict {}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct UtilityVerdict {
    /// Usefulness of the answer from 1 to 5.
    pub(crate) response: u8,
}

impl Verdict for UtilityVerdict {
    fn validate(&self) -> Result<(), String> {
        Utility::new(self.response)
            .map(|_| ())
            .ok_or_else(|| format!("utility {} is outside 1..=5", self.response))
    }
}

impl UtilityVerdict {
    pub(crate) fn utility(&self) -> Option<Utility> {
        Utility::new(self.response)
    }
}

fn non_blank(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is empty"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerations_accept_exact_spellings_only() {
        let yes: RetrievalVerdict = serde_json::from_str(r#"{"response": "Yes"}"#).unwrap();
        assert_eq!(yes.response, RetrievalDecision::Yes);
        assert!(serde_json::from_str::<RetrievalVerdict>(r#"{"response": "yes"}"#).is_err());
        assert!(serde_json::from_str::<RetrievalVerdict>(r#"{"response": "Maybe"}"#).is_err());

        let support: SupportVerdict =
            serde_json::from_str(r#"{"response": "Partially supported"}"#).unwrap();
        assert_eq!(support.response, Support::PartiallySupported);
        assert!(
            serde_json::from_str::<SupportVerdict>(r#"{"response": "fully supported"}"#).is_err()
        );

        assert!(serde_json::from_str::<RelevanceVerdict>(r#"{"response": "Relevant"}"#).is_ok());
        assert!(serde_json::from_str::<RelevanceVerdict>(r#"{"response": "Somewhat"}"#).is_err());
    }

    #[test]
    fn scores_outside_unit_interval_fail_validation() {
        let ok: ScoreVerdict = serde_json::from_str(r#"{"relevance_score": 0.85}"#).unwrap();
        assert!(ok.validate().is_ok());

        let high: ScoreVerdict = serde_json::from_str(r#"{"relevance_score": 1.7}"#).unwrap();
        assert!(high.validate().is_err());

        let negative: ScoreVerdict = serde_json::from_str(r#"{"relevance_score": -0.1}"#).unwrap();
        assert!(negative.validate().is_err());
    }

    #[test]
    fn utility_is_bounded() {
        assert_eq!(Utility::new(1).map(Utility::get), Some(1));
        assert_eq!(Utility::new(5).map(Utility::get), Some(5));
        assert!(Utility::new(0).is_none());
        assert!(Utility::new(6).is_none());

        let verdict: UtilityVerdict = serde_json::from_str(r#"{"response": 9}"#).unwrap();
        assert!(verdict.validate().is_err());
    }

    #[test]
    fn blank_text_fails_validation() {
        let blank: TextVerdict = serde_json::from_str(r#"{"response": "  "}"#).unwrap();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn schemas_name_the_reply_fields() {
        let schema = serde_json::to_value(schemars::schema_for!(SupportVerdict)).unwrap();
        let text = schema.to_string();
        assert!(text.contains("Fully supported"));
        assert!(text.contains("No support"));
    }
}
