pub(crate) mod generation;
pub(crate) mod refinement;
pub(crate) mod relevance;
pub(crate) mod retrieval_gate;
pub(crate) mod self_assessment;
pub(crate) mod strategy;
pub(crate) mod web_search;
