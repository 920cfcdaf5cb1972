pub mod query;
pub mod response;

pub use query::{ConversationHistory, QueryRequest, Role, Turn};
pub use response::{
    Document, EvaluatedDocument, QueryResult, ReferenceLink, RelevanceScore, RelevantDocument,
    WebSearchResult,
};

pub(crate) use response::NO_URL;
