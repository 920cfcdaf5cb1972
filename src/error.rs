//! Error types for the adaptive RAG pipeline.

use std::fmt;

use thiserror::Error;

/// The external collaborator a failed call was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Generation,
    Embedding,
    SimilarityIndex,
    WebSearch,
    Captioning,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Service::Generation => "generation",
            Service::Embedding => "embedding",
            Service::SimilarityIndex => "similarity index",
            Service::WebSearch => "web search",
            Service::Captioning => "captioning",
        };
        write!(f, "{s}")
    }
}

/// Errors that can occur while building or running the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The similarity index could not be opened. Fatal at construction.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// A call to an external service failed.
    #[error("{service} call failed: {message}")]
    ServiceCallFailed {
        /// The service that produced the error.
        service: Service,
        /// A description of the failure.
        message: String,
    },

    /// A service answered with output outside its declared schema.
    #[error("Malformed {service} output: {message}")]
    MalformedServiceOutput {
        /// The service that produced the output.
        service: Service,
        /// What was wrong with it.
        message: String,
    },

    /// Invalid settings or an incompletely built pipeline.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A prompt could not be assembled.
    #[error("Prompt formatting failed")]
    Prompt(#[from] fmt::Error),
}

impl Error {
    pub(crate) fn call(service: Service, message: impl fmt::Display) -> Self {
        Error::ServiceCallFailed {
            service,
            message: message.to_string(),
        }
    }

    pub(crate) fn malformed(service: Service, message: impl fmt::Display) -> Self {
        Error::MalformedServiceOutput {
            service,
            message: message.to_string(),
        }
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
