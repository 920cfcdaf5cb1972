//! Deterministic stand-ins for the external services.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result, Service};
use crate::pipeline::services::{
    CompletionRequest, DocumentStore, ImageCaptioner, SearchHit, TextGenerator, WebSearch,
};
use crate::pipeline::types::{Document, EvaluatedDocument, RelevanceScore};

/// Answers each request from a per-schema script.
///
/// Queued replies are consumed in order; once a queue is empty the schema's
/// `always` reply is used, and without one the call fails.
#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    queued: Mutex<HashMap<String, VecDeque<Option<String>>>>,
    fallback: HashMap<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, schema: &str, json: &str) -> Self {
        self.enqueue(schema, Some(json.to_string()))
    }

    pub(crate) fn fail(self, schema: &str) -> Self {
        self.enqueue(schema, None)
    }

    pub(crate) fn always(mut self, schema: &str, json: &str) -> Self {
        self.fallback.insert(schema.to_string(), json.to_string());
        self
    }

    fn enqueue(self, schema: &str, reply: Option<String>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(schema.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn requests_for(&self, schema: &str) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.schema_name == schema)
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.schema_name)
            .and_then(VecDeque::pop_front);
        let reply = match queued {
            Some(reply) => reply,
            None => self.fallback.get(&request.schema_name).cloned(),
        };
        reply.ok_or_else(|| {
            Error::call(
                Service::Generation,
                format!("no scripted reply for {}", request.schema_name),
            )
        })
    }
}

#[derive(Default)]
pub(crate) struct StubStore {
    documents: Vec<Document>,
    failing: bool,
    calls: AtomicUsize,
}

impl StubStore {
    pub(crate) fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for StubStore {
    async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::call(Service::SimilarityIndex, "index offline"));
        }
        Ok(self.documents.iter().take(k).cloned().collect())
    }
}

#[derive(Default)]
pub(crate) struct StubSearch {
    hits: Vec<SearchHit>,
    failing: bool,
    queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub(crate) fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl WebSearch for StubSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing {
            return Err(Error::call(Service::WebSearch, "search offline"));
        }
        Ok(self.hits.clone())
    }
}

pub(crate) struct StubCaptioner {
    caption: Option<String>,
    calls: AtomicUsize,
}

impl StubCaptioner {
    pub(crate) fn new(caption: &str) -> Self {
        Self {
            caption: Some(caption.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            caption: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageCaptioner for StubCaptioner {
    async fn describe(&self, _query: &str, _image: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.caption
            .clone()
            .ok_or_else(|| Error::call(Service::Captioning, "vision model offline"))
    }
}

pub(crate) fn document(content: &str, url: Option<&str>) -> Document {
    let mut metadata = HashMap::new();
    if let Some(url) = url {
        metadata.insert("url".to_string(), Value::String(url.to_string()));
    }
    Document::new(content, metadata)
}

pub(crate) fn evaluated(
    content: &str,
    url: Option<&str>,
    score: f32,
    is_relevant: bool,
) -> EvaluatedDocument {
    EvaluatedDocument {
        document: document(content, url),
        relevance: RelevanceScore { score, is_relevant },
    }
}

pub(crate) fn hit(title: &str, link: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        link: link.to_string(),
        snippet: format!("About {title}"),
    }
}
