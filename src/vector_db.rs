use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{value::Kind, Query, QueryPointsBuilder, ScoredPoint, Value},
    Qdrant,
};
use serde_json::{Map, Number};
use tracing::{debug, info};

use crate::error::{Error, Result, Service};
use crate::pipeline::{
    services::{DocumentStore, Embedder},
    types::Document,
};
use crate::settings::IndexSettings;

const CONTENT_KEY: &str = "page_content";
const METADATA_KEY: &str = "metadata";

/// The knowledge base, stored as a Qdrant collection.
///
/// Each point's payload holds `page_content` and a `metadata` object.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl QdrantStore {
    /// Connects to Qdrant and checks that the collection exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexUnavailable`] if the server cannot be reached or
    /// the collection is missing.
    pub async fn open(settings: &IndexSettings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = Qdrant::from_url(&settings.qdrant_url)
            .build()
            .map_err(|e| Error::IndexUnavailable(format!("{}: {e}", settings.qdrant_url)))?;

        let exists = client
            .collection_exists(&settings.collection)
            .await
            .map_err(|e| Error::IndexUnavailable(format!("{}: {e}", settings.qdrant_url)))?;
        if !exists {
            return Err(Error::IndexUnavailable(format!(
                "collection '{}' does not exist",
                settings.collection
            )));
        }
        info!(
            url = %settings.qdrant_url,
            collection = %settings.collection,
            "Opened knowledge base"
        );

        Ok(Self {
            client,
            collection: settings.collection.clone(),
            embedder,
        })
    }
}

#[async_trait]
impl DocumentStore for QdrantStore {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let vector = self.embedder.embed(query).await?;
        let limit = u64::try_from(k).unwrap_or(u64::MAX);

        let response = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection)
                    .query(Query::new_nearest(vector))
                    .limit(limit)
                    .with_payload(true),
            )
            .await
            .map_err(|e| Error::call(Service::SimilarityIndex, e))?;
        debug!(points = response.result.len(), "Similarity search returned");

        Ok(response.result.into_iter().map(to_document).collect())
    }
}

fn to_document(point: ScoredPoint) -> Document {
    let mut payload = point.payload;
    let content = match payload.remove(CONTENT_KEY).and_then(|v| v.kind) {
        Some(Kind::StringValue(text)) => text,
        _ => String::new(),
    };
    let metadata = match payload.remove(METADATA_KEY).and_then(|v| v.kind) {
        Some(Kind::StructValue(fields)) => fields
            .fields
            .into_iter()
            .map(|(key, value)| (key, to_json(value)))
            .collect(),
        _ => HashMap::new(),
    };
    Document::new(content, metadata)
}

fn to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::IntegerValue(n)) => serde_json::Value::Number(n.into()),
        Some(Kind::DoubleValue(x)) => {
            Number::from_f64(x).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(key, value)| (key, to_json(value)))
                .collect::<Map<_, _>>(),
        ),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}
