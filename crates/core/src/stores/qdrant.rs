use crate::error::StoreError;
use crate::models::{FileFingerprint, ScoredRecord, StoredRecord};
use crate::store::{check_lengths, RecordStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: Url,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        })
    }

    /// Connects and creates the collection (cosine distance) when missing.
    pub async fn open(
        endpoint: &str,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, StoreError> {
        let store = Self::new(endpoint, collection, vector_size)?;
        store.ensure_collection().await?;
        Ok(store)
    }

    fn collection_url(&self, suffix: &str) -> Result<Url, StoreError> {
        Ok(self
            .endpoint
            .join(&format!("collections/{}{}", self.collection, suffix))?)
    }

    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let url = self.collection_url("")?;
        let response = self.client.get(url.clone()).send().await?;

        if response.status().is_success() {
            debug!(collection = %self.collection, "collection exists");
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(url)
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        info!(collection = %self.collection, size = self.vector_size, "created collection");
        Ok(())
    }
}

fn backend_error(status: StatusCode) -> StoreError {
    StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        details: status.to_string(),
    }
}

fn parse_hits(parsed: &Value) -> Result<Vec<ScoredRecord>, StoreError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::with_capacity(hits.len());
    for hit in hits {
        let payload = hit
            .pointer("/payload")
            .cloned()
            .ok_or_else(|| StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "search hit without payload".to_string(),
            })?;
        let record: StoredRecord = serde_json::from_value(payload)?;
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        result.push(ScoredRecord { record, score });
    }

    Ok(result)
}

#[async_trait]
impl RecordStore for QdrantStore {
    async fn add_records(
        &self,
        records: &[StoredRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        check_lengths(records.len(), embeddings.len())?;

        let points = records
            .iter()
            .zip(embeddings.iter())
            .map(|(record, embedding)| {
                if embedding.len() != self.vector_size {
                    return Err(StoreError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        self.vector_size
                    )));
                }

                Ok(json!({
                    "id": record.id,
                    "vector": embedding,
                    "payload": serde_json::to_value(record)?,
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(self.collection_url("/points?wait=true")?)
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn contains_fingerprint(
        &self,
        fingerprint: &FileFingerprint,
    ) -> Result<bool, StoreError> {
        let response = self
            .client
            .post(self.collection_url("/points/scroll")?)
            .json(&json!({
                "filter": {
                    "must": [{
                        "key": "metadata.file_fingerprint",
                        "match": { "value": fingerprint.as_str() }
                    }]
                },
                "limit": 1,
                "with_payload": false,
                "with_vector": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let found = parsed
            .pointer("/result/points")
            .and_then(Value::as_array)
            .is_some_and(|points| !points.is_empty());

        Ok(found)
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        if query_vector.len() != self.vector_size {
            return Err(StoreError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .client
            .post(self.collection_url("/points/search")?)
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parse_hits(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockKind, RecordMetadata};
    use chrono::Utc;

    #[test]
    fn invalid_endpoint_is_rejected() {
        let result = QdrantStore::new("not a url", "all", 8);
        assert!(matches!(result, Err(StoreError::Url(_))));
    }

    #[test]
    fn collection_urls_are_joined_on_the_endpoint() -> Result<(), StoreError> {
        let store = QdrantStore::new("http://localhost:6333/", "all", 8)?;
        assert_eq!(
            store.collection_url("/points/search")?.as_str(),
            "http://localhost:6333/collections/all/points/search"
        );
        Ok(())
    }

    #[test]
    fn search_response_payloads_become_records() -> Result<(), StoreError> {
        let record = StoredRecord::new(
            BlockKind::Table,
            "<table></table>",
            RecordMetadata {
                filename: "spec.pdf".to_string(),
                page: 3,
                file_fingerprint: FileFingerprint::new("fp"),
                page_hash: None,
                chunk_hash: None,
                ingested_at: Utc::now(),
            },
        );
        let response = json!({
            "result": [{ "id": record.id, "score": 0.42, "payload": serde_json::to_value(&record)? }]
        });

        let hits = parse_hits(&response)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record, record);
        assert!((hits[0].score - 0.42).abs() < f64::EPSILON);
        Ok(())
    }
}
