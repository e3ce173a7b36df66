use crate::error::StoreError;
use crate::models::{FileFingerprint, ScoredRecord, StoredRecord};
use async_trait::async_trait;

/// Persistence seam shared by ingestion (writes) and chat (reads).
///
/// Handles are constructed explicitly, passed to their users, and closed at
/// shutdown. The fingerprint check followed by later writes is not atomic:
/// two concurrent ingestions of one file can both see `false`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// `embeddings[i]` belongs to `records[i]`.
    async fn add_records(
        &self,
        records: &[StoredRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError>;

    /// Exact lookup of a file fingerprint among stored record metadata.
    async fn contains_fingerprint(
        &self,
        fingerprint: &FileFingerprint,
    ) -> Result<bool, StoreError>;

    /// At most `top_k` records ordered by descending similarity.
    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    async fn add_records(
        &self,
        records: &[StoredRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        (**self).add_records(records, embeddings).await
    }

    async fn contains_fingerprint(
        &self,
        fingerprint: &FileFingerprint,
    ) -> Result<bool, StoreError> {
        (**self).contains_fingerprint(fingerprint).await
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        (**self).similarity_search(query_vector, top_k).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        (**self).close().await
    }
}

pub(crate) fn check_lengths(records: usize, embeddings: usize) -> Result<(), StoreError> {
    if records != embeddings {
        return Err(StoreError::Request(format!(
            "embedding count {embeddings} doesn't match record count {records}"
        )));
    }
    Ok(())
}
