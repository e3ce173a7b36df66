//! On-disk record store for single-machine use.
//!
//! Records live in `records.jsonl` under the configured directory, one JSON
//! object per line with its vector. The whole file is loaded on open; search
//! is brute-force cosine similarity. A fingerprint set built on open answers
//! duplicate checks exactly.

use crate::embeddings::cosine_similarity;
use crate::error::StoreError;
use crate::models::{FileFingerprint, ScoredRecord, StoredRecord};
use crate::store::{check_lengths, RecordStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

pub const RECORDS_FILE: &str = "records.jsonl";

#[derive(Serialize)]
struct PersistedRecordRef<'a> {
    #[serde(flatten)]
    record: &'a StoredRecord,
    vector: &'a [f32],
}

#[derive(Deserialize)]
struct PersistedRecord {
    #[serde(flatten)]
    record: StoredRecord,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    records: Vec<(StoredRecord, Vec<f32>)>,
    fingerprints: HashSet<FileFingerprint>,
}

impl Inner {
    fn insert(&mut self, record: StoredRecord, vector: Vec<f32>) {
        self.fingerprints
            .insert(record.metadata.file_fingerprint.clone());
        self.records.push((record, vector));
    }
}

pub struct LocalVectorStore {
    file_path: PathBuf,
    inner: RwLock<Inner>,
}

impl LocalVectorStore {
    /// Creates the directory if needed and loads any existing records.
    ///
    /// A final line that does not parse is the remains of an interrupted
    /// append; it is logged and cut off. An unparseable line anywhere else
    /// fails the open.
    pub fn open(directory: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(directory)?;
        let file_path = directory.join(RECORDS_FILE);

        let mut inner = Inner::default();
        if file_path.exists() {
            load_records(&file_path, &mut inner)?;
        }

        info!(
            path = %file_path.display(),
            records = inner.records.len(),
            files = inner.fingerprints.len(),
            "opened local vector store"
        );

        Ok(Self {
            file_path,
            inner: RwLock::new(inner),
        })
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn load_records(file_path: &Path, inner: &mut Inner) -> Result<(), StoreError> {
    let mut reader = BufReader::new(File::open(file_path)?);
    let mut line = String::new();
    let mut offset = 0u64;

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Ok(());
        }
        let line_start = offset;
        offset += read as u64;

        if line.trim().is_empty() {
            continue;
        }
        let last_line = reader.fill_buf()?.is_empty();

        match serde_json::from_str::<PersistedRecord>(&line) {
            Ok(persisted) if line.ends_with('\n') => {
                inner.insert(persisted.record, persisted.vector)
            }
            Ok(persisted) => {
                // complete record whose newline never made it to disk
                inner.insert(persisted.record, persisted.vector);
                OpenOptions::new().append(true).open(file_path)?.write_all(b"\n")?;
                return Ok(());
            }
            Err(error) if last_line => {
                warn!(
                    path = %file_path.display(),
                    bytes = read,
                    %error,
                    "dropping torn trailing record"
                );
                OpenOptions::new()
                    .write(true)
                    .open(file_path)?
                    .set_len(line_start)?;
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        }
    }
}

#[async_trait]
impl RecordStore for LocalVectorStore {
    async fn add_records(
        &self,
        records: &[StoredRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        check_lengths(records.len(), embeddings.len())?;
        if records.is_empty() {
            return Ok(());
        }

        let mut lines = String::new();
        for (record, vector) in records.iter().zip(embeddings) {
            lines.push_str(&serde_json::to_string(&PersistedRecordRef { record, vector })?);
            lines.push('\n');
        }

        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        let committed = file.metadata()?.len();
        if let Err(error) = file.write_all(lines.as_bytes()).and_then(|()| file.flush()) {
            // leave no partial line for the next append to glue onto
            if let Err(truncate_error) = file.set_len(committed) {
                warn!(%truncate_error, "could not roll back partial append");
            }
            return Err(error.into());
        }

        for (record, vector) in records.iter().zip(embeddings) {
            inner.insert(record.clone(), vector.clone());
        }
        debug!(count = records.len(), "appended records");

        Ok(())
    }

    async fn contains_fingerprint(
        &self,
        fingerprint: &FileFingerprint,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.fingerprints.contains(fingerprint))
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;

        let mut scored: Vec<ScoredRecord> = inner
            .records
            .iter()
            .map(|(record, vector)| ScoredRecord {
                record: record.clone(),
                score: cosine_similarity(query_vector, vector),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.file_path.exists() {
            File::open(&self.file_path)?.sync_all()?;
        }
        info!(path = %self.file_path.display(), "closed local vector store");
        Ok(())
    }
}
