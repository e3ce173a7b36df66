//! Single-file ingestion: fingerprint, duplicate check, extraction, filtering,
//! chunking and storage. Nothing escapes `ingest_file` as an error; every
//! failure ends up in the returned report and in the log.

use crate::chunking::{split_text, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::{
    ExtractionAdapter, LopdfStructureExtractor, LopdfTextExtractor, PageText, StructureExtractor,
    TextExtractor,
};
use crate::filter::TextFilter;
use crate::hashing::{digest_file, digest_text};
use crate::models::{
    BlockKind, ExtractedBlock, FileFingerprint, IngestionOptions, RecordMetadata, StoredRecord,
};
use crate::store::RecordStore;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// PDFs directly inside `folder`, sorted by path.
pub fn discover_pdf_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    // is_dir() alone accepts directories we are not allowed to list
    if let Err(error) = fs::read_dir(folder) {
        return Err(IngestError::InvalidArgument(format!(
            "not a readable directory: {}: {error}",
            folder.display()
        )));
    }

    let mut files = Vec::new();
    for item in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = match item {
            Ok(entry) => entry,
            Err(error) if error.depth() == 0 => {
                return Err(IngestError::Io(error.into()));
            }
            Err(error) => {
                warn!(folder = %folder.display(), %error, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested,
    /// Fingerprint already stored; nothing was written.
    Duplicate,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub path: PathBuf,
    pub filename: String,
    pub fingerprint: Option<FileFingerprint>,
    pub outcome: IngestOutcome,
    pub text_chunks: usize,
    pub tables: usize,
    pub images: usize,
    /// Human-readable log of this ingestion, in order.
    pub diagnostics: Vec<String>,
}

impl IngestionReport {
    fn new(path: &Path, filename: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            filename: filename.to_string(),
            fingerprint: None,
            outcome: IngestOutcome::Ingested,
            text_chunks: 0,
            tables: 0,
            images: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn stored_records(&self) -> usize {
        self.text_chunks + self.tables + self.images
    }

    fn note(&mut self, message: String) {
        info!(file = %self.filename, "{message}");
        self.diagnostics.push(message);
    }

    fn problem(&mut self, message: String) {
        warn!(file = %self.filename, "{message}");
        self.diagnostics.push(message);
    }

    fn fail(mut self, reason: String) -> Self {
        self.problem(format!("Skipping {}: {reason}", self.path.display()));
        self.outcome = IngestOutcome::Failed { reason };
        self
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<IngestionReport>,
}

impl BatchReport {
    fn count(&self, predicate: impl Fn(&IngestOutcome) -> bool) -> usize {
        self.reports
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }

    pub fn ingested(&self) -> usize {
        self.count(|outcome| *outcome == IngestOutcome::Ingested)
    }

    pub fn duplicates(&self) -> usize {
        self.count(|outcome| *outcome == IngestOutcome::Duplicate)
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, IngestOutcome::Failed { .. }))
    }
}

pub struct IngestionPipeline<S, E, T, X> {
    store: S,
    embedder: E,
    adapter: ExtractionAdapter<T, X>,
    filter: TextFilter,
    options: IngestionOptions,
}

impl<S, E> IngestionPipeline<S, E, LopdfTextExtractor, LopdfStructureExtractor>
where
    S: RecordStore,
    E: Embedder,
{
    pub fn with_lopdf(store: S, embedder: E) -> Result<Self, IngestError> {
        Ok(Self::new(
            store,
            embedder,
            ExtractionAdapter::lopdf()?,
            TextFilter::new()?,
            IngestionOptions::default(),
        ))
    }
}

impl<S, E, T, X> IngestionPipeline<S, E, T, X>
where
    S: RecordStore,
    E: Embedder,
    T: TextExtractor,
    X: StructureExtractor,
{
    pub fn new(
        store: S,
        embedder: E,
        adapter: ExtractionAdapter<T, X>,
        filter: TextFilter,
        options: IngestionOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            adapter,
            filter,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn ingest_file(&self, path: &Path) -> IngestionReport {
        let filename = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name.to_string(),
            None => {
                let error = IngestError::MissingFileName(path.display().to_string());
                return IngestionReport::new(path, "").fail(error.to_string());
            }
        };

        self.ingest_named(path, &filename).await
    }

    /// Ingests `path` while recording `filename` in every record's metadata.
    pub async fn ingest_named(&self, path: &Path, filename: &str) -> IngestionReport {
        let mut report = IngestionReport::new(path, filename);

        let fingerprint = match digest_file(path) {
            Ok(fingerprint) => fingerprint,
            Err(error) => return report.fail(format!("cannot read file: {error}")),
        };
        report.fingerprint = Some(fingerprint.clone());

        match self.store.contains_fingerprint(&fingerprint).await {
            Ok(true) => {
                report.note(format!("Skipping {}, already processed.", path.display()));
                report.outcome = IngestOutcome::Duplicate;
                return report;
            }
            Ok(false) => {}
            Err(error) => return report.fail(format!("duplicate check failed: {error}")),
        }

        report.note(format!("Processing: {}", path.display()));
        let extraction = self.adapter.extract(path);
        // already logged by the adapter
        report.diagnostics.extend(extraction.diagnostics.iter().cloned());

        if extraction.is_empty() {
            return report.fail("extraction produced no content".to_string());
        }

        for page in &extraction.pages {
            self.store_page(&mut report, &fingerprint, page).await;
        }
        for table in &extraction.tables {
            self.store_table(&mut report, &fingerprint, table).await;
        }
        for image in &extraction.images {
            self.store_image(&mut report, &fingerprint, image).await;
        }

        report.note(format!(
            "Processing completed: {} ({} text chunks, {} tables, {} images)",
            path.display(),
            report.text_chunks,
            report.tables,
            report.images
        ));
        report
    }

    fn metadata(filename: &str, fingerprint: &FileFingerprint, page: u32) -> RecordMetadata {
        RecordMetadata {
            filename: filename.to_string(),
            page,
            file_fingerprint: fingerprint.clone(),
            page_hash: None,
            chunk_hash: None,
            ingested_at: Utc::now(),
        }
    }

    async fn persist(&self, records: &[StoredRecord]) -> Result<(), IngestError> {
        let embeddings: Vec<Vec<f32>> = records
            .iter()
            .map(|record| self.embedder.embed(&record.content))
            .collect();
        self.store.add_records(records, &embeddings).await?;
        Ok(())
    }

    async fn store_page(
        &self,
        report: &mut IngestionReport,
        fingerprint: &FileFingerprint,
        page: &PageText,
    ) {
        if page.text.trim().is_empty() {
            debug!(file = %report.filename, page = page.number, "blank page");
            return;
        }

        let page_hash = digest_text(&page.text);
        let chunks = split_text(&page.text, ChunkingConfig::from(&self.options));
        let kept = self.filter.filter(&chunks);
        if kept.is_empty() {
            debug!(file = %report.filename, page = page.number, "no substantive chunks");
            return;
        }

        let records: Vec<StoredRecord> = kept
            .iter()
            .map(|chunk| {
                let mut metadata = Self::metadata(&report.filename, fingerprint, page.number);
                metadata.page_hash = Some(page_hash.clone());
                metadata.chunk_hash = Some(digest_text(chunk));
                StoredRecord::new(BlockKind::Text, chunk.as_str(), metadata)
            })
            .collect();

        match self.persist(&records).await {
            Ok(()) => {
                report.text_chunks += records.len();
                report.note(format!("Page {} - Text Stored in Vstore", page.number));
            }
            Err(error) => {
                report.problem(format!("Error storing text from page {}: {error}", page.number));
            }
        }
    }

    async fn store_table(
        &self,
        report: &mut IngestionReport,
        fingerprint: &FileFingerprint,
        table: &ExtractedBlock,
    ) {
        let ExtractedBlock::Table { page, html } = table else {
            return;
        };

        let Some(html) = html else {
            report.problem(format!(
                "Error processing table from page {page}: no rendered form"
            ));
            return;
        };

        let record = StoredRecord::new(
            BlockKind::Table,
            html.as_str(),
            Self::metadata(&report.filename, fingerprint, *page),
        );
        match self.persist(&[record]).await {
            Ok(()) => {
                report.tables += 1;
                report.note(format!("Table from Page {page} stored in Vstore"));
            }
            Err(error) => {
                report.problem(format!("Error processing table from page {page}: {error}"));
            }
        }
    }

    async fn store_image(
        &self,
        report: &mut IngestionReport,
        fingerprint: &FileFingerprint,
        image: &ExtractedBlock,
    ) {
        let ExtractedBlock::Image { page, base64, .. } = image else {
            return;
        };

        let Some(payload) = base64 else {
            report.problem(format!("Image from Page {page} missing Base64 data"));
            return;
        };

        let record = StoredRecord::new(
            BlockKind::Image,
            payload.as_str(),
            Self::metadata(&report.filename, fingerprint, *page),
        );
        match self.persist(&[record]).await {
            Ok(()) => {
                report.images += 1;
                report.note(format!("Image from Page {page} stored in Vstore"));
            }
            Err(error) => {
                report.problem(format!("Error processing image from page {page}: {error}"));
            }
        }
    }

    /// Ingests every PDF in `folder`; one file's failure never stops the batch.
    pub async fn ingest_directory(&self, folder: &Path) -> Result<BatchReport, IngestError> {
        let files = discover_pdf_files(folder)?;
        info!(folder = %folder.display(), files = files.len(), "ingesting directory");

        let mut batch = BatchReport::default();
        for path in files {
            batch.reports.push(self.ingest_file(&path).await);
        }

        Ok(batch)
    }

    /// Writes uploaded bytes to a temporary `.pdf`, ingests it under the
    /// uploaded name, and removes the temporary file whatever the outcome.
    pub async fn ingest_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<IngestionReport, IngestError> {
        let mut temp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile()?;
        temp.write_all(bytes)?;
        temp.flush()?;

        let report = self.ingest_named(temp.path(), file_name).await;
        temp.close()?;
        Ok(report)
    }
}
