use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex SHA-512 of a source file's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileFingerprint(String);

impl FileFingerprint {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Table,
    Image,
}

/// One unit of extracted content, tagged with its kind at extraction time.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedBlock {
    Text {
        page: u32,
        text: String,
    },
    /// `html` is `None` when the table was located but could not be rendered.
    Table {
        page: u32,
        html: Option<String>,
    },
    /// `base64` is `None` when the image stream carried no payload.
    Image {
        page: u32,
        base64: Option<String>,
        mime_type: String,
    },
}

impl ExtractedBlock {
    pub fn kind(&self) -> BlockKind {
        match self {
            ExtractedBlock::Text { .. } => BlockKind::Text,
            ExtractedBlock::Table { .. } => BlockKind::Table,
            ExtractedBlock::Image { .. } => BlockKind::Image,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            ExtractedBlock::Text { page, .. }
            | ExtractedBlock::Table { page, .. }
            | ExtractedBlock::Image { page, .. } => *page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub filename: String,
    pub page: u32,
    pub file_fingerprint: FileFingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_hash: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

/// Persisted form of a chunk. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub kind: BlockKind,
    pub content: String,
    pub metadata: RecordMetadata,
}

impl StoredRecord {
    pub fn new(kind: BlockKind, content: impl Into<String>, metadata: RecordMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: StoredRecord,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 2_000,
            chunk_overlap: 100,
        }
    }
}
