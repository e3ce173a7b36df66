pub mod chat;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod hashing;
pub mod ingest;
pub mod models;
pub mod store;
pub mod stores;

pub use chat::{
    format_metrics, resolve_model, ChatAnswer, ChatMessage, ChatOrchestrator, ChatSession,
    ChatTurn, LlmClient, OpenAiCompatibleClient, RelevanceMetrics,
};
pub use chunking::{normalize_whitespace, split_sentences, split_text, ChunkingConfig};
pub use config::{AppConfig, LlmModelConfig, VectorStoreConfig};
pub use embeddings::{cosine_similarity, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ChatError, ConfigError, IngestError, StoreError};
pub use extractor::{
    Extraction, ExtractionAdapter, LopdfStructureExtractor, LopdfTextExtractor, PageText,
    PdfFile, StructureBlocks, StructureExtractor, TextExtractor,
};
pub use filter::TextFilter;
pub use hashing::{digest_bytes, digest_file, digest_text};
pub use ingest::{
    discover_pdf_files, BatchReport, IngestOutcome, IngestionPipeline, IngestionReport,
};
pub use models::{
    BlockKind, ExtractedBlock, FileFingerprint, IngestionOptions, RecordMetadata, ScoredRecord,
    StoredRecord,
};
pub use store::RecordStore;
pub use stores::{open_store, LocalVectorStore, QdrantStore};
