//! Retrieval-augmented question answering over the record store.

use crate::config::LlmModelConfig;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::ChatError;
use crate::models::{BlockKind, ScoredRecord};
use crate::store::RecordStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

const SYSTEM_PROMPT: &str = "You answer questions about the user's documents. \
Use only the numbered context passages. If they do not contain the answer, say you do not know.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError>;
}

/// Client for `/chat/completions` endpoints such as OpenRouter.
pub struct OpenAiCompatibleClient {
    endpoint: Url,
    api_key: String,
    client: Client,
}

impl OpenAiCompatibleClient {
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Result<Self, ChatError> {
        let mut base = endpoint.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            endpoint: Url::parse(&base)?,
            api_key: api_key.into(),
            client: Client::new(),
        })
    }

    /// Reads the API key from the variable named by `api_key_env`.
    pub fn from_config(config: &LlmModelConfig) -> Result<Self, ChatError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ChatError::MissingApiKey(config.api_key_env.clone()))?;

        Self::new(&config.endpoint, api_key)
    }

    pub fn completions_url(&self) -> Result<Url, ChatError> {
        Ok(self.endpoint.join("chat/completions")?)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let response = self
            .client
            .post(self.completions_url()?)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": model, "messages": messages }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::BackendResponse {
                backend: "llm".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        completion_text(&parsed)
    }
}

fn completion_text(parsed: &Value) -> Result<String, ChatError> {
    parsed
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| ChatError::BackendResponse {
            backend: "llm".to_string(),
            details: "response has no choices[0].message.content".to_string(),
        })
}

/// Maps a configured display name to its model identifier.
pub fn resolve_model(config: &LlmModelConfig, display_name: &str) -> Result<String, ChatError> {
    config
        .models
        .get(display_name)
        .cloned()
        .ok_or_else(|| ChatError::UnknownModel {
            requested: display_name.to_string(),
            available: config
                .models
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Computed over the records that were sent to the LLM as context.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceMetrics {
    pub average_score: f64,
    pub retrieved_count: usize,
    /// Mean cosine similarity between the answer and each retrieved record.
    pub answer_similarity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatAnswer {
    pub answer: String,
    pub metrics: Option<RelevanceMetrics>,
}

pub fn format_metrics(metrics: &RelevanceMetrics) -> String {
    let mut display = format!(
        "`Average Vector relevance scores: {:.4} (k={})`",
        metrics.average_score, metrics.retrieved_count
    );
    if let Some(similarity) = metrics.answer_similarity {
        display.push_str(&format!(
            " `Answer to Chunk Cosine Similarity: {similarity:.4}`"
        ));
    }
    display
}

fn build_context(hits: &[ScoredRecord]) -> String {
    hits.iter()
        .enumerate()
        .map(|(index, hit)| {
            format!(
                "[{}] ({}, page {})\n{}",
                index + 1,
                hit.record.metadata.filename,
                hit.record.metadata.page,
                hit.record.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct ChatOrchestrator<S, E, L> {
    store: S,
    embedder: E,
    llm: L,
    model_id: String,
    top_k: usize,
}

impl<S, E, L> ChatOrchestrator<S, E, L>
where
    S: RecordStore,
    E: Embedder,
    L: LlmClient,
{
    pub fn new(store: S, embedder: E, llm: L, model_id: impl Into<String>, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            llm,
            model_id: model_id.into(),
            top_k: top_k.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn ask(&self, query: &str, return_score: bool) -> Result<ChatAnswer, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }

        let query_vector = self.embedder.embed(query);
        let hits = self.store.similarity_search(&query_vector, self.top_k).await?;
        // image payloads are base64, not prose; they never reach the prompt
        let hits: Vec<ScoredRecord> = hits
            .into_iter()
            .filter(|hit| hit.record.kind != BlockKind::Image)
            .collect();
        debug!(hits = hits.len(), "retrieved context");

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Context:\n{}\n\nQuestion: {query}",
                build_context(&hits)
            )),
        ];
        let answer = self.llm.complete(&self.model_id, &messages).await?;
        info!(model = %self.model_id, retrieved = hits.len(), "answered query");

        let metrics = return_score.then(|| self.metrics(&answer, &hits));
        Ok(ChatAnswer { answer, metrics })
    }

    fn metrics(&self, answer: &str, hits: &[ScoredRecord]) -> RelevanceMetrics {
        if hits.is_empty() {
            return RelevanceMetrics {
                average_score: 0.0,
                retrieved_count: 0,
                answer_similarity: None,
            };
        }

        let count = hits.len() as f64;
        let average_score = hits.iter().map(|hit| hit.score).sum::<f64>() / count;

        let answer_vector = self.embedder.embed(answer);
        let similarity = hits
            .iter()
            .map(|hit| cosine_similarity(&answer_vector, &self.embedder.embed(&hit.record.content)))
            .sum::<f64>()
            / count;

        RelevanceMetrics {
            average_score,
            retrieved_count: hits.len(),
            answer_similarity: Some(similarity),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    /// Rendered metrics line, when any were produced.
    pub metrics: Option<String>,
}

/// Conversation history on top of an orchestrator. Each turn is answered
/// independently; history is kept for display only.
pub struct ChatSession<S, E, L> {
    orchestrator: ChatOrchestrator<S, E, L>,
    history: Vec<ChatTurn>,
}

impl<S, E, L> ChatSession<S, E, L>
where
    S: RecordStore,
    E: Embedder,
    L: LlmClient,
{
    pub fn new(orchestrator: ChatOrchestrator<S, E, L>) -> Self {
        Self {
            orchestrator,
            history: Vec::new(),
        }
    }

    pub async fn ask(&mut self, question: &str) -> Result<ChatTurn, ChatError> {
        let result = self.orchestrator.ask(question, true).await?;
        let turn = ChatTurn {
            question: question.trim().to_string(),
            answer: result.answer,
            metrics: result.metrics.as_ref().map(format_metrics),
        };
        self.history.push(turn.clone());
        Ok(turn)
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn into_orchestrator(self) -> ChatOrchestrator<S, E, L> {
        self.orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{FileFingerprint, RecordMetadata, StoredRecord};
    use crate::stores::LocalVectorStore;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingLlm {
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(
            &self,
            _model: &str,
            messages: &[ChatMessage],
        ) -> Result<String, ChatError> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            Ok("The gear ratio shall not exceed 3.5:1.".to_string())
        }
    }

    fn text_record(content: &str) -> StoredRecord {
        StoredRecord::new(
            BlockKind::Text,
            content,
            RecordMetadata {
                filename: "gearbox.pdf".to_string(),
                page: 7,
                file_fingerprint: FileFingerprint::new("fp"),
                page_hash: None,
                chunk_hash: None,
                ingested_at: Utc::now(),
            },
        )
    }

    #[tokio::test]
    async fn empty_store_yields_zero_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let orchestrator = ChatOrchestrator::new(
            LocalVectorStore::open(dir.path())?,
            CharacterNgramEmbedder::default(),
            RecordingLlm::default(),
            "test/model",
            5,
        );

        let answer = orchestrator.ask("what is the gear ratio?", true).await?;
        assert_eq!(
            answer.metrics,
            Some(RelevanceMetrics {
                average_score: 0.0,
                retrieved_count: 0,
                answer_similarity: None,
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn retrieved_chunks_reach_the_prompt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CharacterNgramEmbedder::default();
        let store = LocalVectorStore::open(dir.path())?;
        let record = text_record("The gear ratio shall not exceed 3.5:1 under nominal load.");
        store
            .add_records(&[record.clone()], &[embedder.embed(&record.content)])
            .await?;

        let orchestrator =
            ChatOrchestrator::new(store, embedder, RecordingLlm::default(), "test/model", 3);
        let answer = orchestrator.ask("gear ratio", true).await?;

        let metrics = answer.metrics.expect("scores were requested");
        assert_eq!(metrics.retrieved_count, 1);
        assert!(metrics.average_score > 0.0);
        assert!(metrics.answer_similarity.is_some());

        let prompts = orchestrator.llm.prompts.lock().unwrap();
        assert!(prompts[0][1].content.contains("(gearbox.pdf, page 7)"));
        assert!(prompts[0][1].content.ends_with("Question: gear ratio"));
        Ok(())
    }

    #[tokio::test]
    async fn image_hits_are_left_out_of_context_and_metrics(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CharacterNgramEmbedder::default();
        let store = LocalVectorStore::open(dir.path())?;
        let text = text_record("The gear ratio shall not exceed 3.5:1 under nominal load.");
        let mut image = text_record("iVBORw0KGgo=");
        image.kind = BlockKind::Image;
        store
            .add_records(
                &[text.clone(), image.clone()],
                &[embedder.embed(&text.content), embedder.embed(&image.content)],
            )
            .await?;

        let orchestrator =
            ChatOrchestrator::new(store, embedder, RecordingLlm::default(), "test/model", 5);
        let answer = orchestrator.ask("gear ratio", true).await?;

        let metrics = answer.metrics.expect("scores were requested");
        assert_eq!(metrics.retrieved_count, 1);

        let prompts = orchestrator.llm.prompts.lock().unwrap();
        assert!(!prompts[0][1].content.contains("iVBORw0KGgo="));
        assert!(!prompts[0][1].content.contains("[2]"));
        Ok(())
    }

    #[tokio::test]
    async fn scores_are_omitted_unless_requested() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let orchestrator = ChatOrchestrator::new(
            LocalVectorStore::open(dir.path())?,
            CharacterNgramEmbedder::default(),
            RecordingLlm::default(),
            "test/model",
            5,
        );

        let answer = orchestrator.ask("anything", false).await?;
        assert!(answer.metrics.is_none());
        assert!(matches!(
            orchestrator.ask("   ", true).await,
            Err(ChatError::EmptyQuery)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn session_keeps_history() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let orchestrator = ChatOrchestrator::new(
            LocalVectorStore::open(dir.path())?,
            CharacterNgramEmbedder::default(),
            RecordingLlm::default(),
            "test/model",
            5,
        );
        let mut session = ChatSession::new(orchestrator);

        session.ask("first question").await?;
        session.ask("second question").await?;

        let questions: Vec<_> = session.history().iter().map(|turn| turn.question.as_str()).collect();
        assert_eq!(questions, vec!["first question", "second question"]);
        assert!(session.history()[1].metrics.is_some());
        Ok(())
    }

    #[test]
    fn metrics_render_like_the_chat_view() {
        let metrics = RelevanceMetrics {
            average_score: 0.123456,
            retrieved_count: 5,
            answer_similarity: Some(0.5),
        };
        assert_eq!(
            format_metrics(&metrics),
            "`Average Vector relevance scores: 0.1235 (k=5)` `Answer to Chunk Cosine Similarity: 0.5000`"
        );
    }

    #[test]
    fn unknown_model_lists_choices() {
        let mut models = BTreeMap::new();
        models.insert("Claude".to_string(), "vendor/model-a".to_string());
        models.insert("Llama".to_string(), "vendor/model-b".to_string());
        let config = LlmModelConfig {
            models,
            ..LlmModelConfig::default()
        };

        assert_eq!(resolve_model(&config, "Llama").unwrap(), "vendor/model-b");
        match resolve_model(&config, "Mistral") {
            Err(ChatError::UnknownModel { available, .. }) => {
                assert_eq!(available, "Claude, Llama")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn completions_url_keeps_the_version_segment() -> Result<(), ChatError> {
        let client = OpenAiCompatibleClient::new("https://openrouter.ai/api/v1", "key")?;
        assert_eq!(
            client.completions_url()?.as_str(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        Ok(())
    }

    #[test]
    fn completion_text_reads_first_choice() {
        let parsed = json!({ "choices": [{ "message": { "content": "  42  " } }] });
        assert_eq!(completion_text(&parsed).unwrap(), "42");
        assert!(completion_text(&json!({ "choices": [] })).is_err());
    }
}
