use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest};

use super::index::{similarity_score, Document, VectorIndex};
use super::knowledge;

pub const UNAVAILABLE_MESSAGE: &str =
    "I'm sorry, but the AI service is not currently available. Please check the service configuration.";
pub const FALLBACK_MESSAGE: &str =
    "I apologize, but I encountered an error while processing your request. Please try again later.";
pub const STREAM_UNAVAILABLE_MESSAGE: &str = "AI service not available. Please check configuration.";
pub const STREAM_ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: i32 = 800;
const STREAM_PACING: Duration = Duration::from_millis(10);

/// A document ranked against a query, with `1 / (1 + distance)` as its score.
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub document: Document,
    pub similarity_score: f32,
}

/// Orchestrates one chat turn: retrieve nearest documents, assemble the
/// grounded conversation, call the provider (buffered or streaming). Provider
/// failures degrade to fixed fallback text; only empty input surfaces as an
/// error. Built once at startup and shared read-only.
pub struct RagSystem {
    provider: Option<Arc<dyn LlmProvider>>,
    index: Option<VectorIndex>,
    top_k: usize,
}

impl RagSystem {
    pub fn new(
        provider: Option<Arc<dyn LlmProvider>>,
        index: Option<VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            provider,
            index,
            top_k,
        }
    }

    /// Loads the corpus, embeds it through the provider and builds the index.
    /// Any failure leaves the system permanently not-ready rather than failing
    /// startup; every chat call then short-circuits to the unavailability
    /// message.
    pub async fn initialize(config: &AppConfig, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        let index = match &provider {
            Some(provider) => {
                let documents = knowledge::load_documents(&config.knowledge_base_path);
                build_index(provider.as_ref(), documents).await
            }
            None => {
                tracing::warn!(
                    "Azure OpenAI is not configured; chat will return the unavailability message"
                );
                None
            }
        };

        Self::new(provider, index, config.top_k)
    }

    /// Readiness is permanent for the process lifetime: true only when the
    /// provider is configured and the index was built at startup.
    pub fn is_ready(&self) -> bool {
        self.provider.is_some() && self.index.is_some()
    }

    /// Buffered chat. Returns the provider's completion verbatim, or a fixed
    /// fallback string when the provider fails at any step.
    pub async fn chat(&self, history: &[ChatMessage]) -> Result<String, ApiError> {
        let last = last_message(history)?;

        let (provider, index) = match (&self.provider, &self.index) {
            (Some(provider), Some(index)) => (provider, index),
            _ => return Ok(UNAVAILABLE_MESSAGE.to_string()),
        };

        let retrieved = match retrieve(provider.as_ref(), index, &last.content, self.top_k).await {
            Ok(docs) => docs,
            Err(err) => {
                tracing::error!("Retrieval failed: {}", err);
                return Ok(FALLBACK_MESSAGE.to_string());
            }
        };

        let request = chat_request(&retrieved, history);
        match provider.chat(request).await {
            Ok(text) => Ok(text),
            Err(err) => {
                tracing::error!("Provider chat call failed: {}", err);
                Ok(FALLBACK_MESSAGE.to_string())
            }
        }
    }

    /// Streaming chat. The receiver yields fully formed SSE frames: one
    /// `data: {"content": ...}` frame per provider delta in arrival order,
    /// then exactly one `data: [DONE]` terminator on every path. A provider
    /// failure before or after partial output injects one fixed error frame
    /// ahead of the terminator.
    pub async fn stream_chat(
        &self,
        history: &[ChatMessage],
    ) -> Result<mpsc::Receiver<String>, ApiError> {
        let last = last_message(history)?.clone();
        let (tx, rx) = mpsc::channel(32);

        let (provider, index) = match (&self.provider, &self.index) {
            (Some(provider), Some(index)) => (provider, index),
            _ => {
                // channel capacity covers both frames; no consumer needed yet
                let _ = tx.send(content_frame(STREAM_UNAVAILABLE_MESSAGE)).await;
                let _ = tx.send(DONE_FRAME.to_string()).await;
                return Ok(rx);
            }
        };

        let retrieved = match retrieve(provider.as_ref(), index, &last.content, self.top_k).await {
            Ok(docs) => docs,
            Err(err) => {
                tracing::error!("Retrieval failed: {}", err);
                let _ = tx.send(content_frame(STREAM_ERROR_MESSAGE)).await;
                let _ = tx.send(DONE_FRAME.to_string()).await;
                return Ok(rx);
            }
        };

        let request = chat_request(&retrieved, history);
        let provider = Arc::clone(provider);

        tokio::spawn(async move {
            let mut deltas = match provider.stream_chat(request).await {
                Ok(deltas) => deltas,
                Err(err) => {
                    tracing::error!("Provider stream setup failed: {}", err);
                    let _ = tx.send(content_frame(STREAM_ERROR_MESSAGE)).await;
                    let _ = tx.send(DONE_FRAME.to_string()).await;
                    return;
                }
            };

            while let Some(item) = deltas.recv().await {
                match item {
                    Ok(delta) => {
                        if tx.send(content_frame(&delta)).await.is_err() {
                            // consumer disconnected; no terminator owed
                            return;
                        }
                        tokio::time::sleep(STREAM_PACING).await;
                    }
                    Err(err) => {
                        tracing::error!("Provider stream failed mid-response: {}", err);
                        let _ = tx.send(content_frame(STREAM_ERROR_MESSAGE)).await;
                        break;
                    }
                }
            }

            let _ = tx.send(DONE_FRAME.to_string()).await;
        });

        Ok(rx)
    }
}

async fn build_index(provider: &dyn LlmProvider, documents: Vec<Document>) -> Option<VectorIndex> {
    let contents: Vec<String> = documents.iter().map(|doc| doc.content.clone()).collect();
    let embeddings = match provider.embed(&contents).await {
        Ok(embeddings) => embeddings,
        Err(err) => {
            tracing::error!("Failed to embed knowledge base: {}", err);
            return None;
        }
    };

    match VectorIndex::build(documents, embeddings) {
        Ok(index) => {
            tracing::info!(
                "Vector index built: {} documents, dimension {}",
                index.len(),
                index.dim()
            );
            Some(index)
        }
        Err(err) => {
            tracing::error!("Failed to build vector index: {}", err);
            None
        }
    }
}

fn last_message(history: &[ChatMessage]) -> Result<&ChatMessage, ApiError> {
    history
        .last()
        .ok_or_else(|| ApiError::BadRequest("message history must not be empty".to_string()))
}

/// Embeds the query with the same deployment used at build time and maps the
/// nearest hits back onto documents. Indices outside the corpus are dropped.
async fn retrieve(
    provider: &dyn LlmProvider,
    index: &VectorIndex,
    query: &str,
    top_k: usize,
) -> Result<Vec<RetrievedDocument>, ApiError> {
    let embeddings = provider.embed(&[query.to_string()]).await?;
    let query_embedding = embeddings
        .first()
        .ok_or_else(|| ApiError::Internal("provider returned no query embedding".to_string()))?;

    let hits = index.search(query_embedding, top_k)?;

    Ok(hits
        .into_iter()
        .filter_map(|(idx, distance)| {
            index.document(idx).map(|doc| RetrievedDocument {
                document: doc.clone(),
                similarity_score: similarity_score(distance),
            })
        })
        .collect())
}

/// Context block: retrieved contents in ranked order, nearest first, separated
/// by blank lines. Order matters downstream.
fn build_context(retrieved: &[RetrievedDocument]) -> String {
    retrieved
        .iter()
        .map(|doc| doc.document.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn system_prompt(context: &str) -> String {
    format!(
        "You are a helpful AI assistant. Use the following context to answer the user's question. \
         If the context doesn't contain relevant information, say you don't know based on the available information.\n\n\
         Context: {}\n\n\
         Please provide a helpful response based on the context above. If appropriate, suggest a follow-up question or related topic to explore further.",
        context
    )
}

/// The grounding system message followed by the full caller-supplied history,
/// so multi-turn context is preserved.
fn chat_request(retrieved: &[RetrievedDocument], history: &[ChatMessage]) -> ChatRequest {
    let mut conversation = Vec::with_capacity(history.len() + 1);
    conversation.push(ChatMessage::system(system_prompt(&build_context(retrieved))));
    conversation.extend_from_slice(history);

    ChatRequest::new(conversation)
        .with_temperature(TEMPERATURE)
        .with_max_tokens(MAX_TOKENS)
}

fn content_frame(content: &str) -> String {
    format!("data: {}\n\n", json!({ "content": content }))
}
