use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::config::AppConfig;
use crate::llm::azure::AzureOpenAiProvider;
use crate::llm::provider::LlmProvider;
use crate::rag::RagSystem;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub rag: Arc<RagSystem>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the provider from configuration and the RAG system from the
    /// knowledge base, before the listener accepts traffic. A missing or
    /// failing provider leaves the system serving degraded responses instead
    /// of aborting startup.
    pub async fn initialize(config: AppConfig) -> Arc<Self> {
        let provider: Option<Arc<dyn LlmProvider>> = config
            .azure
            .clone()
            .map(|azure| Arc::new(AzureOpenAiProvider::new(azure)) as Arc<dyn LlmProvider>);

        let rag = Arc::new(RagSystem::initialize(&config, provider).await);
        if !rag.is_ready() {
            tracing::warn!("RAG system is not ready; chat will serve fallback responses");
        }

        Arc::new(AppState {
            config: Arc::new(config),
            rag,
            started_at: Utc::now(),
        })
    }

    /// Constructor for tests with an already-built RAG system.
    pub fn with_rag(config: AppConfig, rag: RagSystem) -> Arc<Self> {
        Arc::new(AppState {
            config: Arc::new(config),
            rag: Arc::new(rag),
            started_at: Utc::now(),
        })
    }
}
