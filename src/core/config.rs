use std::env;
use std::path::PathBuf;

/// Azure OpenAI connection settings. Present only when the endpoint, key and
/// chat deployment are all configured; a partial configuration counts as none.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub azure: Option<AzureConfig>,
    pub knowledge_base_path: PathBuf,
    pub top_k: usize,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub log_dir: PathBuf,
}

pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_PORT: u16 = 8000;

impl AppConfig {
    pub fn from_env() -> Self {
        let azure = resolve_azure(
            env::var("AZURE_OPENAI_ENDPOINT").ok(),
            env::var("AZURE_OPENAI_API_KEY").ok(),
            env::var("AZURE_OPENAI_API_VERSION").ok(),
            env::var("AZURE_OPENAI_DEPLOYMENT_NAME").ok(),
            env::var("AZURE_OPENAI_EMBEDDING_DEPLOYMENT").ok(),
        );

        let knowledge_base_path = env::var("KNOWLEDGE_BASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("knowledge_base/sample_document.md"));

        let top_k = env::var("RAG_TOP_K")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .filter(|k| *k > 0)
            .unwrap_or(DEFAULT_TOP_K);

        let port = env::var("PORT")
            .ok()
            .and_then(|val| val.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|raw| parse_origins(&raw))
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(default_local_origins);

        let log_dir = env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        AppConfig {
            azure,
            knowledge_base_path,
            top_k,
            port,
            allowed_origins,
            log_dir,
        }
    }
}

fn resolve_azure(
    endpoint: Option<String>,
    api_key: Option<String>,
    api_version: Option<String>,
    chat_deployment: Option<String>,
    embedding_deployment: Option<String>,
) -> Option<AzureConfig> {
    let endpoint = non_empty(endpoint)?;
    let api_key = non_empty(api_key)?;
    let chat_deployment = non_empty(chat_deployment)?;

    Some(AzureConfig {
        endpoint: endpoint.trim_end_matches('/').to_string(),
        api_key,
        api_version: non_empty(api_version).unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        chat_deployment,
        embedding_deployment: non_empty(embedding_deployment)
            .unwrap_or_else(|| DEFAULT_EMBEDDING_DEPLOYMENT.to_string()),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|val| !val.trim().is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

fn default_local_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(val: &str) -> Option<String> {
        Some(val.to_string())
    }

    #[test]
    fn azure_config_requires_endpoint_key_and_deployment() {
        assert!(resolve_azure(None, None, None, None, None).is_none());
        assert!(resolve_azure(some("https://x"), some("key"), None, None, None).is_none());
        assert!(resolve_azure(some("https://x"), None, None, some("gpt"), None).is_none());

        let config = resolve_azure(some("https://x/"), some("key"), None, some("gpt"), None)
            .expect("complete settings should resolve");
        assert_eq!(config.endpoint, "https://x");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.embedding_deployment, DEFAULT_EMBEDDING_DEPLOYMENT);
    }

    #[test]
    fn blank_values_count_as_missing() {
        assert!(resolve_azure(some("  "), some("key"), None, some("gpt"), None).is_none());
    }

    #[test]
    fn origin_list_is_split_and_trimmed() {
        let origins = parse_origins("http://localhost:3000, https://app.example.com ,");
        assert_eq!(
            origins,
            vec![
                "http://localhost:3000".to_string(),
                "https://app.example.com".to_string()
            ]
        );
    }
}
