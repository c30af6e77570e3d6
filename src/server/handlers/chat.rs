use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::llm::types::ChatMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub response: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequestBody>,
) -> Result<Response, ApiError> {
    tracing::info!(
        "Chat request received: {} messages, stream={}",
        payload.messages.len(),
        payload.stream
    );

    if payload.stream {
        let frames = state.rag.stream_chat(&payload.messages).await?;
        let stream = futures_util::stream::unfold(frames, |mut frames| async move {
            frames
                .recv()
                .await
                .map(|frame| (Ok::<_, Infallible>(frame), frames))
        });

        Response::builder()
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(stream))
            .map_err(ApiError::internal)
    } else {
        let response = state.rag.chat(&payload.messages).await?;
        Ok(Json(ChatResponseBody { response }).into_response())
    }
}
