//! HTTP completion endpoint
//!
//! `POST <url>` with `{"prompt", "conversation_id"}` and the session token in
//! the `Authorization` header. A success status carries `{"reply": ...}`; a
//! failure status may carry `{"message": ...}`.

use super::{CompletionError, CompletionRequest, CompletionService};
use crate::auth::AuthorizationContext;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct WireRequest<'a> {
    prompt: &'a str,
    conversation_id: String,
}

#[derive(Deserialize)]
struct WireReply {
    reply: String,
}

#[derive(Deserialize, Default)]
struct WireFailure {
    #[serde(default)]
    message: Option<String>,
}

pub struct HttpCompletionService {
    client: Client,
    url: String,
}

impl HttpCompletionService {
    pub fn new(url: String, timeout: Duration) -> Result<Self, CompletionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = WireRequest {
            prompt: &request.prompt,
            conversation_id: request.conversation_id.to_string(),
        };

        let response = self
            .client
            .post(&self.url)
            .header(AuthorizationContext::HEADER, request.auth.token())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        interpret_response(status, &text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn interpret_response(status: StatusCode, body: &str) -> Result<String, CompletionError> {
    if status.is_success() {
        return serde_json::from_str::<WireReply>(body)
            .map(|r| r.reply)
            .map_err(|e| CompletionError::invalid_response(format!("Unreadable reply: {e}")));
    }

    let message = serde_json::from_str::<WireFailure>(body)
        .unwrap_or_default()
        .message
        .unwrap_or_else(|| format!("Completion service returned {status}"));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(CompletionError::unauthorized(message))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            Err(CompletionError::timeout(message))
        }
        _ => Err(CompletionError::server_error(message)),
    }
}
