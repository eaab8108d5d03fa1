//! Canned responder used when no completion endpoint is configured

use super::{CompletionError, CompletionRequest, CompletionService};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::time::Duration;

pub const CANNED_REPLIES: [&str; 5] = [
    "I'm an AI assistant. How can I help you today?",
    "That's an interesting question. Let me think about that...",
    "I can help you with coding, writing, and answering questions.",
    "I'm a large language model trained to assist with various tasks.",
    "I'd be happy to help you with that! Let me provide some information.",
];

/// Replies with one of `CANNED_REPLIES` after a fixed delay
pub struct CannedCompletionService {
    latency: Duration,
}

impl CannedCompletionService {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl CompletionService for CannedCompletionService {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
        tokio::time::sleep(self.latency).await;
        let reply = CANNED_REPLIES.choose(&mut rand::thread_rng()).copied();
        reply
            .map(str::to_string)
            .ok_or_else(|| CompletionError::server_error("No canned replies available"))
    }

    fn name(&self) -> &str {
        "canned"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::completion_request;

    #[tokio::test(start_paused = true)]
    async fn test_replies_after_latency() {
        let service = CannedCompletionService::new(Duration::from_secs(1));
        let request = completion_request("hello");

        let started = tokio::time::Instant::now();
        let reply = service.complete(&request).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(CANNED_REPLIES.contains(&reply.as_str()));
    }
}
