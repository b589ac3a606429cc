//! Completion provider trait definition

use crate::{CompletionChunk, CompletionRequest, CompletionResponse, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of incremental completion chunks
pub type ChunkStream = BoxStream<'static, Result<CompletionChunk>>;

/// Trait for completion providers
///
/// Implementations of this trait provide access to chat-style completion
/// services (e.g., DeepSeek, OpenAI, local gateways). The agent engine only
/// depends on "accepts turns, returns text, optionally streamable".
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion for the full conversation
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Generate a completion delivered as an incremental chunk stream
    ///
    /// The default implementation degrades to a single chunk carrying the
    /// whole response, for providers without native streaming.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let response = self.complete(request).await?;
        let chunk = CompletionChunk {
            delta: response.message.content,
        };
        Ok(Box::pin(futures::stream::once(async move { Ok(chunk) })))
    }

    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;
}
