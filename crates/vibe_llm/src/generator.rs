//! The text-generation capability consumed by the factory.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmResult;

/// Callback receiving streamed text deltas as they arrive.
pub type StreamSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Something that turns a prompt into text.
///
/// Implementations must tolerate being called repeatedly with growing
/// prompts. When `streaming` is set the implementation may consume the
/// response incrementally, but it still returns only once the full text is
/// available.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate_text(&self, prompt: &str, streaming: bool) -> LlmResult<String>;

    /// Short backend label for logs.
    fn name(&self) -> String {
        "llm".to_string()
    }
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate_text(&self, prompt: &str, streaming: bool) -> LlmResult<String> {
        (**self).generate_text(prompt, streaming).await
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
