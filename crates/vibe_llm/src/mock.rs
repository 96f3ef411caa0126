//! Scripted text generator for testing.
//!
//! Replays canned replies in order and records every prompt it receives,
//! so tests can drive the factory without a model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{LlmError, LlmResult};
use crate::generator::TextGenerator;

/// Reply computed from the prompt and the zero-based call index.
pub type Responder = Arc<dyn Fn(&str, usize) -> LlmResult<String> + Send + Sync>;

#[derive(Debug, Clone)]
enum ScriptedReply {
    Text(String),
    Failure(String),
}

/// A prompt captured by [`ScriptedGenerator`].
#[derive(Debug, Clone)]
pub struct CapturedPrompt {
    pub prompt: String,
    pub streaming: bool,
}

/// Text generator returning predefined replies.
///
/// Once the script runs out the last reply is repeated. An empty script
/// answers with an empty string.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    replies: Arc<RwLock<Vec<ScriptedReply>>>,
    responder: Option<Responder>,
    call_index: Arc<AtomicUsize>,
    prompts: Arc<RwLock<Vec<CapturedPrompt>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.write().push(ScriptedReply::Text(text.into()));
        self
    }

    /// Queue a failing call.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.replies
            .write()
            .push(ScriptedReply::Failure(message.into()));
        self
    }

    /// Compute every reply with `responder` instead of the script.
    pub fn with_responder(
        mut self,
        responder: impl Fn(&str, usize) -> LlmResult<String> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// All prompts received so far.
    pub fn prompts(&self) -> Vec<CapturedPrompt> {
        self.prompts.read().clone()
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.prompts.read().len()
    }

    /// The most recent prompt, if any.
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.read().last().map(|p| p.prompt.clone())
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, prompt: &str, streaming: bool) -> LlmResult<String> {
        self.prompts.write().push(CapturedPrompt {
            prompt: prompt.to_string(),
            streaming,
        });
        let index = self.call_index.fetch_add(1, Ordering::SeqCst);

        if let Some(responder) = &self.responder {
            return responder(prompt, index);
        }

        let replies = self.replies.read();
        let reply = replies.get(index).or_else(|| replies.last()).cloned();
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(message)) => Err(LlmError::Network(message)),
            None => Ok(String::new()),
        }
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }
}
