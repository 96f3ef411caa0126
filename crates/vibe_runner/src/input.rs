//! Stdin synthesis for interactive programs.
//!
//! Programs that read from the terminal would block forever under the
//! harness, so their prompts are collected and a model is asked for
//! plausible answers to pipe in.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};
use vibe_llm::TextGenerator;

fn prompt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"input\s*\(\s*['"]?(.*?)['"]?\s*\)"#).expect("input pattern is valid")
    })
}

/// Prompt text of every `input(...)` call site in `source`, in order.
///
/// Duplicates are kept; a bare `input()` yields an empty prompt.
pub fn detect_prompts(source: &str) -> Vec<String> {
    prompt_pattern()
        .captures_iter(source)
        .map(|c| c.get(1).map_or_else(String::new, |m| m.as_str().to_string()))
        .collect()
}

/// Build the request asking for one raw value per prompt.
pub fn synthesis_prompt(prompts: &[String]) -> String {
    let listed = prompts
        .iter()
        .map(|p| format!("- {}", p))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a coding assistant. Given the following prompts for input(), suggest realistic fake input values.\n\
         \n\
         Only output the values the user would type, one per line. DO NOT repeat the prompt text. Only raw values separated by newline.\n\
         \n\
         Prompts:\n\
         {}\n\
         \n\
         Example:\n\
         5\n\
         8\n\
         42",
        listed
    )
}

/// Produces fake terminal input with a text generator.
#[derive(Clone)]
pub struct InputSynthesizer {
    llm: Arc<dyn TextGenerator>,
}

impl InputSynthesizer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Newline-separated values for `prompts`, trimmed.
    ///
    /// No prompts means no request and an empty string. A failed request is
    /// logged and also yields an empty string. The number of returned lines
    /// is not checked against the number of prompts.
    pub async fn synthesize(&self, prompts: &[String]) -> String {
        if prompts.is_empty() {
            return String::new();
        }

        let request = synthesis_prompt(prompts);
        debug!("Requesting input for {} prompt(s)", prompts.len());

        match self.llm.generate_text(&request, false).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!("Input synthesis failed, running without input: {}", e);
                String::new()
            }
        }
    }

    /// Detect prompts in `source` and synthesize answers for them.
    pub async fn for_source(&self, source: &str) -> String {
        self.synthesize(&detect_prompts(source)).await
    }
}
