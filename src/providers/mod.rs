mod open_ai;

pub use open_ai::OpenAiProvider;

use async_trait::async_trait;

use crate::error::ParseError;

/// Language-model collaborator behind the text-mode extractor.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider identifier (e.g., "openai")
    fn provider_name(&self) -> &str;

    /// One chat completion: system prompt plus user payload in, raw model
    /// text out. Implementations must not log prompt contents above debug;
    /// pasted text can contain anything.
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, ParseError>;
}
