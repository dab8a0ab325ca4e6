use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::AiConfig;
use crate::error::ParseError;
use crate::providers::LlmProvider;

const MAX_COMPLETION_TOKENS: u32 = 2000;

/// OpenAI-compatible chat-completions client. Works against api.openai.com
/// and against any proxy or self-hosted endpoint speaking the same API via
/// the configured base URL.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(config: &AiConfig) -> Result<Self, ParseError> {
        // Try config first, then fall back to the environment
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                ParseError::LlmError("OPENAI_API_KEY not found in config or environment".into())
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(OpenAiProvider {
            client,
            api_key,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    #[doc(hidden)]
    pub fn with_base_url(api_key: String, base_url: String, model: String) -> Self {
        OpenAiProvider {
            client: Client::new(),
            api_key,
            base_url,
            model,
            temperature: 0.3,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ParseError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": user_prompt}
                ],
                "temperature": self.temperature,
                "max_tokens": MAX_COMPLETION_TOKENS,
                "response_format": {"type": "json_object"}
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::LlmError(format!(
                "{} returned {status}: {body}",
                self.model
            )));
        }

        let body: Value = response.json().await?;
        debug!("completion response: {body:?}");
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| ParseError::LlmError("response had no message content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_complete_returns_message_content() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "choices": [{
                        "message": {
                            "content": "{\"name\": \"Pasta\"}"
                        }
                    }]
                }"#,
            )
            .create();

        let provider = OpenAiProvider::with_base_url(
            "fake_api_key".to_string(),
            server.url(),
            "gpt-4o-mini".to_string(),
        );
        let result = provider
            .complete("extract the recipe", "pasta with sauce")
            .await
            .unwrap();
        assert!(result.contains("Pasta"));
        mock.assert();
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "rate limited"}"#)
            .create();

        let provider = OpenAiProvider::with_base_url(
            "fake_api_key".to_string(),
            server.url(),
            "gpt-4o-mini".to_string(),
        );
        let result = provider.complete("extract", "text").await;
        match result {
            Err(ParseError::LlmError(message)) => assert!(message.contains("429")),
            other => panic!("expected LlmError, got {other:?}"),
        }
        mock.assert();
    }

    #[tokio::test]
    async fn test_missing_content_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create();

        let provider = OpenAiProvider::with_base_url(
            "fake_api_key".to_string(),
            server.url(),
            "gpt-4o-mini".to_string(),
        );
        assert!(provider.complete("extract", "text").await.is_err());
    }

    #[test]
    fn test_provider_name() {
        let provider = OpenAiProvider::with_base_url(
            "fake_api_key".to_string(),
            "http://localhost".to_string(),
            "gpt-4o-mini".to_string(),
        );
        assert_eq!(provider.provider_name(), "openai");
    }
}
