//! Language-Model Caller (spec §4.16): indirection over an in-process
//! host-sampling capability vs. a direct HTTP provider call, with an
//! auto-fallback strategy.
//!
//! Grounded on the teacher's own provider-abstraction pattern (a trait/enum
//! chosen by config, `reqwest` for the direct path); sampling here is a
//! callback injected at boot from the transport layer rather than an SDK
//! client, since the transport itself is out of scope for this engine.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

pub type SamplingFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send>>;

/// Host-injected "ask the sampling-capable caller" reference. Takes
/// `(system_prompt, user_message, max_tokens)`.
pub type SamplingCallback = Arc<dyn Fn(&str, &str, Option<u32>) -> SamplingFuture + Send + Sync>;

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct LlmCaller {
    config: LlmConfig,
    sampling: Option<SamplingCallback>,
    client: reqwest::Client,
}

impl LlmCaller {
    pub fn new(config: LlmConfig, sampling: Option<SamplingCallback>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            sampling,
            client,
        }
    }

    /// Single-turn helper: temperature 0.3, returns concatenated text.
    pub async fn ask(&self, system_prompt: &str, user_message: &str, max_tokens: Option<u32>) -> Result<String> {
        match self.config.mode.as_str() {
            "sampling" => self.via_sampling(system_prompt, user_message, max_tokens).await,
            "direct" => self.via_direct(system_prompt, user_message, max_tokens).await,
            _ => match self.via_sampling(system_prompt, user_message, max_tokens).await {
                Ok(text) => Ok(text),
                Err(_) => self.via_direct(system_prompt, user_message, max_tokens).await,
            },
        }
    }

    async fn via_sampling(&self, system_prompt: &str, user_message: &str, max_tokens: Option<u32>) -> Result<String> {
        let callback = self
            .sampling
            .as_ref()
            .ok_or_else(|| Error::LanguageModelUnavailable("no sampling capability injected".to_string()))?;
        callback(system_prompt, user_message, max_tokens).await
    }

    async fn via_direct(&self, system_prompt: &str, user_message: &str, max_tokens: Option<u32>) -> Result<String> {
        let api_key = std::env::var(&self.config.api_key_env).map_err(|_| {
            Error::LanguageModelUnavailable(format!(
                "environment variable {} is not set",
                self.config.api_key_env
            ))
        })?;

        let mut body = json!({
            "model": self.config.model,
            "temperature": 0.3,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_message},
            ],
        });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::LanguageModelUnavailable(format!(
                "provider responded with {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LanguageModelMalformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::LanguageModelMalformed("no choices in provider response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sampling_mode_without_callback_fails() {
        let caller = LlmCaller::new(
            LlmConfig {
                mode: "sampling".to_string(),
                ..Default::default()
            },
            None,
        );
        let err = caller.ask("sys", "hi", None).await.unwrap_err();
        assert!(matches!(err, Error::LanguageModelUnavailable(_)));
    }

    #[tokio::test]
    async fn auto_mode_uses_sampling_when_present() {
        let callback: SamplingCallback = Arc::new(|_sys, user, _max| {
            let user = user.to_string();
            Box::pin(async move { Ok(format!("echo: {user}")) })
        });
        let caller = LlmCaller::new(LlmConfig::default(), Some(callback));
        let reply = caller.ask("sys", "hello", None).await.unwrap();
        assert_eq!(reply, "echo: hello");
    }
}
