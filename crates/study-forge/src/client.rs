//! HTTP client for the generative-text service.
//!
//! [`HttpGenerationClient`] implements the core's
//! [`GenerationBackend`] over `reqwest` for two wire protocols:
//!
//! | Provider | Endpoint | Reply text |
//! |----------|----------|------------|
//! | `gemini` | `POST {endpoint}/models/{model}:generateContent` | `candidates[0].content.parts[*].text` |
//! | `openai` | `POST {endpoint}/chat/completions` | `choices[0].message.content` |
//!
//! Each call is bounded by a connect timeout and a total timeout. The
//! client never retries; every problem is returned as a [`CallFailure`]:
//!
//! - timeout elapsed → `Timeout`
//! - DNS, connect, TLS or body read failure → `Network`
//! - non-2xx status → `Upstream` with the status and a truncated body
//! - 2xx without the expected field → `Upstream` without a status

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use study_forge_core::backend::GenerationBackend;
use study_forge_core::error::CallFailure;

use crate::config::{GenerationConfig, Provider};

/// Longest slice of an error body kept in a failure message.
const MAX_ERROR_BODY_CHARS: usize = 500;

pub struct HttpGenerationClient {
    http: reqwest::Client,
    provider: Provider,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    temperature: f64,
    max_output_tokens: u32,
    name: String,
}

impl HttpGenerationClient {
    /// Build a client from configuration, reading the credential from the
    /// configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential variable is unset or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = match config.api_key_env() {
            Some(var) => Some(
                std::env::var(var)
                    .with_context(|| format!("{} environment variable not set", var))?,
            ),
            None => None,
        };
        Self::with_api_key(config, api_key)
    }

    /// Build a client with an explicit credential.
    pub fn with_api_key(config: &GenerationConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            provider: config.provider,
            model: config.model.clone(),
            endpoint: config.endpoint().to_string(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            name: format!("{}:{}", config.provider.as_str(), config.model),
        })
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        match self.provider {
            Provider::Gemini => {
                let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
                let body = gemini_body(prompt, self.temperature, self.max_output_tokens);
                let req = self.http.post(url).json(&body);
                match &self.api_key {
                    Some(key) => req.header("x-goog-api-key", key),
                    None => req,
                }
            }
            Provider::OpenAi => {
                let url = format!("{}/chat/completions", self.endpoint);
                let body = openai_body(&self.model, prompt, self.temperature, self.max_output_tokens);
                let req = self.http.post(url).json(&body);
                match &self.api_key {
                    Some(key) => req.bearer_auth(key),
                    None => req,
                }
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, CallFailure> {
        let response = self.request(prompt).send().await.map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(CallFailure::upstream(
                Some(status.as_u16()),
                truncate(&body, MAX_ERROR_BODY_CHARS),
            ));
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| CallFailure::upstream(None, format!("reply is not JSON: {}", e)))?;

        match self.provider {
            Provider::Gemini => parse_gemini_reply(&json),
            Provider::OpenAi => parse_openai_reply(&json),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> CallFailure {
    if err.is_timeout() {
        CallFailure::Timeout(err.to_string())
    } else {
        CallFailure::Network(err.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ============ Gemini ============

fn gemini_body(prompt: &str, temperature: f64, max_output_tokens: u32) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
        "generationConfig": {
            "temperature": temperature,
            "maxOutputTokens": max_output_tokens,
        },
    })
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_reply(json: &Value) -> Result<String, CallFailure> {
    if let Some(reason) = json.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
        return Err(CallFailure::upstream(None, format!("prompt blocked: {}", reason)));
    }

    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            CallFailure::upstream(None, "reply missing candidates[0].content.parts")
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        let reason = json
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(CallFailure::upstream(
            None,
            format!("reply has no text (finish reason: {})", reason),
        ));
    }
    Ok(text)
}

// ============ OpenAI-compatible ============

fn openai_body(model: &str, prompt: &str, temperature: f64, max_output_tokens: u32) -> Value {
    json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": temperature,
        "max_tokens": max_output_tokens,
    })
}

fn parse_openai_reply(json: &Value) -> Result<String, CallFailure> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| CallFailure::upstream(None, "reply missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_reply_joins_parts() {
        let reply = json!({
            "candidates": [{
                "content": {"parts": [{"text": "[{\"question\": "}, {"text": "\"Q\", \"answer\": \"A\"}]"}]},
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            parse_gemini_reply(&reply).unwrap(),
            "[{\"question\": \"Q\", \"answer\": \"A\"}]"
        );
    }

    #[test]
    fn test_gemini_reply_missing_candidates() {
        let err = parse_gemini_reply(&json!({"candidates": []})).unwrap_err();
        assert!(matches!(err, CallFailure::Upstream { status: None, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_gemini_blocked_prompt() {
        let err = parse_gemini_reply(&json!({"promptFeedback": {"blockReason": "SAFETY"}}))
            .unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_gemini_empty_text_reports_finish_reason() {
        let reply = json!({"candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}]});
        let err = parse_gemini_reply(&reply).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_openai_reply() {
        let reply = json!({"choices": [{"message": {"role": "assistant", "content": "{\"a\": 1}"}}]});
        assert_eq!(parse_openai_reply(&reply).unwrap(), "{\"a\": 1}");
        assert!(parse_openai_reply(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_request_bodies() {
        let body = gemini_body("hi", 0.4, 8192);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);

        let body = openai_body("gpt-4o-mini", "hi", 0.2, 100);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_client_name() {
        let config = GenerationConfig::default();
        let client = HttpGenerationClient::with_api_key(&config, Some("k".into())).unwrap();
        assert_eq!(client.name(), "gemini:gemini-1.5-flash");
    }
}
