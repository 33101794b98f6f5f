//! Client for the Gemini `generateContent` REST endpoint.

use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use super::prompt::{build_prompt, parse_response};
use super::{AnalysisOutcome, Classification, InferenceClient, InferenceError};
use crate::session::IntakeSnapshot;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub fn default_models() -> Vec<String> {
    ["gemini-1.5-flash", "gemini-1.5-pro", "gemini-pro"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    pub fn text(&self) -> Result<String, InferenceError> {
        let content = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .ok_or_else(|| InferenceError::MalformedResponse("no candidates returned".into()))?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        if text.trim().is_empty() {
            return Err(InferenceError::MalformedResponse("empty answer".into()));
        }
        Ok(text)
    }
}

/// Map an HTTP error status to the error taxonomy.
pub fn classify_status(code: u16, body: &str) -> InferenceError {
    match code {
        429 => InferenceError::QuotaExceeded,
        401 | 403 => InferenceError::Auth(format!("status {code}")),
        400 if body.to_uppercase().contains("API_KEY") => {
            InferenceError::Auth("invalid API key".into())
        }
        _ if body.to_lowercase().contains("quota") => InferenceError::QuotaExceeded,
        _ => InferenceError::Transient(format!("status {code}")),
    }
}

/// Try each model in order. Auth and quota failures stop the search; other
/// failures move on to the next model.
pub fn classify_with_fallback<F>(
    models: &[String],
    mut attempt: F,
) -> Result<AnalysisOutcome, InferenceError>
where
    F: FnMut(&str) -> Result<Classification, InferenceError>,
{
    let mut last = String::from("no models configured");
    for model in models {
        info!("requesting classification from {model}");
        match attempt(model) {
            Ok(classification) => {
                return Ok(AnalysisOutcome {
                    classification,
                    model: model.clone(),
                })
            }
            Err(err) if err.is_transient() => {
                warn!("{model} failed, trying next model: {err}");
                last = err.to_string();
            }
            Err(err) => return Err(err),
        }
    }
    Err(InferenceError::AllModelsFailed { last })
}

pub struct GeminiClient {
    api_key: Option<String>,
    models: Vec<String>,
    endpoint: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, models: Vec<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            models,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    fn generate(&self, key: &str, model: &str, prompt: &str) -> Result<String, InferenceError> {
        let url = format!("{}/{model}:generateContent", self.endpoint.trim_end_matches('/'));
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = ureq::post(&url)
            .timeout(self.timeout)
            .query("key", key)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(|err| match err {
                ureq::Error::Status(code, response) => {
                    let body = response.into_string().unwrap_or_default();
                    classify_status(code, &body)
                }
                ureq::Error::Transport(transport) => {
                    InferenceError::Transient(transport.to_string())
                }
            })?;

        let parsed: GenerateResponse = response
            .into_json()
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
        parsed.text()
    }
}

impl InferenceClient for GeminiClient {
    fn classify(&self, snapshot: &IntakeSnapshot) -> Result<AnalysisOutcome, InferenceError> {
        let key = self.api_key.as_deref().ok_or(InferenceError::MissingApiKey)?;
        let prompt = build_prompt(snapshot);
        classify_with_fallback(&self.models, |model| {
            let text = self.generate(key, model, &prompt)?;
            parse_response(&text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Urgency;
    use assert_matches::assert_matches;

    fn low() -> Classification {
        Classification {
            diagnosis: "Common cold".into(),
            urgency: Urgency::Low,
            recommendation: "Rest".into(),
            detail: String::new(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(classify_status(429, ""), InferenceError::QuotaExceeded);
        assert_matches!(classify_status(403, ""), InferenceError::Auth(_));
        assert_matches!(
            classify_status(400, r#"{"error":{"reason":"API_KEY_INVALID"}}"#),
            InferenceError::Auth(_)
        );
        assert_eq!(
            classify_status(500, "Quota exceeded for metric"),
            InferenceError::QuotaExceeded
        );
        assert_matches!(classify_status(503, "overloaded"), InferenceError::Transient(_));
        assert_matches!(classify_status(404, "model not found"), InferenceError::Transient(_));
    }

    #[test]
    fn test_fallback_moves_past_transient_failures() {
        let mut tried = Vec::new();
        let outcome = classify_with_fallback(&default_models(), |model| {
            tried.push(model.to_string());
            if model == "gemini-pro" {
                Ok(low())
            } else {
                Err(InferenceError::Transient("status 404".into()))
            }
        })
        .unwrap();
        assert_eq!(outcome.model, "gemini-pro");
        assert_eq!(tried.len(), 3);
    }

    #[test]
    fn test_fallback_stops_on_quota() {
        let mut calls = 0;
        let result = classify_with_fallback(&default_models(), |_| {
            calls += 1;
            Err(InferenceError::QuotaExceeded)
        });
        assert_eq!(result, Err(InferenceError::QuotaExceeded));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_fallback_exhausted() {
        let result = classify_with_fallback(&default_models(), |_| {
            Err(InferenceError::Transient("connection refused".into()))
        });
        assert_matches!(
            result,
            Err(InferenceError::AllModelsFailed { last }) if last.contains("connection refused")
        );
    }

    #[test]
    fn test_missing_key_is_reported_without_network() {
        let client = GeminiClient::new(Some("  ".into()), default_models());
        assert_eq!(
            client.classify(&IntakeSnapshot::default()),
            Err(InferenceError::MissingApiKey)
        );
    }

    #[test]
    fn test_response_text_extraction() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"URGENCY: "},{"text":"Low"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text().unwrap(), "URGENCY: Low");

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_matches!(empty.text(), Err(InferenceError::MalformedResponse(_)));
    }
}
