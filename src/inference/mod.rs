//! Preliminary triage classification by a remote generative model.

pub mod gemini;
pub mod prompt;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::IntakeSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Urgency {
    High,
    Moderate,
    Low,
}

impl Urgency {
    pub const ALL: [Urgency; 3] = [Urgency::High, Urgency::Moderate, Urgency::Low];

    /// Label stored with each record and shown on screen.
    pub fn label(&self) -> &'static str {
        match self {
            Urgency::High => "HIGH URGENCY (Red)",
            Urgency::Moderate => "MODERATE (Yellow)",
            Urgency::Low => "LOW (Green)",
        }
    }

    pub fn severity(&self) -> u8 {
        match self {
            Urgency::High => 3,
            Urgency::Moderate => 2,
            Urgency::Low => 1,
        }
    }

    pub fn from_label(label: &str) -> Option<Urgency> {
        Self::ALL.into_iter().find(|u| u.label() == label)
    }

    /// Read a free-form urgency answer such as "High" or "MODERATE (Yellow)".
    ///
    /// An exact label wins; otherwise only the leading word counts, so
    /// "Low, no red flags" stays Low. Anything else is `None`.
    pub fn parse_loose(text: &str) -> Option<Urgency> {
        let text = text.trim();
        if let Some(urgency) = Self::ALL
            .into_iter()
            .find(|u| u.label().eq_ignore_ascii_case(text))
        {
            return Some(urgency);
        }
        let leading = text
            .split(|c: char| !c.is_alphanumeric())
            .find(|word| !word.is_empty())?
            .to_uppercase();
        match leading.as_str() {
            "HIGH" | "RED" => Some(Urgency::High),
            "MODERATE" | "YELLOW" => Some(Urgency::Moderate),
            "LOW" | "GREEN" => Some(Urgency::Low),
            _ => None,
        }
    }
}

/// Sort rank of a stored urgency label. Labels this build does not know
/// rank below every known level.
pub fn severity_of_label(label: &str) -> u8 {
    Urgency::from_label(label).map_or(0, |u| u.severity())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub diagnosis: String,
    pub urgency: Urgency,
    pub recommendation: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub classification: Classification,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("no API key configured (set GEMINI_API_KEY or api_key in the config file)")]
    MissingApiKey,
    #[error("the API key was rejected: {0}")]
    Auth(String),
    #[error("the API quota is exhausted, try again later")]
    QuotaExceeded,
    #[error("inference request failed: {0}")]
    Transient(String),
    #[error("no model could be reached (last error: {last})")]
    AllModelsFailed { last: String },
    #[error("could not read the model's answer: {0}")]
    MalformedResponse(String),
}

impl InferenceError {
    /// Whether trying the next model could help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InferenceError::Transient(_) | InferenceError::MalformedResponse(_)
        )
    }
}

pub trait InferenceClient: Send + Sync {
    fn classify(&self, snapshot: &IntakeSnapshot) -> Result<AnalysisOutcome, InferenceError>;
}

/// Run a classification on a worker thread and hand the outcome to `notify`.
pub fn spawn_analysis<F>(
    client: Arc<dyn InferenceClient>,
    snapshot: IntakeSnapshot,
    notify: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce(Result<AnalysisOutcome, InferenceError>) + Send + 'static,
{
    thread::Builder::new()
        .name("analysis".into())
        .spawn(move || {
            let result = client.classify(&snapshot);
            match &result {
                Ok(outcome) => info!(
                    "analysis complete with {}: {}",
                    outcome.model,
                    outcome.classification.urgency.label()
                ),
                Err(err) => error!("analysis failed: {err}"),
            }
            notify(result);
        })
}
