//! Per-turn intent classification results.
//!
//! An [`Intent`] is ephemeral: produced by one classifier call, consumed by the
//! routing step of the same turn, and retained only in the in-memory
//! conversation context. Sentiment and urgency are closed enums so condition
//! routing stays deterministic.

use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Caller emotion as reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Lenient parse used on model output: unknown strings become `Neutral`.
    pub fn parse(s: &str) -> Self {
        Self::parse_strict(s).unwrap_or(Sentiment::Neutral)
    }

    /// Strict parse used when authoring conditions: unknown strings are rejected.
    pub fn parse_strict(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgent the caller's request is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// Lenient parse used on model output: unknown strings become `Low`.
    pub fn parse(s: &str) -> Self {
        Self::parse_strict(s).unwrap_or(Urgency::Low)
    }

    /// Strict parse used when authoring conditions.
    pub fn parse_strict(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Urgency::Low),
            "medium" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            "critical" => Some(Urgency::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one user utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// What the caller is trying to do ("schedule", "complain", "confirm", ...).
    #[serde(rename = "intent")]
    pub label: String,
    /// Classifier confidence, clamped to 0.0..=1.0.
    pub confidence: f32,
    /// Entities extracted from the utterance (name, date, product, ...).
    #[serde(default)]
    pub entities: HashMap<String, serde_json::Value>,
    pub sentiment: Sentiment,
    pub urgency: Urgency,
    /// Suggested next action for the agent ("collect_info", "transfer", ...).
    #[serde(default)]
    pub next_action: String,
}

/// Wire shape of the classifier's JSON. Sentiment/urgency arrive as free-form
/// strings and are folded into the closed enums leniently.
#[derive(Deserialize)]
struct RawIntent {
    intent: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    entities: HashMap<String, serde_json::Value>,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    next_action: String,
}

impl Intent {
    /// Neutral fallback used whenever the classifier call fails or times out,
    /// so a turn always completes.
    pub fn fallback() -> Self {
        Intent {
            label: "continue".to_string(),
            confidence: 0.5,
            entities: HashMap::new(),
            sentiment: Sentiment::Neutral,
            urgency: Urgency::Low,
            next_action: "continue_flow".to_string(),
        }
    }

    /// Parse a classifier reply. Tolerates markdown fences and leading prose by
    /// extracting the outermost JSON object before deserializing.
    pub fn from_model_json(raw: &str) -> FlowResult<Self> {
        let json = extract_json_object(raw)
            .ok_or_else(|| FlowError::Parse("no JSON object in classifier reply".to_string()))?;
        let raw: RawIntent = serde_json::from_str(json)
            .map_err(|e| FlowError::Parse(format!("classifier JSON: {}", e)))?;
        Ok(Intent {
            label: raw.intent,
            confidence: raw.confidence.clamp(0.0, 1.0),
            entities: raw.entities,
            sentiment: Sentiment::parse(&raw.sentiment),
            urgency: Urgency::parse(&raw.urgency),
            next_action: raw.next_action,
        })
    }
}

/// Slice out the outermost `{...}` of a model reply, if any.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let raw = r#"{"intent":"schedule","confidence":0.92,"entities":{"name":"John Doe"},"sentiment":"positive","urgency":"medium","next_action":"collect_info"}"#;
        let intent = Intent::from_model_json(raw).unwrap();
        assert_eq!(intent.label, "schedule");
        assert_eq!(intent.sentiment, Sentiment::Positive);
        assert_eq!(intent.urgency, Urgency::Medium);
        assert_eq!(intent.entities["name"], serde_json::json!("John Doe"));
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"intent\":\"cancel\",\"confidence\":1.4,\"sentiment\":\"angry\",\"urgency\":\"critical\"}\n```";
        let intent = Intent::from_model_json(raw).unwrap();
        assert_eq!(intent.label, "cancel");
        // confidence clamps, unknown sentiment degrades to neutral
        assert_eq!(intent.confidence, 1.0);
        assert_eq!(intent.sentiment, Sentiment::Neutral);
        assert_eq!(intent.urgency, Urgency::Critical);
    }

    #[test]
    fn rejects_non_json() {
        assert!(Intent::from_model_json("I could not classify that.").is_err());
    }

    #[test]
    fn fallback_is_neutral() {
        let intent = Intent::fallback();
        assert_eq!(intent.label, "continue");
        assert_eq!(intent.sentiment, Sentiment::Neutral);
        assert_eq!(intent.urgency, Urgency::Low);
        assert!(intent.entities.is_empty());
    }
}
