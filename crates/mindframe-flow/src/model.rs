//! Flow data model: the static conversation graph.
//!
//! A [`Flow`] is a named directed graph of [`FlowNode`]s, immutable once
//! constructed. Condition routing uses a closed predicate language
//! ([`Condition`]) evaluated deterministically against the turn's
//! [`Intent`] — malformed condition strings are rejected when the flow is
//! built or imported, never guessed at runtime.

use crate::error::FlowError;
use crate::intent::{Intent, Sentiment, Urgency};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Step kind of a flow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Greeting,
    Question,
    Decision,
    ApiCall,
    Transfer,
    Message,
    End,
    Wait,
    IntentCheck,
    SentimentCheck,
}

impl NodeType {
    /// Terminal nodes end the conversation when reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeType::End | NodeType::Transfer)
    }

    /// Routing nodes are not conversational steps: the engine evaluates their
    /// conditions against the current turn's intent and hops straight through.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            NodeType::Decision | NodeType::IntentCheck | NodeType::SentimentCheck
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Greeting => "greeting",
            NodeType::Question => "question",
            NodeType::Decision => "decision",
            NodeType::ApiCall => "api_call",
            NodeType::Transfer => "transfer",
            NodeType::Message => "message",
            NodeType::End => "end",
            NodeType::Wait => "wait",
            NodeType::IntentCheck => "intent_check",
            NodeType::SentimentCheck => "sentiment_check",
        }
    }

    /// Icon used in Mermaid exports.
    pub fn icon(&self) -> &'static str {
        match self {
            NodeType::Greeting => "👋",
            NodeType::Question => "❓",
            NodeType::Decision => "🔀",
            NodeType::ApiCall => "🔌",
            NodeType::Transfer => "📞",
            NodeType::Message => "💬",
            NodeType::End => "✅",
            NodeType::Wait => "⏳",
            NodeType::IntentCheck => "🧠",
            NodeType::SentimentCheck => "😊",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing predicate, evaluated against the turn's [`Intent`].
///
/// String form (used when authoring and in JSON): `sentiment:<label>`,
/// `urgency:<label>`, `intent:<label>`. A bare label is shorthand for
/// `intent:<label>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    SentimentIs(Sentiment),
    UrgencyIs(Urgency),
    IntentIs(String),
}

impl Condition {
    /// True when the predicate holds for this intent. Intent labels compare
    /// case-insensitively; sentiment and urgency compare exactly.
    pub fn matches(&self, intent: &Intent) -> bool {
        match self {
            Condition::SentimentIs(s) => intent.sentiment == *s,
            Condition::UrgencyIs(u) => intent.urgency == *u,
            Condition::IntentIs(label) => intent.label.eq_ignore_ascii_case(label),
        }
    }
}

impl FromStr for Condition {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FlowError::Condition(
                s.to_string(),
                "empty condition".to_string(),
            ));
        }
        if let Some(rest) = s.strip_prefix("sentiment:") {
            return Sentiment::parse_strict(rest)
                .map(Condition::SentimentIs)
                .ok_or_else(|| {
                    FlowError::Condition(
                        s.to_string(),
                        format!("unknown sentiment '{}'", rest.trim()),
                    )
                });
        }
        if let Some(rest) = s.strip_prefix("urgency:") {
            return Urgency::parse_strict(rest)
                .map(Condition::UrgencyIs)
                .ok_or_else(|| {
                    FlowError::Condition(
                        s.to_string(),
                        format!("unknown urgency '{}'", rest.trim()),
                    )
                });
        }
        if let Some(rest) = s.strip_prefix("intent:") {
            let label = rest.trim();
            if label.is_empty() {
                return Err(FlowError::Condition(
                    s.to_string(),
                    "empty intent label".to_string(),
                ));
            }
            return Ok(Condition::IntentIs(label.to_string()));
        }
        if s.contains(':') {
            return Err(FlowError::Condition(
                s.to_string(),
                "unknown predicate (use sentiment:, urgency:, or intent:)".to_string(),
            ));
        }
        // Bare label, e.g. "yes" — shorthand for intent matching. Anything
        // that is not a plain label (expressions, spaces) is rejected.
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(FlowError::Condition(
                s.to_string(),
                "not a plain intent label (use sentiment:, urgency:, or intent:)".to_string(),
            ));
        }
        Ok(Condition::IntentIs(s.to_string()))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::SentimentIs(s) => write!(f, "sentiment:{}", s),
            Condition::UrgencyIs(u) => write!(f, "urgency:{}", u),
            Condition::IntentIs(label) => write!(f, "intent:{}", label),
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Condition::from_str(&s).map_err(D::Error::custom)
    }
}

/// One entry in a node's routing table: first matching entry wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRoute {
    pub when: Condition,
    pub to: String,
}

/// Side effect attached to a node: an outbound API call (simulated by the
/// engine; real execution belongs to the integration tier) or a call transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeAction {
    Api {
        endpoint: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
    },
    Transfer { target: String },
}

/// Input validation hint for question nodes. Advisory only — enforcement is
/// left to the classifier prompt and downstream consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
}

fn default_node_timeout() -> u64 {
    30
}

/// Single step of a conversation flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Prompt template; `{variable}` placeholders are rendered from collected data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_to_collect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_nodes: Vec<String>,
    /// Ordered routing table; checked before `next_nodes`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<NodeAction>,
    /// Seconds to wait for caller input at this step.
    #[serde(default = "default_node_timeout")]
    pub timeout_secs: u64,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        FlowNode {
            id: id.into(),
            node_type,
            prompt: None,
            variable_to_collect: None,
            validation: None,
            next_nodes: Vec::new(),
            conditions: Vec::new(),
            action: None,
            timeout_secs: default_node_timeout(),
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn collect(mut self, variable: impl Into<String>) -> Self {
        self.variable_to_collect = Some(variable.into());
        self
    }

    pub fn validation(mut self, rule: ValidationRule) -> Self {
        self.validation = Some(rule);
        self
    }

    /// Append a default successor.
    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next_nodes.push(next.into());
        self
    }

    /// Append a condition route. Routes are checked in insertion order.
    pub fn when(mut self, condition: Condition, to: impl Into<String>) -> Self {
        self.conditions.push(ConditionRoute {
            when: condition,
            to: to.into(),
        });
        self
    }

    pub fn action(mut self, action: NodeAction) -> Self {
        self.action = Some(action);
        self
    }

    /// All node ids this node can route to.
    pub fn successors(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .map(|r| r.to.as_str())
            .chain(self.next_nodes.iter().map(|s| s.as_str()))
    }
}

fn default_max_retries() -> u32 {
    3
}

/// A complete voice conversation flow. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub entry_node: String,
    pub nodes: Vec<FlowNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_node: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Flow {
    pub fn new(id: impl Into<String>, name: impl Into<String>, entry_node: impl Into<String>) -> Self {
        Flow {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            entry_node: entry_node.into(),
            nodes: Vec::new(),
            fallback_node: None,
            max_retries: default_max_retries(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn fallback(mut self, node_id: impl Into<String>) -> Self {
        self.fallback_node = Some(node_id.into());
        self
    }

    pub fn node(mut self, node: FlowNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Look up a node by id.
    pub fn get(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Render `{variable}` placeholders in a prompt template from collected data.
/// Unknown placeholders are left untouched.
pub fn render_template(
    template: &str,
    vars: &std::collections::HashMap<String, serde_json::Value>,
) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        let needle = format!("{{{}}}", key);
        if out.contains(&needle) {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&needle, &rendered);
        }
    }
    out
}
