//! The turn processor: advances a conversation by exactly one turn.
//!
//! Per turn: resolve the caller's context, classify the utterance, route
//! deterministically through the flow graph, generate one reply, merge
//! extracted entities, and advance. At most one classification call and one
//! generation call happen per turn; both run under an explicit timeout and
//! degrade to static fallbacks, so a turn always completes.
//!
//! Routing nodes (`decision`, `intent_check`, `sentiment_check`) and
//! `api_call` nodes are not conversational steps: the engine evaluates or
//! simulates them and hops straight through to the next speakable node within
//! the same turn.

use crate::bridge::{ChatBackend, ChatOptions};
use crate::context::{ContextStore, ConversationContext};
use crate::error::FlowResult;
use crate::fallback::or_fallback;
use crate::intent::Intent;
use crate::model::{render_template, Flow, FlowNode, NodeAction, NodeType};
use crate::prompts;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_REPLY: &str = "I understand. Could you tell me more about that?";
const FALLBACK_CLOSING: &str = "Thank you for your time. Have a great day!";
const STRUCTURAL_ERROR_REPLY: &str =
    "I'm sorry, I'm having trouble processing your request right now. Please call back in a moment.";

/// Engine tuning, loaded from environment.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | MINDFRAME_MODEL_TIMEOUT_SECS | 20 | Per-call model timeout before falling back. |
/// | MINDFRAME_CLASSIFY_TEMPERATURE | 0.3 | Classifier sampling temperature. |
/// | MINDFRAME_RESPOND_TEMPERATURE | 0.7 | Reply/closing sampling temperature. |
/// | MINDFRAME_CONTEXT_TTL_SECS | 900 | Idle lifetime of an abandoned conversation. |
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_timeout: Duration,
    pub classify_temperature: f32,
    pub respond_temperature: f32,
    pub max_idle: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            model_timeout: Duration::from_secs(20),
            classify_temperature: 0.3,
            respond_temperature: 0.7,
            max_idle: Duration::from_secs(900),
        }
    }
}

impl EngineConfig {
    /// Load tuning from environment. Unset or invalid => defaults.
    pub fn from_env() -> Self {
        EngineConfig {
            model_timeout: Duration::from_secs(env_u64("MINDFRAME_MODEL_TIMEOUT_SECS", 20)),
            classify_temperature: env_f32("MINDFRAME_CLASSIFY_TEMPERATURE", 0.3),
            respond_temperature: env_f32("MINDFRAME_RESPOND_TEMPERATURE", 0.7),
            max_idle: Duration::from_secs(env_u64("MINDFRAME_CONTEXT_TTL_SECS", 900)),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// What the transport layer speaks and acts on after one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    /// Reply text to speak to the caller.
    pub text: String,
    /// Node the conversation landed on, if any.
    pub next_node: Option<String>,
    /// True iff the landing node is terminal (end/transfer) or a structural
    /// failure ended the call.
    pub end_conversation: bool,
    /// Transfer target when the landing node is a transfer.
    pub transfer_to: Option<String>,
    /// Snapshot of all variables collected so far.
    pub collected: HashMap<String, serde_json::Value>,
    pub confidence: f32,
    /// The turn's classification, for logging and the test harness.
    pub intent: Intent,
}

impl TurnResponse {
    fn structural_error(collected: HashMap<String, serde_json::Value>) -> Self {
        TurnResponse {
            text: STRUCTURAL_ERROR_REPLY.to_string(),
            next_node: None,
            end_conversation: true,
            transfer_to: None,
            collected,
            confidence: 0.0,
            intent: Intent::fallback(),
        }
    }
}

/// Where routing landed after hopping through non-conversational nodes.
enum Destination<'a> {
    Node(&'a FlowNode),
    /// No successor anywhere: close the conversation gracefully.
    Exhausted,
}

/// Drives conversations through flows. One engine serves many concurrent
/// conversations; per-conversation state lives in the [`ContextStore`].
pub struct FlowEngine {
    backend: Arc<dyn ChatBackend>,
    store: ContextStore,
    config: EngineConfig,
}

impl FlowEngine {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self::with_config(backend, EngineConfig::default())
    }

    pub fn with_config(backend: Arc<dyn ChatBackend>, config: EngineConfig) -> Self {
        FlowEngine {
            backend,
            store: ContextStore::new(),
            config,
        }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Advance `conversation_id` by one turn of `utterance` against `flow`.
    ///
    /// Always returns a response: model failures degrade to neutral fallbacks,
    /// structural failures (unknown node ids) produce a terminal error reply.
    pub async fn process_turn(
        &self,
        conversation_id: &str,
        utterance: &str,
        flow: &Flow,
    ) -> TurnResponse {
        let handle = self.store.get_or_create(conversation_id, &flow.entry_node);
        let mut ctx = handle.lock().await;
        ctx.turns += 1;
        ctx.touch();

        let Some(current) = flow.get(&ctx.current_node) else {
            warn!(
                "⛔ node '{}' not found in flow '{}'; ending conversation {}",
                ctx.current_node, flow.id, conversation_id
            );
            let collected = ctx.collected.clone();
            drop(ctx);
            self.store.remove(conversation_id);
            return TurnResponse::structural_error(collected);
        };

        let prompt = prompts::classification_prompt(utterance, &ctx, current);
        let intent = or_fallback(
            "intent classification",
            self.config.model_timeout,
            self.classify(&prompt),
            Intent::fallback(),
        )
        .await;
        ctx.record_intent(&intent);

        // Merge extracted entities; for the variable this question collects,
        // fall back to the raw utterance so degraded turns still make progress.
        for (key, value) in &intent.entities {
            if !is_blank_entity(value) {
                ctx.collected.insert(key.clone(), value.clone());
            }
        }
        if let Some(var) = &current.variable_to_collect {
            if !ctx.collected.contains_key(var) && !utterance.trim().is_empty() {
                ctx.collected.insert(
                    var.clone(),
                    serde_json::Value::String(utterance.trim().to_string()),
                );
            }
        }

        let destination = match resolve_destination(flow, current, &intent) {
            Ok(dest) => dest,
            Err(reason) => {
                warn!(
                    "⛔ routing failed in flow '{}' ({}); ending conversation {}",
                    flow.id, reason, conversation_id
                );
                let collected = ctx.collected.clone();
                drop(ctx);
                self.store.remove(conversation_id);
                return TurnResponse::structural_error(collected);
            }
        };

        let response = match destination {
            Destination::Exhausted => TurnResponse {
                text: self.closing_text(&ctx, &intent).await,
                next_node: None,
                end_conversation: true,
                transfer_to: None,
                collected: ctx.collected.clone(),
                confidence: intent.confidence,
                intent: intent.clone(),
            },
            Destination::Node(next) => match next.node_type {
                NodeType::End => {
                    let text = match &next.prompt {
                        Some(p) => render_template(p, &ctx.collected),
                        None => self.closing_text(&ctx, &intent).await,
                    };
                    ctx.current_node = next.id.clone();
                    TurnResponse {
                        text,
                        next_node: Some(next.id.clone()),
                        end_conversation: true,
                        transfer_to: None,
                        collected: ctx.collected.clone(),
                        confidence: intent.confidence,
                        intent: intent.clone(),
                    }
                }
                NodeType::Transfer => {
                    let target = match &next.action {
                        Some(NodeAction::Transfer { target }) => Some(target.clone()),
                        _ => None,
                    };
                    let text = next
                        .prompt
                        .clone()
                        .unwrap_or_else(|| "Let me transfer you to the right person.".to_string());
                    ctx.current_node = next.id.clone();
                    TurnResponse {
                        text: render_template(&text, &ctx.collected),
                        next_node: Some(next.id.clone()),
                        end_conversation: true,
                        transfer_to: target,
                        collected: ctx.collected.clone(),
                        confidence: intent.confidence,
                        intent: intent.clone(),
                    }
                }
                _ => {
                    let prompt = prompts::response_prompt(utterance, &intent, &ctx, current, next);
                    let text = or_fallback(
                        "response generation",
                        self.config.model_timeout,
                        self.generate(prompts::RESPONDER_SYSTEM, &prompt),
                        DEFAULT_REPLY.to_string(),
                    )
                    .await;
                    ctx.current_node = next.id.clone();
                    TurnResponse {
                        text,
                        next_node: Some(next.id.clone()),
                        end_conversation: false,
                        transfer_to: None,
                        collected: ctx.collected.clone(),
                        confidence: intent.confidence,
                        intent: intent.clone(),
                    }
                }
            },
        };

        if response.end_conversation {
            info!(
                "✅ conversation ended: {} ({} turns, {} variables collected)",
                conversation_id,
                ctx.turns,
                ctx.collected.len()
            );
            drop(ctx);
            self.store.remove(conversation_id);
        }

        response
    }

    async fn classify(&self, prompt: &str) -> FlowResult<Intent> {
        let raw = self
            .backend
            .complete(
                prompts::CLASSIFIER_SYSTEM,
                prompt,
                ChatOptions::json(self.config.classify_temperature),
            )
            .await?;
        Intent::from_model_json(&raw)
    }

    async fn generate(&self, system: &str, prompt: &str) -> FlowResult<String> {
        let raw = self
            .backend
            .complete(
                system,
                prompt,
                ChatOptions::text(self.config.respond_temperature),
            )
            .await?;
        Ok(raw.trim().to_string())
    }

    async fn closing_text(&self, ctx: &ConversationContext, intent: &Intent) -> String {
        let prompt = prompts::closing_prompt(ctx, intent);
        or_fallback(
            "closing generation",
            self.config.model_timeout,
            self.generate(prompts::CLOSER_SYSTEM, &prompt),
            FALLBACK_CLOSING.to_string(),
        )
        .await
    }
}

/// First matching condition wins; then the first listed successor; then the
/// flow-level fallback node.
fn route_next<'a>(node: &'a FlowNode, intent: &Intent, flow: &'a Flow) -> Option<&'a str> {
    for route in &node.conditions {
        if route.when.matches(intent) {
            return Some(route.to.as_str());
        }
    }
    if let Some(first) = node.next_nodes.first() {
        return Some(first.as_str());
    }
    flow.fallback_node.as_deref()
}

/// Follow edges from `current`, hopping through routing and api_call nodes,
/// until a speakable node (or nothing) is reached.
fn resolve_destination<'a>(
    flow: &'a Flow,
    current: &'a FlowNode,
    intent: &Intent,
) -> Result<Destination<'a>, String> {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(current.id.as_str());
    let mut node = current;

    loop {
        let Some(next_id) = route_next(node, intent, flow) else {
            return Ok(Destination::Exhausted);
        };
        let Some(next) = flow.get(next_id) else {
            return Err(format!("target node '{}' does not exist", next_id));
        };

        if next.node_type.is_routing() {
            if !visited.insert(next.id.as_str()) {
                return Err(format!("routing cycle at node '{}'", next.id));
            }
            node = next;
            continue;
        }
        if next.node_type == NodeType::ApiCall {
            if !visited.insert(next.id.as_str()) {
                return Err(format!("routing cycle at node '{}'", next.id));
            }
            if let Some(NodeAction::Api { endpoint, method, .. }) = &next.action {
                info!("🔌 simulated api call at node '{}': {} {}", next.id, method, endpoint);
            }
            node = next;
            continue;
        }
        return Ok(Destination::Node(next));
    }
}

fn is_blank_entity(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => {
            let t = s.trim();
            t.is_empty() || t.eq_ignore_ascii_case("null") || t.eq_ignore_ascii_case("none")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ScriptedChat;
    use crate::intent::{Sentiment, Urgency};
    use crate::model::Condition;

    fn intent_json(label: &str, sentiment: &str, urgency: &str, entities: serde_json::Value) -> String {
        serde_json::json!({
            "intent": label,
            "confidence": 0.9,
            "entities": entities,
            "sentiment": sentiment,
            "urgency": urgency,
            "next_action": "continue"
        })
        .to_string()
    }

    fn greeting_end_flow() -> Flow {
        Flow::new("mini", "Mini", "greeting")
            .node(
                FlowNode::new("greeting", NodeType::Greeting)
                    .prompt("Hello!")
                    .then("end"),
            )
            .node(FlowNode::new("end", NodeType::End).prompt("Goodbye, {name}!"))
    }

    #[tokio::test]
    async fn ends_exactly_on_terminal_nodes() {
        let backend = Arc::new(ScriptedChat::from_replies([intent_json(
            "goodbye",
            "positive",
            "low",
            serde_json::json!({"name": "Ada"}),
        )]));
        let engine = FlowEngine::new(backend);
        let flow = greeting_end_flow();

        let response = engine.process_turn("call-1", "bye then", &flow).await;
        assert!(response.end_conversation);
        assert_eq!(response.next_node.as_deref(), Some("end"));
        // end node prompt renders from collected entities, no generation call
        assert_eq!(response.text, "Goodbye, Ada!");
        assert!(!engine.store().contains("call-1"));
    }

    #[tokio::test]
    async fn mid_flow_turns_do_not_end() {
        let flow = Flow::new("three", "Three", "greeting")
            .node(
                FlowNode::new("greeting", NodeType::Greeting)
                    .prompt("Hi!")
                    .then("ask_name"),
            )
            .node(
                FlowNode::new("ask_name", NodeType::Question)
                    .prompt("What's your name?")
                    .collect("name")
                    .then("end"),
            )
            .node(FlowNode::new("end", NodeType::End).prompt("Bye"));
        let backend = Arc::new(ScriptedChat::from_replies([
            intent_json("inquire", "neutral", "low", serde_json::json!({})),
            "Happy to help! What's your name?".to_string(),
        ]));
        let engine = FlowEngine::new(backend);

        let response = engine.process_turn("call-2", "hi there", &flow).await;
        assert!(!response.end_conversation);
        assert_eq!(response.next_node.as_deref(), Some("ask_name"));
        assert_eq!(response.text, "Happy to help! What's your name?");
        assert!(engine.store().contains("call-2"));
    }

    #[tokio::test]
    async fn routing_nodes_are_hopped_in_the_same_turn() {
        let flow = Flow::new("triage", "Triage", "ask")
            .node(
                FlowNode::new("ask", NodeType::Question)
                    .prompt("What's wrong?")
                    .collect("issue")
                    .then("route"),
            )
            .node(
                FlowNode::new("route", NodeType::Decision)
                    .when(Condition::UrgencyIs(Urgency::Critical), "transfer")
                    .then("end"),
            )
            .node(
                FlowNode::new("transfer", NodeType::Transfer)
                    .prompt("Connecting you to our priority team.")
                    .action(NodeAction::Transfer {
                        target: "urgent_line".to_string(),
                    }),
            )
            .node(FlowNode::new("end", NodeType::End).prompt("Bye"));

        let backend = Arc::new(ScriptedChat::from_replies([intent_json(
            "complain",
            "negative",
            "critical",
            serde_json::json!({}),
        )]));
        let engine = FlowEngine::new(backend);

        let response = engine.process_turn("call-3", "everything is on fire", &flow).await;
        assert!(response.end_conversation);
        assert_eq!(response.next_node.as_deref(), Some("transfer"));
        assert_eq!(response.transfer_to.as_deref(), Some("urgent_line"));
    }

    #[tokio::test]
    async fn missing_node_is_a_terminal_error_response() {
        let flow = Flow::new("broken", "Broken", "ghost")
            .node(FlowNode::new("end", NodeType::End).prompt("Bye"));
        let engine = FlowEngine::new(Arc::new(ScriptedChat::new()));

        let response = engine.process_turn("call-4", "hello?", &flow).await;
        assert!(response.end_conversation);
        assert!(response.next_node.is_none());
        assert_eq!(response.confidence, 0.0);
        assert!(!engine.store().contains("call-4"));
    }

    #[tokio::test]
    async fn degraded_backend_still_completes_the_turn() {
        let flow = Flow::new("q", "Q", "ask_name")
            .node(
                FlowNode::new("ask_name", NodeType::Question)
                    .prompt("Name?")
                    .collect("name")
                    .then("end"),
            )
            .node(FlowNode::new("end", NodeType::End).prompt("Bye"));
        // Empty script: every model call errors and falls back.
        let engine = FlowEngine::new(Arc::new(ScriptedChat::new()));

        let response = engine.process_turn("call-5", "John Doe", &flow).await;
        assert!(!response.end_conversation);
        assert_eq!(response.text, DEFAULT_REPLY);
        assert_eq!(response.intent.sentiment, Sentiment::Neutral);
        // raw utterance captured for the question's variable
        assert_eq!(response.collected["name"], serde_json::json!("John Doe"));
    }

    #[tokio::test]
    async fn blank_entities_are_not_merged() {
        let flow = Flow::new("q", "Q", "ask_name")
            .node(
                FlowNode::new("ask_name", NodeType::Question)
                    .prompt("Name?")
                    .collect("name")
                    .then("end"),
            )
            .node(FlowNode::new("end", NodeType::End).prompt("Bye"));
        let backend = Arc::new(ScriptedChat::from_replies([
            intent_json(
                "provide_info",
                "neutral",
                "low",
                serde_json::json!({"name": "John Doe", "date": "null", "product": ""}),
            ),
            "Thanks John!".to_string(),
        ]));
        let engine = FlowEngine::new(backend);

        let response = engine.process_turn("call-6", "I'm John Doe", &flow).await;
        assert_eq!(response.collected["name"], serde_json::json!("John Doe"));
        assert!(!response.collected.contains_key("date"));
        assert!(!response.collected.contains_key("product"));
    }

    #[test]
    fn config_defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.model_timeout, Duration::from_secs(20));
        assert!(config.classify_temperature < config.respond_temperature);
    }
}
