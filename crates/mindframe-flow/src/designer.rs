//! Flow authoring helpers: AI generation, import/export, optimization hints.

use crate::bridge::{ChatBackend, ChatOptions};
use crate::error::{FlowError, FlowResult};
use crate::fallback::or_fallback;
use crate::model::{Flow, FlowNode, NodeAction, NodeType};
use crate::prompts;
use crate::validator::validate;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Builds flows from natural-language descriptions via the model bridge.
/// Generated flows are validated before being returned; anything invalid
/// degrades to a minimal greeting/end fallback flow.
pub struct FlowDesigner {
    backend: Arc<dyn ChatBackend>,
    timeout: Duration,
}

impl FlowDesigner {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        FlowDesigner {
            backend,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate a flow for the described use case. Never fails: model errors,
    /// unparseable JSON, and invalid graphs all fall back to a minimal flow.
    pub async fn generate_flow(&self, description: &str, goal: &str) -> Flow {
        let flow = or_fallback(
            "flow generation",
            self.timeout,
            self.try_generate(description, goal),
            fallback_flow(),
        )
        .await;
        info!("🧩 flow ready: '{}' ({} nodes)", flow.name, flow.nodes.len());
        flow
    }

    async fn try_generate(&self, description: &str, goal: &str) -> FlowResult<Flow> {
        let prompt = prompts::flow_design_prompt(description, goal);
        let raw = self
            .backend
            .complete(prompts::DESIGNER_SYSTEM, &prompt, ChatOptions::json(0.4))
            .await?;
        let mut flow = import_json(&raw)?;
        if flow.id.is_empty() {
            flow.id = format!("flow-{}", Uuid::new_v4());
        }
        let result = validate(&flow);
        if !result.valid {
            warn!("generated flow '{}' rejected: {:?}", flow.name, result.errors);
            return Err(FlowError::InvalidFlow(result.errors.join("; ")));
        }
        Ok(flow)
    }
}

/// Minimal greeting/end flow used when generation fails.
pub fn fallback_flow() -> Flow {
    Flow::new("fallback", "Basic Flow", "greeting")
        .description("Fallback flow")
        .node(
            FlowNode::new("greeting", NodeType::Greeting)
                .prompt("Hello! How can I help you today?")
                .then("end"),
        )
        .node(FlowNode::new("end", NodeType::End).prompt("Thank you for calling. Goodbye!"))
}

/// Serialize a flow to pretty JSON.
pub fn export_json(flow: &Flow) -> FlowResult<String> {
    serde_json::to_string_pretty(flow).map_err(|e| FlowError::Parse(e.to_string()))
}

/// Parse a flow from JSON. Tolerates markdown fences around the object.
/// Condition strings are validated during deserialization.
pub fn import_json(raw: &str) -> FlowResult<Flow> {
    let start = raw
        .find('{')
        .ok_or_else(|| FlowError::Parse("no JSON object in flow data".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| FlowError::Parse("no JSON object in flow data".to_string()))?;
    if end < start {
        return Err(FlowError::Parse("malformed flow data".to_string()));
    }
    serde_json::from_str(&raw[start..=end]).map_err(|e| FlowError::Parse(format!("flow JSON: {}", e)))
}

/// Render a flow as a Mermaid flowchart. Condition edges carry their
/// predicate as the edge label.
pub fn export_mermaid(flow: &Flow) -> String {
    let mut lines = vec!["graph TD".to_string()];
    for node in &flow.nodes {
        lines.push(format!(
            "    {id}[\"{icon} {id}\"]",
            icon = node.node_type.icon(),
            id = node.id
        ));
        for route in &node.conditions {
            lines.push(format!("    {} -->|{}| {}", node.id, route.when, route.to));
        }
        for next in &node.next_nodes {
            lines.push(format!("    {} --> {}", node.id, next));
        }
    }
    lines.join("\n")
}

/// Heuristic improvement suggestions for a flow.
pub fn optimize(flow: &Flow) -> Vec<String> {
    let mut suggestions = Vec::new();

    // Questions collecting the same variable twice waste caller time.
    let mut seen: HashSet<&str> = HashSet::new();
    for node in &flow.nodes {
        if node.node_type != NodeType::Question {
            continue;
        }
        if let Some(var) = node.variable_to_collect.as_deref() {
            if !seen.insert(var) {
                suggestions.push(format!(
                    "multiple questions collect '{}'; remove the duplicate",
                    var
                ));
            }
        }
    }

    // API calls with a single unconditional edge have no failure path.
    for node in &flow.nodes {
        if matches!(node.action, Some(NodeAction::Api { .. })) && node.conditions.is_empty() {
            suggestions.push(format!(
                "api_call node '{}' has no failure edge; add error handling",
                node.id
            ));
        }
    }

    // Simple identity questions should come first.
    let questions: Vec<&FlowNode> = flow
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Question)
        .collect();
    if questions.len() >= 2 {
        let first_collects_identity = questions[0]
            .variable_to_collect
            .as_deref()
            .map(|v| v.contains("name") || v.contains("email") || v.contains("account"))
            .unwrap_or(false);
        if !first_collects_identity {
            suggestions.push(
                "consider asking simple questions (name, contact) before detailed ones".to_string(),
            );
        }
    }

    // Long flows with no acknowledgment messages feel robotic.
    if flow.nodes.len() > 5 && !flow.nodes.iter().any(|n| n.node_type == NodeType::Message) {
        suggestions.push(
            "add acknowledgment messages to keep the caller engaged during long flows".to_string(),
        );
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ScriptedChat;
    use crate::catalog::TemplateCatalog;

    #[test]
    fn fallback_flow_is_valid() {
        let result = validate(&fallback_flow());
        assert!(result.valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn json_roundtrip_preserves_the_graph() {
        let catalog = TemplateCatalog::new();
        let flow = &catalog.get("support_triage").unwrap().flow;
        let json = export_json(flow).unwrap();
        let back = import_json(&json).unwrap();
        assert_eq!(back.id, flow.id);
        assert_eq!(back.nodes.len(), flow.nodes.len());
        assert_eq!(back.entry_node, flow.entry_node);
    }

    #[test]
    fn import_rejects_malformed_conditions() {
        let raw = r#"{
            "id": "bad", "name": "Bad", "entry_node": "a",
            "nodes": [{
                "id": "a", "type": "decision",
                "conditions": [{"when": "team_size >= 10", "to": "b"}],
                "next_nodes": ["b"]
            }, {"id": "b", "type": "end", "prompt": "bye"}]
        }"#;
        assert!(matches!(import_json(raw), Err(FlowError::Parse(_))));
    }

    #[test]
    fn mermaid_export_lists_nodes_and_edges() {
        let catalog = TemplateCatalog::new();
        let flow = &catalog.get("appointment_booking").unwrap().flow;
        let mermaid = export_mermaid(flow);
        assert!(mermaid.starts_with("graph TD"));
        assert!(mermaid.contains("greeting --> collect_name"));
        assert!(mermaid.contains("confirm -->|intent:yes| book_appointment"));
    }

    #[test]
    fn optimize_flags_duplicate_variables() {
        let flow = Flow::new("dup", "Dup", "greeting")
            .node(FlowNode::new("greeting", NodeType::Greeting).prompt("Hi").then("q1"))
            .node(
                FlowNode::new("q1", NodeType::Question)
                    .prompt("Name?")
                    .collect("name")
                    .then("q2"),
            )
            .node(
                FlowNode::new("q2", NodeType::Question)
                    .prompt("Name again?")
                    .collect("name")
                    .then("end"),
            )
            .node(FlowNode::new("end", NodeType::End).prompt("Bye"));
        let suggestions = optimize(&flow);
        assert!(suggestions.iter().any(|s| s.contains("'name'")));
    }

    #[tokio::test]
    async fn generation_parses_a_valid_model_reply() {
        let reply = export_json(&fallback_flow()).unwrap();
        let designer = FlowDesigner::new(Arc::new(ScriptedChat::from_replies([reply])));
        let flow = designer.generate_flow("basic reception", "greet and close").await;
        assert_eq!(flow.id, "fallback");
        assert_eq!(flow.nodes.len(), 2);
    }

    #[tokio::test]
    async fn generation_degrades_on_garbage() {
        let designer =
            FlowDesigner::new(Arc::new(ScriptedChat::from_replies(["not json at all"])));
        let flow = designer.generate_flow("anything", "anything").await;
        assert_eq!(flow.id, "fallback");
        assert!(validate(&flow).valid);
    }

    #[tokio::test]
    async fn generation_degrades_on_invalid_graph() {
        // Parseable JSON, but the entry node points nowhere.
        let raw = r#"{"id":"x","name":"X","entry_node":"ghost","nodes":[{"id":"end","type":"end","prompt":"bye"}]}"#;
        let designer = FlowDesigner::new(Arc::new(ScriptedChat::from_replies([raw])));
        let flow = designer.generate_flow("anything", "anything").await;
        assert_eq!(flow.id, "fallback");
    }
}
