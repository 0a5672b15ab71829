//! Static flow validation.
//!
//! Checks a candidate flow before it is allowed to drive a live call. Errors
//! block deployment; warnings and suggestions are advisory. Validation never
//! panics and never returns `Err` — a malformed or empty flow yields an
//! invalid result with explanatory errors.

use crate::model::{Flow, NodeAction, NodeType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// `{placeholder}` references inside prompt templates.
static PLACEHOLDER_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").ok());

/// Outcome of [`validate`]. `valid` is true iff `errors` is empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Statically check a flow. See module docs for the error/warning split.
pub fn validate(flow: &Flow) -> FlowValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    if flow.nodes.is_empty() {
        errors.push("flow has no nodes; a greeting entry node is required".to_string());
        return FlowValidation {
            valid: false,
            errors,
            warnings,
            suggestions,
        };
    }

    let node_ids: HashSet<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();

    // Duplicate ids make routing ambiguous.
    if node_ids.len() != flow.nodes.len() {
        let mut seen = HashSet::new();
        for node in &flow.nodes {
            if !seen.insert(node.id.as_str()) {
                errors.push(format!("duplicate node id '{}'", node.id));
            }
        }
    }

    if flow.entry_node.is_empty() {
        errors.push("flow has no entry node".to_string());
    } else if !node_ids.contains(flow.entry_node.as_str()) {
        errors.push(format!("entry node '{}' not found", flow.entry_node));
    }

    if let Some(fallback) = &flow.fallback_node {
        if !node_ids.contains(fallback.as_str()) {
            errors.push(format!("fallback node '{}' not found", fallback));
        }
    }

    if !flow.nodes.iter().any(|n| n.node_type.is_terminal()) {
        errors.push("flow must have at least one end or transfer node".to_string());
    }

    for node in &flow.nodes {
        // Every non-terminal node needs at least one way out.
        if !node.node_type.is_terminal() && node.successors().next().is_none() {
            errors.push(format!("node '{}' has no outgoing connections", node.id));
        }

        // Every referenced target must resolve.
        for target in node.successors() {
            if !node_ids.contains(target) {
                errors.push(format!(
                    "node '{}' connects to non-existent node '{}'",
                    node.id, target
                ));
            }
        }

        check_required_fields(node, &mut errors, &mut warnings);
    }

    // Forward traversal: unreachable nodes are advisory, never fatal.
    let reachable = reachable_nodes(flow);
    for node in &flow.nodes {
        if !reachable.contains(node.id.as_str()) {
            warnings.push(format!(
                "node '{}' is not reachable from the entry node",
                node.id
            ));
        }
    }

    check_placeholders(flow, &mut warnings);

    if flow.nodes.len() > 20 {
        suggestions
            .push("consider splitting this flow into smaller sub-flows for maintenance".to_string());
    }
    let question_count = flow
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Question)
        .count();
    if question_count > 10 {
        suggestions.push(
            "many questions in one flow; consider progress acknowledgments to keep callers engaged"
                .to_string(),
        );
    }
    if !flow.nodes.iter().any(|n| n.node_type == NodeType::Wait) {
        suggestions
            .push("no wait node present; consider explicit silence/timeout handling".to_string());
    }

    FlowValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
        suggestions,
    }
}

fn check_required_fields(
    node: &crate::model::FlowNode,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    match node.node_type {
        NodeType::Greeting | NodeType::Message => {
            if node.prompt.is_none() {
                errors.push(format!(
                    "{} node '{}' requires a prompt",
                    node.node_type, node.id
                ));
            }
        }
        NodeType::Question => {
            if node.prompt.is_none() {
                errors.push(format!("question node '{}' requires a prompt", node.id));
            }
            if node.variable_to_collect.is_none() {
                errors.push(format!(
                    "question node '{}' requires a variable to collect",
                    node.id
                ));
            }
        }
        NodeType::Decision | NodeType::IntentCheck | NodeType::SentimentCheck => {
            if node.conditions.is_empty() {
                errors.push(format!(
                    "{} node '{}' requires at least one condition",
                    node.node_type, node.id
                ));
            }
        }
        NodeType::ApiCall => {
            if !matches!(node.action, Some(NodeAction::Api { .. })) {
                errors.push(format!(
                    "api_call node '{}' requires an endpoint and method",
                    node.id
                ));
            }
        }
        NodeType::Transfer => {
            if !matches!(node.action, Some(NodeAction::Transfer { .. })) {
                errors.push(format!(
                    "transfer node '{}' requires a transfer target",
                    node.id
                ));
            }
        }
        NodeType::End => {
            if node.prompt.is_none() {
                warnings.push(format!(
                    "end node '{}' has no closing prompt; a generated closing will be used",
                    node.id
                ));
            }
        }
        NodeType::Wait => {
            if node.timeout_secs == 0 {
                errors.push(format!("wait node '{}' requires a positive timeout", node.id));
            }
        }
    }
}

/// Forward traversal from the entry node (and the flow fallback, which is
/// reachable through the fallback path) over successor and condition edges.
fn reachable_nodes(flow: &Flow) -> HashSet<&str> {
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    if flow.get(&flow.entry_node).is_some() {
        queue.push_back(flow.entry_node.as_str());
    }
    if let Some(fallback) = &flow.fallback_node {
        queue.push_back(fallback.as_str());
    }

    while let Some(id) = queue.pop_front() {
        if !reachable.insert(id) {
            continue;
        }
        if let Some(node) = flow.get(id) {
            for target in node.successors() {
                if !reachable.contains(target) {
                    queue.push_back(target);
                }
            }
        }
    }

    reachable
}

/// Warn when a prompt references a `{placeholder}` no question node collects.
fn check_placeholders(flow: &Flow, warnings: &mut Vec<String>) {
    let Some(re) = PLACEHOLDER_RE.as_ref() else {
        return;
    };
    let collected: HashSet<&str> = flow
        .nodes
        .iter()
        .filter_map(|n| n.variable_to_collect.as_deref())
        .collect();

    for node in &flow.nodes {
        let Some(prompt) = &node.prompt else { continue };
        for cap in re.captures_iter(prompt) {
            if let Some(var) = cap.get(1) {
                if !collected.contains(var.as_str()) {
                    warnings.push(format!(
                        "prompt in node '{}' references '{{{}}}' which no question collects",
                        node.id,
                        var.as_str()
                    ));
                }
            }
        }
    }
}
