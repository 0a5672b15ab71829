//! Scenario replay harness.
//!
//! Replays scripted utterance sequences through a [`FlowEngine`] and checks
//! detected intents, collected variables, and the conversation outcome.
//! Paired with [`ScriptedChat`](crate::bridge::ScriptedChat) the replay is
//! fully deterministic; against a live backend it measures real behavior.

use crate::engine::FlowEngine;
use crate::model::Flow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

fn default_max_turns() -> usize {
    20
}

/// How a scenario is expected to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Completed,
    Transferred,
    Failed,
}

/// One scripted conversation with its expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// What the caller says at each turn.
    pub user_inputs: Vec<String>,
    /// Expected intent labels, by turn. Extra turns are unchecked.
    #[serde(default)]
    pub expected_intents: Vec<String>,
    /// Variables that must be collected by the end, with expected values.
    /// A JSON `null` expectation means "present with any value".
    #[serde(default)]
    pub expected_variables: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub expected_outcome: Outcome,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

/// One replayed turn, for debugging failed scenarios.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub turn: usize,
    pub user: String,
    pub reply: String,
    pub intent: String,
    pub node: Option<String>,
    pub ended: bool,
}

/// Result of replaying one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub passed: bool,
    pub turns: usize,
    pub outcome: Outcome,
    pub intents_matched: usize,
    pub intents_total: usize,
    pub variables_matched: usize,
    pub variables_total: usize,
    pub errors: Vec<String>,
    pub transcript: Vec<TranscriptEntry>,
}

/// Aggregate over a suite of scenarios.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub recommendations: Vec<String>,
    pub results: Vec<ScenarioResult>,
}

/// Replay one scenario against `flow`. Each run uses a fresh conversation id
/// so scenarios never share state.
pub async fn run_scenario(engine: &FlowEngine, flow: &Flow, scenario: &Scenario) -> ScenarioResult {
    info!("🧪 running scenario: {}", scenario.name);
    let conversation_id = format!("scenario-{}-{}", scenario.id, Uuid::new_v4());

    let mut transcript = Vec::new();
    let mut collected = HashMap::new();
    let mut intents_matched = 0;
    let mut ended = false;
    let mut transferred = false;

    for (i, input) in scenario
        .user_inputs
        .iter()
        .take(scenario.max_turns)
        .enumerate()
    {
        let response = engine.process_turn(&conversation_id, input, flow).await;

        if let Some(expected) = scenario.expected_intents.get(i) {
            if response.intent.label.eq_ignore_ascii_case(expected) {
                intents_matched += 1;
            }
        }
        transcript.push(TranscriptEntry {
            turn: i + 1,
            user: input.clone(),
            reply: response.text.clone(),
            intent: response.intent.label.clone(),
            node: response.next_node.clone(),
            ended: response.end_conversation,
        });
        collected = response.collected;
        if response.transfer_to.is_some() {
            transferred = true;
        }
        if response.end_conversation {
            ended = true;
            break;
        }
    }

    let outcome = if transferred {
        Outcome::Transferred
    } else if ended {
        Outcome::Completed
    } else {
        Outcome::Failed
    };

    let mut errors = Vec::new();
    if outcome != scenario.expected_outcome {
        errors.push(format!(
            "expected outcome {:?}, got {:?}",
            scenario.expected_outcome, outcome
        ));
    }

    let mut variables_matched = 0;
    for (key, expected) in &scenario.expected_variables {
        match collected.get(key) {
            Some(actual) if expected.is_null() || actual == expected => variables_matched += 1,
            Some(actual) => errors.push(format!(
                "variable '{}': expected {}, got {}",
                key, expected, actual
            )),
            None => errors.push(format!("variable '{}' was not collected", key)),
        }
    }

    let intents_total = scenario
        .expected_intents
        .len()
        .min(scenario.user_inputs.len());
    if intents_matched < intents_total {
        errors.push(format!(
            "only {}/{} expected intents matched",
            intents_matched, intents_total
        ));
    }

    let passed = errors.is_empty();
    ScenarioResult {
        scenario_id: scenario.id.clone(),
        passed,
        turns: transcript.len(),
        outcome,
        intents_matched,
        intents_total,
        variables_matched,
        variables_total: scenario.expected_variables.len(),
        errors,
        transcript,
    }
}

/// Replay a suite of scenarios and aggregate a report.
pub async fn run_suite(
    engine: &FlowEngine,
    flow: &Flow,
    scenarios: &[Scenario],
) -> ScenarioReport {
    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        results.push(run_scenario(engine, flow, scenario).await);
    }

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();
    let pass_rate = if total == 0 {
        1.0
    } else {
        passed as f32 / total as f32
    };

    let mut recommendations = Vec::new();
    for result in results.iter().filter(|r| !r.passed) {
        recommendations.push(format!(
            "scenario '{}' failed: {}",
            result.scenario_id,
            result.errors.join("; ")
        ));
    }
    let intents_expected: usize = results.iter().map(|r| r.intents_total).sum();
    let intents_hit: usize = results.iter().map(|r| r.intents_matched).sum();
    if intents_expected > 0 && (intents_hit as f32 / intents_expected as f32) < 0.8 {
        recommendations.push(
            "intent accuracy below 80%; review the classifier prompt or condition labels"
                .to_string(),
        );
    }

    ScenarioReport {
        total,
        passed,
        failed: total - passed,
        pass_rate,
        recommendations,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_deserializes_with_defaults() {
        let raw = r#"{
            "id": "s1",
            "name": "Smoke",
            "user_inputs": ["hello"],
            "expected_variables": {"name": null}
        }"#;
        let scenario: Scenario = serde_json::from_str(raw).unwrap();
        assert_eq!(scenario.expected_outcome, Outcome::Completed);
        assert_eq!(scenario.max_turns, 20);
        assert!(scenario.expected_intents.is_empty());
    }
}
