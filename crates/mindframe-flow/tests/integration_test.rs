//! Integration tests for the flow engine: scripted end-to-end conversations
//! replayed through the scenario harness with a deterministic backend.

use mindframe_flow::{
    run_scenario, validate, FlowEngine, Outcome, Scenario, ScriptedChat, TemplateCatalog,
};
use std::collections::HashMap;
use std::sync::Arc;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

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

/// Scripted backend for the appointment-booking happy path: a classification
/// (and, for non-terminal turns, a generated reply) per turn.
fn appointment_script() -> ScriptedChat {
    ScriptedChat::from_replies([
        intent_json("schedule", "positive", "low", serde_json::json!({})),
        "I'd be happy to help you book an appointment. May I have your name please?".to_string(),
        intent_json(
            "provide_info",
            "neutral",
            "low",
            serde_json::json!({"name": "John Doe"}),
        ),
        "Thanks John! What date works best for you?".to_string(),
        intent_json(
            "provide_info",
            "neutral",
            "low",
            serde_json::json!({"preferred_date": "next Tuesday"}),
        ),
        "Great, next Tuesday it is. What time would you prefer?".to_string(),
        intent_json(
            "provide_info",
            "positive",
            "low",
            serde_json::json!({"preferred_time": "2pm"}),
        ),
        "Perfect! I have John Doe down for next Tuesday at 2pm. Is that correct?".to_string(),
        intent_json(
            "yes",
            "positive",
            "low",
            serde_json::json!({"confirmation": "yes"}),
        ),
        // Turn 5 lands on the end node's static closing: no generation call.
    ])
}

fn appointment_scenario() -> Scenario {
    let mut expected_variables = HashMap::new();
    expected_variables.insert("name".to_string(), serde_json::json!("John Doe"));
    expected_variables.insert("preferred_date".to_string(), serde_json::json!("next Tuesday"));
    expected_variables.insert("preferred_time".to_string(), serde_json::json!("2pm"));
    // present with any value
    expected_variables.insert("confirmation".to_string(), serde_json::Value::Null);

    Scenario {
        id: "book-happy-path".to_string(),
        name: "Appointment booking happy path".to_string(),
        description: "Caller books next Tuesday at 2pm".to_string(),
        user_inputs: vec![
            "Hi, I'd like to book an appointment".to_string(),
            "My name is John Doe".to_string(),
            "Next Tuesday would be great".to_string(),
            "How about 2 PM?".to_string(),
            "Yes, that's perfect".to_string(),
        ],
        expected_intents: vec![
            "schedule".to_string(),
            "provide_info".to_string(),
            "provide_info".to_string(),
            "provide_info".to_string(),
            "yes".to_string(),
        ],
        expected_variables,
        expected_outcome: Outcome::Completed,
        max_turns: 20,
    }
}

#[tokio::test]
async fn appointment_booking_reaches_the_end_node() {
    init_logging();
    let catalog = TemplateCatalog::new();
    let template = catalog.get("appointment_booking").unwrap();
    assert!(validate(&template.flow).valid);

    let engine = FlowEngine::new(Arc::new(appointment_script()));
    let result = run_scenario(&engine, &template.flow, &appointment_scenario()).await;

    assert!(result.passed, "errors: {:?}", result.errors);
    assert_eq!(result.outcome, Outcome::Completed);
    assert_eq!(result.turns, 5);
    assert_eq!(result.variables_matched, 4);
    assert_eq!(result.intents_matched, 5);

    // The confirmation turn routes through book_appointment and lands on end.
    let last = result.transcript.last().unwrap();
    assert!(last.ended);
    assert_eq!(last.node.as_deref(), Some("end"));
    assert!(last.reply.contains("confirmed"));

    // The engine tore the conversation context down at the end.
    assert!(engine.store().is_empty());
}

#[tokio::test]
async fn replaying_the_same_script_yields_the_same_path() {
    init_logging();
    let catalog = TemplateCatalog::new();
    let flow = &catalog.get("appointment_booking").unwrap().flow;
    let scenario = appointment_scenario();

    let first = {
        let engine = FlowEngine::new(Arc::new(appointment_script()));
        run_scenario(&engine, flow, &scenario).await
    };
    let second = {
        let engine = FlowEngine::new(Arc::new(appointment_script()));
        run_scenario(&engine, flow, &scenario).await
    };

    let path = |r: &mindframe_flow::ScenarioResult| {
        r.transcript
            .iter()
            .map(|t| t.node.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(path(&first), path(&second));
    assert_eq!(first.passed, second.passed);
}

#[tokio::test]
async fn frustrated_caller_is_transferred_to_a_senior_agent() {
    init_logging();
    let catalog = TemplateCatalog::new();
    let flow = &catalog.get("support_triage").unwrap().flow;

    let backend = ScriptedChat::from_replies([
        intent_json("complain", "negative", "medium", serde_json::json!({})),
        "I'm sorry to hear that. Can you tell me more about what happened?".to_string(),
        intent_json(
            "complain",
            "negative",
            "medium",
            serde_json::json!({"issue": "data loss"}),
        ),
        // Transfer node speaks its own prompt: no generation call.
    ]);
    let engine = FlowEngine::new(Arc::new(backend));

    let scenario = Scenario {
        id: "triage-frustrated".to_string(),
        name: "Frustrated caller escalation".to_string(),
        description: String::new(),
        user_inputs: vec![
            "My app keeps crashing".to_string(),
            "It deleted all my data and I am furious".to_string(),
        ],
        expected_intents: vec!["complain".to_string(), "complain".to_string()],
        expected_variables: HashMap::new(),
        expected_outcome: Outcome::Transferred,
        max_turns: 20,
    };
    let result = run_scenario(&engine, flow, &scenario).await;

    assert!(result.passed, "errors: {:?}", result.errors);
    assert_eq!(result.outcome, Outcome::Transferred);
    let last = result.transcript.last().unwrap();
    assert_eq!(last.node.as_deref(), Some("transfer_senior"));
}

#[tokio::test]
async fn critical_urgency_outranks_negative_sentiment() {
    init_logging();
    let catalog = TemplateCatalog::new();
    let flow = &catalog.get("support_triage").unwrap().flow;

    let backend = ScriptedChat::from_replies([
        intent_json("complain", "negative", "high", serde_json::json!({})),
        "I'm sorry to hear that. What happened?".to_string(),
        intent_json("complain", "negative", "critical", serde_json::json!({})),
    ]);
    let engine = FlowEngine::new(Arc::new(backend));

    let first = engine
        .process_turn("crit-1", "the production site is down", flow)
        .await;
    assert!(!first.end_conversation);
    let second = engine
        .process_turn("crit-1", "every customer is locked out right now", flow)
        .await;

    // Condition order on the triage node puts urgency:critical first.
    assert_eq!(second.next_node.as_deref(), Some("transfer_immediate"));
    assert_eq!(second.transfer_to.as_deref(), Some("urgent_support_line"));
    assert!(second.end_conversation);
}

#[tokio::test]
async fn fully_degraded_backend_still_books_the_appointment() {
    init_logging();
    let catalog = TemplateCatalog::new();
    let flow = &catalog.get("appointment_booking").unwrap().flow;

    // No scripted replies at all: every model call fails and falls back.
    let engine = FlowEngine::new(Arc::new(ScriptedChat::new()));

    let mut expected_variables = HashMap::new();
    // With a dead classifier, the engine captures raw utterances.
    expected_variables.insert("name".to_string(), serde_json::json!("My name is John Doe"));
    expected_variables.insert("preferred_date".to_string(), serde_json::Value::Null);
    expected_variables.insert("preferred_time".to_string(), serde_json::Value::Null);

    let scenario = Scenario {
        id: "book-degraded".to_string(),
        name: "Appointment booking with a dead model backend".to_string(),
        description: String::new(),
        user_inputs: vec![
            "Hi, I'd like to book an appointment".to_string(),
            "My name is John Doe".to_string(),
            "Next Tuesday would be great".to_string(),
            "How about 2 PM?".to_string(),
            "Yes, that's perfect".to_string(),
        ],
        expected_intents: Vec::new(),
        expected_variables,
        expected_outcome: Outcome::Completed,
        max_turns: 20,
    };
    let result = run_scenario(&engine, flow, &scenario).await;

    assert!(result.passed, "errors: {:?}", result.errors);
    // Fallback intents never match the confirm conditions, so the default
    // successor chain still walks the flow to its end.
    assert_eq!(result.outcome, Outcome::Completed);
    assert!(result.transcript.last().unwrap().ended);
}

#[tokio::test]
async fn distinct_conversations_do_not_share_state() {
    init_logging();
    let catalog = TemplateCatalog::new();
    let flow = &catalog.get("appointment_booking").unwrap().flow;

    let backend = ScriptedChat::from_replies([
        intent_json("schedule", "positive", "low", serde_json::json!({"name": "Ada"})),
        "Hi Ada!".to_string(),
        intent_json("schedule", "neutral", "low", serde_json::json!({"name": "Grace"})),
        "Hi Grace!".to_string(),
    ]);
    let engine = FlowEngine::new(Arc::new(backend));

    let a = engine.process_turn("call-a", "hello", flow).await;
    let b = engine.process_turn("call-b", "hello", flow).await;

    assert_eq!(a.collected["name"], serde_json::json!("Ada"));
    assert_eq!(b.collected["name"], serde_json::json!("Grace"));
    assert_eq!(engine.store().len(), 2);
}
