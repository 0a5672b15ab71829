//! # Mindframe Flow - Voice Conversation Flow Engine
//!
//! This crate drives voice conversations through validated node graphs:
//! per-turn intent classification, deterministic condition routing, and
//! graceful degradation when the model backend fails.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Flow Engine                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │  Utterance   │→ │  Classifier  │→ │   Router     │       │
//! │  │  (transport) │  │ (ChatBackend)│  │ (conditions) │       │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘       │
//! │         ↑                                    ↓               │
//! │  ┌──────────────┐                   ┌──────────────┐        │
//! │  │ TurnResponse │←──────────────────│  Generator   │        │
//! │  │  (speak it)  │     reply text    │ (ChatBackend)│        │
//! │  └──────────────┘                   └──────────────┘        │
//! │                                                              │
//! │  ContextStore: one ConversationContext per live call         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Flows come from the [`catalog`] (hand-authored templates), the
//! [`designer`] (AI generation from a description), or JSON import; all of
//! them pass through the [`validator`] before driving a live call.

pub mod bridge;
pub mod catalog;
pub mod context;
pub mod designer;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod harness;
pub mod intent;
pub mod model;
pub mod prompts;
pub mod validator;

pub use bridge::{create_best_chat, ChatBackend, ChatOptions, OpenRouterChat, ScriptedChat};
pub use catalog::{FlowTemplate, TemplateCatalog};
pub use context::{ContextStore, ConversationContext};
pub use designer::{export_json, export_mermaid, fallback_flow, import_json, optimize, FlowDesigner};
pub use engine::{EngineConfig, FlowEngine, TurnResponse};
pub use error::{FlowError, FlowResult};
pub use fallback::or_fallback;
pub use harness::{run_scenario, run_suite, Outcome, Scenario, ScenarioReport, ScenarioResult};
pub use intent::{Intent, Sentiment, Urgency};
pub use model::{
    render_template, Condition, ConditionRoute, Flow, FlowNode, NodeAction, NodeType,
    ValidationRule,
};
pub use validator::{validate, FlowValidation};
