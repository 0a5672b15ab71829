//! Prompt templates for the voice engine's model calls.

use crate::context::ConversationContext;
use crate::intent::Intent;
use crate::model::FlowNode;

pub const CLASSIFIER_SYSTEM: &str =
    "You are Mindframe Voice AI, an expert at understanding human conversation intent and emotion.";

pub const RESPONDER_SYSTEM: &str = "You are Mindframe Voice AI. Generate natural, empathetic phone conversation responses. Be concise and professional.";

pub const CLOSER_SYSTEM: &str =
    "You are Mindframe Voice AI. Generate warm, professional conversation closings.";

pub const DESIGNER_SYSTEM: &str =
    "You are Mindframe Voice AI. Generate efficient, professional conversation flows.";

fn sentiment_window(ctx: &ConversationContext) -> String {
    let recent = ctx.recent_sentiments(3);
    if recent.is_empty() {
        "none".to_string()
    } else {
        recent
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn collected_json(ctx: &ConversationContext) -> String {
    serde_json::to_string(&ctx.collected).unwrap_or_else(|_| "{}".to_string())
}

/// Prompt for the per-turn intent classifier. Strict JSON contract.
pub fn classification_prompt(
    utterance: &str,
    ctx: &ConversationContext,
    current: &FlowNode,
) -> String {
    format!(
        r#"Analyze this user's speech in a phone conversation:

User said: "{utterance}"

Current conversation context:
- Step: {step}
- Turn: {turn}
- Previous sentiment: {sentiments}
- Collected data so far: {collected}
- Current question: {question}

Analyze and return JSON:
{{
    "intent": "What the user is trying to do (schedule, complain, inquire, confirm, cancel, etc.)",
    "confidence": 0.0-1.0,
    "entities": {{"name": "...", "date": "...", "time": "...", "product": "...", "issue": "...", "any_other_relevant_entity": "..."}},
    "sentiment": "positive|negative|neutral",
    "urgency": "low|medium|high|critical",
    "next_action": "What agent should do next (collect_info, confirm, transfer, resolve, schedule, etc.)"
}}

Omit entities that were not mentioned. Be accurate and practical."#,
        utterance = utterance,
        step = ctx.current_node,
        turn = ctx.turns,
        sentiments = sentiment_window(ctx),
        collected = collected_json(ctx),
        question = current.prompt.as_deref().unwrap_or("none"),
    )
}

/// Prompt for the reply generator: acknowledges the utterance and steers
/// toward the next node's goal in 1-2 sentences.
pub fn response_prompt(
    utterance: &str,
    intent: &Intent,
    ctx: &ConversationContext,
    current: &FlowNode,
    next: &FlowNode,
) -> String {
    let goal = next
        .variable_to_collect
        .as_deref()
        .unwrap_or("move the conversation forward");
    format!(
        r#"Generate a natural, professional phone conversation response:

User just said: "{utterance}"
Intent: {intent}
Sentiment: {sentiment}
Urgency: {urgency}

Current step: {current_type}
Template prompt: {template}
Goal: {goal}

Conversation context:
- Turns so far: {turns}
- Collected data: {collected}
- Sentiment history: {sentiments}

Generate a response that:
1. Acknowledges what the user said (if appropriate)
2. Addresses their emotion ({sentiment})
3. Moves toward the goal: {goal}
4. Sounds natural and human
5. Is concise (1-2 sentences max)

Return ONLY the response text, nothing else."#,
        utterance = utterance,
        intent = intent.label,
        sentiment = intent.sentiment,
        urgency = intent.urgency,
        current_type = current.node_type,
        template = next.prompt.as_deref().unwrap_or("Continue conversation"),
        goal = goal,
        turns = ctx.turns,
        collected = collected_json(ctx),
        sentiments = sentiment_window(ctx),
    )
}

/// Prompt for a personalized conversation closing.
pub fn closing_prompt(ctx: &ConversationContext, intent: &Intent) -> String {
    format!(
        r#"Generate a professional, warm closing for a phone conversation:

Conversation summary:
- Turns: {turns}
- Final sentiment: {sentiment}
- Collected data: {collected}
- User intent: {intent}

Generate a closing that:
1. Summarizes what was accomplished
2. Thanks the user
3. Offers next steps if appropriate
4. Is warm and professional

Return ONLY the closing statement, 2-3 sentences max."#,
        turns = ctx.turns,
        sentiment = intent.sentiment,
        collected = collected_json(ctx),
        intent = intent.label,
    )
}

/// Prompt for generating a complete flow from a natural-language description.
pub fn flow_design_prompt(description: &str, goal: &str) -> String {
    format!(
        r#"Create a voice conversation flow for this use case:

Description: {description}
Goal: {goal}

Generate a complete voice flow in JSON format:
{{
    "id": "unique_id",
    "name": "Flow name",
    "description": "What this flow does",
    "entry_node": "greeting",
    "nodes": [
        {{"id": "greeting", "type": "greeting", "prompt": "What to say at start", "next_nodes": ["collect_name"]}},
        {{"id": "collect_name", "type": "question", "prompt": "Ask for their name", "variable_to_collect": "name", "next_nodes": ["end"]}},
        {{"id": "end", "type": "end", "prompt": "Thank you closing"}}
    ]
}}

Node types: greeting, question, decision, api_call, transfer, message, end, wait, intent_check, sentiment_check.
Conditions, when used, map predicates to node ids, e.g. {{"when": "intent:yes", "to": "book"}} inside a "conditions" array.
Make it natural, efficient, and professional.
Include all necessary steps to achieve the goal."#,
        description = description,
        goal = goal,
    )
}
