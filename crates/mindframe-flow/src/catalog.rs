//! Pre-built flow template catalog.
//!
//! A small set of hand-authored flows as static data: retrievable by id,
//! filterable by category. No persistence; the only runtime mutation is an
//! in-memory usage counter.

use crate::intent::{Sentiment, Urgency};
use crate::model::{Condition, Flow, FlowNode, NodeAction, NodeType, ValidationRule};
use dashmap::DashMap;
use serde::Serialize;

/// A catalog entry: the flow plus authoring metadata.
#[derive(Debug, Clone, Serialize)]
pub struct FlowTemplate {
    pub flow: Flow,
    pub category: String,
    pub estimated_duration: String,
    pub use_cases: Vec<String>,
    /// Variables the flow collects, for the deployment UI.
    pub variables: Vec<String>,
}

/// In-memory template catalog.
pub struct TemplateCatalog {
    templates: Vec<FlowTemplate>,
    usage: DashMap<String, u64>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCatalog {
    pub fn new() -> Self {
        TemplateCatalog {
            templates: vec![appointment_booking(), support_triage(), lead_qualification()],
            usage: DashMap::new(),
        }
    }

    /// Fetch a template by flow id, counting the retrieval.
    pub fn get(&self, id: &str) -> Option<&FlowTemplate> {
        let found = self.templates.iter().find(|t| t.flow.id == id);
        if found.is_some() {
            *self.usage.entry(id.to_string()).or_insert(0) += 1;
        }
        found
    }

    pub fn list(&self) -> &[FlowTemplate] {
        &self.templates
    }

    pub fn list_by_category(&self, category: &str) -> Vec<&FlowTemplate> {
        self.templates
            .iter()
            .filter(|t| t.category.eq_ignore_ascii_case(category))
            .collect()
    }

    /// How many times a template was retrieved this process lifetime.
    pub fn usage_count(&self, id: &str) -> u64 {
        self.usage.get(id).map(|c| *c).unwrap_or(0)
    }
}

/// Appointment scheduling: collect name, date, time, confirm, book.
fn appointment_booking() -> FlowTemplate {
    let flow = Flow::new("appointment_booking", "Appointment Booking", "greeting")
        .description("Schedule appointments over the phone")
        .node(
            FlowNode::new("greeting", NodeType::Greeting)
                .prompt("Hello! Thank you for calling. I can help you schedule an appointment.")
                .then("collect_name"),
        )
        .node(
            FlowNode::new("collect_name", NodeType::Question)
                .prompt("May I have your name please?")
                .collect("name")
                .validation(ValidationRule {
                    kind: "string".to_string(),
                    min_length: Some(2),
                    min: None,
                })
                .then("collect_date"),
        )
        .node(
            FlowNode::new("collect_date", NodeType::Question)
                .prompt("What date works best for you?")
                .collect("preferred_date")
                .then("collect_time"),
        )
        .node(
            FlowNode::new("collect_time", NodeType::Question)
                .prompt("And what time would you prefer?")
                .collect("preferred_time")
                .then("confirm"),
        )
        .node(
            FlowNode::new("confirm", NodeType::Question)
                .prompt("Perfect! I have {name} down for {preferred_date} at {preferred_time}. Is that correct?")
                .collect("confirmation")
                .when(Condition::IntentIs("yes".to_string()), "book_appointment")
                .when(Condition::IntentIs("confirm".to_string()), "book_appointment")
                .when(Condition::IntentIs("no".to_string()), "collect_date")
                .when(Condition::IntentIs("change".to_string()), "collect_date")
                .then("book_appointment"),
        )
        .node(
            FlowNode::new("book_appointment", NodeType::ApiCall)
                .action(NodeAction::Api {
                    endpoint: "/api/v1/appointments".to_string(),
                    method: "POST".to_string(),
                    body: Some(serde_json::json!({
                        "name": "{name}",
                        "date": "{preferred_date}",
                        "time": "{preferred_time}"
                    })),
                })
                .then("end"),
        )
        .node(FlowNode::new("end", NodeType::End).prompt(
            "Your appointment is confirmed! You'll receive a confirmation email shortly. Have a great day!",
        ));

    FlowTemplate {
        flow,
        category: "scheduling".to_string(),
        estimated_duration: "2-3 minutes".to_string(),
        use_cases: vec![
            "Dental offices".to_string(),
            "Salons".to_string(),
            "Consultations".to_string(),
            "Service bookings".to_string(),
        ],
        variables: vec![
            "name".to_string(),
            "preferred_date".to_string(),
            "preferred_time".to_string(),
        ],
    }
}

/// Support triage: collect the issue, route on sentiment and urgency.
fn support_triage() -> FlowTemplate {
    let flow = Flow::new("support_triage", "Customer Support Triage", "greeting")
        .description("Handle support calls with sentiment-aware routing")
        .node(
            FlowNode::new("greeting", NodeType::Greeting)
                .prompt("Thank you for calling support. I'm here to help! Can you briefly describe your issue?")
                .then("collect_issue"),
        )
        .node(
            FlowNode::new("collect_issue", NodeType::Question)
                .prompt("Can you tell me more about what happened?")
                .collect("issue_description")
                .then("triage"),
        )
        .node(
            FlowNode::new("triage", NodeType::Decision)
                .when(Condition::UrgencyIs(Urgency::Critical), "transfer_immediate")
                .when(Condition::SentimentIs(Sentiment::Negative), "transfer_senior")
                .when(Condition::UrgencyIs(Urgency::High), "collect_details")
                .when(Condition::UrgencyIs(Urgency::Low), "schedule_callback")
                .then("collect_details"),
        )
        .node(
            FlowNode::new("transfer_immediate", NodeType::Transfer)
                .prompt("This is urgent. Connecting you to our priority team immediately.")
                .action(NodeAction::Transfer {
                    target: "urgent_support_line".to_string(),
                }),
        )
        .node(
            FlowNode::new("transfer_senior", NodeType::Transfer)
                .prompt("I understand your frustration. Let me connect you with a senior specialist right away.")
                .action(NodeAction::Transfer {
                    target: "senior_support_line".to_string(),
                }),
        )
        .node(
            FlowNode::new("collect_details", NodeType::Question)
                .prompt("I can help with that. What's your account number or email?")
                .collect("account_info")
                .then("create_ticket"),
        )
        .node(
            FlowNode::new("create_ticket", NodeType::ApiCall)
                .action(NodeAction::Api {
                    endpoint: "/api/v1/support/tickets".to_string(),
                    method: "POST".to_string(),
                    body: Some(serde_json::json!({
                        "description": "{issue_description}",
                        "account": "{account_info}"
                    })),
                })
                .then("end"),
        )
        .node(
            FlowNode::new("schedule_callback", NodeType::Question)
                .prompt("I can schedule a callback for you. What time works best?")
                .collect("callback_time")
                .then("end"),
        )
        .node(FlowNode::new("end", NodeType::End).prompt(
            "Your ticket has been created. You'll receive an email with the details. Is there anything else I can help with today?",
        ));

    FlowTemplate {
        flow,
        category: "support".to_string(),
        estimated_duration: "2-5 minutes".to_string(),
        use_cases: vec![
            "Tech support".to_string(),
            "Customer service".to_string(),
            "Help desks".to_string(),
            "SaaS companies".to_string(),
        ],
        variables: vec![
            "issue_description".to_string(),
            "account_info".to_string(),
            "callback_time".to_string(),
        ],
    }
}

/// Sales lead qualification: collect firmographics, route by intent.
fn lead_qualification() -> FlowTemplate {
    let flow = Flow::new("lead_qualification", "Sales Lead Qualification", "greeting")
        .description("Qualify leads and book sales calls")
        .node(
            FlowNode::new("greeting", NodeType::Greeting)
                .prompt("Hi! Thanks for your interest in our product. I'd love to learn more about your needs.")
                .then("collect_company"),
        )
        .node(
            FlowNode::new("collect_company", NodeType::Question)
                .prompt("What company are you with?")
                .collect("company_name")
                .then("collect_role"),
        )
        .node(
            FlowNode::new("collect_role", NodeType::Question)
                .prompt("And what's your role there?")
                .collect("role")
                .then("collect_team_size"),
        )
        .node(
            FlowNode::new("collect_team_size", NodeType::Question)
                .prompt("How many people are on your team?")
                .collect("team_size")
                .validation(ValidationRule {
                    kind: "number".to_string(),
                    min_length: None,
                    min: Some(1.0),
                })
                .then("qualify"),
        )
        .node(
            FlowNode::new("qualify", NodeType::IntentCheck)
                .when(Condition::IntentIs("enterprise".to_string()), "transfer_sales")
                .when(Condition::UrgencyIs(Urgency::High), "transfer_sales")
                .when(Condition::IntentIs("small_team".to_string()), "send_resources")
                .then("book_demo"),
        )
        .node(
            FlowNode::new("transfer_sales", NodeType::Transfer)
                .prompt("Perfect! Let me connect you with one of our senior team members right away.")
                .action(NodeAction::Transfer {
                    target: "senior_sales_rep".to_string(),
                }),
        )
        .node(
            FlowNode::new("book_demo", NodeType::ApiCall)
                .action(NodeAction::Api {
                    endpoint: "/api/v1/sales/book-demo".to_string(),
                    method: "POST".to_string(),
                    body: Some(serde_json::json!({
                        "company": "{company_name}",
                        "role": "{role}",
                        "team_size": "{team_size}"
                    })),
                })
                .then("end_demo_booked"),
        )
        .node(
            FlowNode::new("send_resources", NodeType::Message)
                .prompt("Great! I'll send you some resources to get started. You can also try our free tier!")
                .then("end_resources"),
        )
        .node(FlowNode::new("end_demo_booked", NodeType::End).prompt(
            "Your demo is scheduled! Check your email for the calendar invite. Excited to show you what we can do!",
        ))
        .node(FlowNode::new("end_resources", NodeType::End).prompt(
            "Check your inbox! Let me know if you have any questions. Have a great day!",
        ));

    FlowTemplate {
        flow,
        category: "sales".to_string(),
        estimated_duration: "3-4 minutes".to_string(),
        use_cases: vec![
            "B2B sales".to_string(),
            "SaaS demos".to_string(),
            "Lead gen".to_string(),
            "Outbound sales".to_string(),
        ],
        variables: vec![
            "company_name".to_string(),
            "role".to_string(),
            "team_size".to_string(),
        ],
    }
}
