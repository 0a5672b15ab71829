//! HTTP handlers: thin JSON adapters over the flow engine.

use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mindframe_flow::{validate, Flow, TurnResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "active_conversations": state.engine.store().len(),
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Deserialize)]
pub(crate) struct TurnRequest {
    /// Omitted on the first turn: the gateway mints one.
    pub conversation_id: Option<String>,
    pub utterance: String,
    /// Either a catalog template id...
    pub template_id: Option<String>,
    /// ...or an inline flow definition.
    pub flow: Option<Flow>,
}

pub(crate) async fn process_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Response {
    let flow = match (&req.flow, &req.template_id) {
        (Some(flow), _) => {
            // Inline flows are validated before they may drive a call.
            let result = validate(flow);
            if !result.valid {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "invalid flow", "validation": result })),
                )
                    .into_response();
            }
            flow.clone()
        }
        (None, Some(template_id)) => match state.catalog.get(template_id) {
            Some(template) => template.flow.clone(),
            None => {
                return error_response(
                    StatusCode::NOT_FOUND,
                    format!("template '{}' not found", template_id),
                )
            }
        },
        (None, None) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "either 'template_id' or 'flow' is required",
            )
        }
    };

    let conversation_id = req
        .conversation_id
        .unwrap_or_else(|| format!("call-{}", Uuid::new_v4()));
    let response: TurnResponse = state
        .engine
        .process_turn(&conversation_id, &req.utterance, &flow)
        .await;

    Json(json!({
        "conversation_id": conversation_id,
        "response": response,
    }))
    .into_response()
}

pub(crate) async fn validate_flow(Json(flow): Json<Flow>) -> Json<serde_json::Value> {
    Json(json!({ "validation": validate(&flow) }))
}

#[derive(Deserialize)]
pub(crate) struct GenerateRequest {
    pub description: String,
    #[serde(default)]
    pub goal: String,
}

pub(crate) async fn generate_flow(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Json<serde_json::Value> {
    let flow = state
        .designer
        .generate_flow(&req.description, &req.goal)
        .await;
    let validation = validate(&flow);
    Json(json!({ "flow": flow, "validation": validation }))
}

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    pub category: Option<String>,
}

pub(crate) async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let templates: Vec<serde_json::Value> = match &query.category {
        Some(category) => state
            .catalog
            .list_by_category(category)
            .into_iter()
            .map(template_summary)
            .collect(),
        None => state.catalog.list().iter().map(template_summary).collect(),
    };
    Json(json!({ "templates": templates }))
}

fn template_summary(template: &mindframe_flow::FlowTemplate) -> serde_json::Value {
    json!({
        "id": template.flow.id,
        "name": template.flow.name,
        "description": template.flow.description,
        "category": template.category,
        "estimated_duration": template.estimated_duration,
        "use_cases": template.use_cases,
        "variables": template.variables,
        "nodes": template.flow.nodes.len(),
    })
}

pub(crate) async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.catalog.get(&id) {
        Some(template) => Json(json!({ "template": template })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("template '{}' not found", id)),
    }
}

#[derive(Deserialize)]
pub(crate) struct ExportQuery {
    pub format: Option<String>,
}

pub(crate) async fn export_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Response {
    let Some(template) = state.catalog.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, format!("template '{}' not found", id));
    };

    match query.format.as_deref().unwrap_or("json") {
        "mermaid" => mindframe_flow::export_mermaid(&template.flow).into_response(),
        "json" => match mindframe_flow::export_json(&template.flow) {
            Ok(json) => ([("content-type", "application/json")], json).into_response(),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        other => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unknown export format '{}' (use json or mermaid)", other),
        ),
    }
}
