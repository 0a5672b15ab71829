//! Error types for the flow engine

use thiserror::Error;

/// Result type alias for flow operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors that can occur while building, validating, or driving a flow
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Model response parse failed: {0}")]
    Parse(String),

    #[error("Invalid flow: {0}")]
    InvalidFlow(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Invalid condition '{0}': {1}")]
    Condition(String, String),

    #[error("Configuration error: {0}")]
    Config(String),
}
