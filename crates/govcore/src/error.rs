use thiserror::Error;

/// Host-level failures: loading and checking configuration.
#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while resolving intermediate events. These are fatal to the
/// current graph walk and surface to the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    #[error("Invalid flow '{flow}': unknown node {node}")]
    InvalidFlow { flow: String, node: String },

    #[error("No catch link named '{0}'")]
    LinkTargetNotFound(String),

    #[error("Link '{0}' has more than one catch node")]
    AmbiguousLinkTarget(String),

    #[error("Invalid timer on node {node}: {detail}")]
    InvalidTimer { node: String, detail: String },

    #[error("Condition error: {0}")]
    Expression(#[from] ExpressionError),
}

/// Organizational misconfiguration. Surfaced as a denial by the gate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown mission: {0}")]
    UnknownMission(String),

    #[error("Role inheritance cycle: {}", .0.join(" -> "))]
    RoleCycle(Vec<String>),

    #[error("Condition error: {0}")]
    Expression(#[from] ExpressionError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Resource '{category}' exceeded: projected {projected}, ceiling {ceiling}")]
    Exceeded {
        category: String,
        projected: String,
        ceiling: String,
    },

    #[error("Malformed allocation value for {field}: '{value}'")]
    MalformedAllocation { field: String, value: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("Unexpected end of expression")]
    UnexpectedEof,

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },
}
