use thiserror::Error;
use uuid::Uuid;

pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while turning project rows into compiled sink writes.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("Failed to decode logic of {owner}: {message}")]
    LogicDecode { owner: String, message: String },

    #[error("Unknown action kind '{0}'")]
    UnknownActionKind(String),

    #[error("Unsupported value for variable {variable} in condition of {owner}: {found}")]
    UnsupportedConditionValue {
        owner: String,
        variable: String,
        found: String,
    },

    #[error("Unknown condition operator '{0}'")]
    UnknownOperator(String),

    #[error("Edge {parent} -> {child} references a dialog node that is not in the project")]
    DanglingEdge { parent: Uuid, child: Uuid },

    #[error("Dialog graph contains a cycle through node {0}")]
    Cycle(Uuid),

    #[error("Dialog node {0} is not part of the graph")]
    NodeNotFound(Uuid),

    #[error("{what} does not fit in {limit} (got {len})")]
    Overflow {
        what: &'static str,
        limit: &'static str,
        len: usize,
    },

    #[error("Sink write to '{key}' failed: {message}")]
    SinkWrite { key: String, message: String },

    #[error("Sink channel closed before '{0}' could be written")]
    SinkClosed(String),

    #[error("Training request for '{key}' failed: {message}")]
    Training { key: String, message: String },

    #[error("Compiler task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CompileError {
    fn from(err: tokio::task::JoinError) -> Self {
        CompileError::Task(err.to_string())
    }
}
