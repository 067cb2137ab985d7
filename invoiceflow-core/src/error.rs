use thiserror::Error;

/// Expression failures come in two distinct kinds: the text never compiled,
/// or a compiled expression blew up against a particular context. Both carry
/// the offending expression so a log entry can explain itself, and both are
/// caught at the single-rule boundary — they never abort a run.
#[derive(Debug, Clone, Error)]
pub enum ExprError {
    #[error("failed to compile expression `{expression}`: {message}")]
    Compile { expression: String, message: String },
    #[error("failed to evaluate expression `{expression}`: {message}")]
    Eval { expression: String, message: String },
}

impl ExprError {
    pub fn compile(expression: &str, message: impl Into<String>) -> Self {
        ExprError::Compile {
            expression: expression.to_string(),
            message: message.into(),
        }
    }

    pub fn eval(expression: &str, message: impl Into<String>) -> Self {
        ExprError::Eval {
            expression: expression.to_string(),
            message: message.into(),
        }
    }
}

/// A completion target could not be resolved or the computed value does not
/// fit it. Converted into a FAILED log entry, never propagated.
#[derive(Debug, Clone, Error)]
pub enum PathError {
    #[error("unknown target field path `{0}`")]
    UnknownPath(String),
    #[error("cannot write {value_kind} value to `{path}`")]
    Incompatible { path: String, value_kind: String },
}

impl PathError {
    pub fn incompatible(path: impl Into<String>, value_kind: impl Into<String>) -> Self {
        PathError::Incompatible {
            path: path.into(),
            value_kind: value_kind.into(),
        }
    }
}

/// A single rule record in the configuration could not be parsed. The record
/// is dropped with a warning; only an unreadable configuration source is
/// fatal to a load.
#[derive(Debug, Clone, Error)]
#[error("malformed rule record `{id}`: {message}")]
pub struct ConfigError {
    pub id: String,
    pub message: String,
}
