use adkit::errors::AadError;
use thiserror::Error;

/// Failures surfaced by the scripting pipeline. Compilation stops at the
/// first offending token; evaluation faults carry the script-level detail.
#[derive(Debug, Error)]
pub enum ScriptingError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unrecognized token '{0}'")]
    BadToken(String),
    #[error("malformed number literal: {0}")]
    BadNumber(#[from] std::num::ParseFloatError),
    #[error("unexpected '{0}'")]
    Unexpected(String),
    #[error("function {name} takes {min} to {max} arguments, got {got}")]
    Arity {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },
    #[error("the {0} stack underflowed mid-statement")]
    Underflow(&'static str),
    #[error("evaluation failed: {0}")]
    Evaluation(String),
    #[error(transparent)]
    Aad(#[from] AadError),
}

pub type Result<T> = std::result::Result<T, ScriptingError>;
