//! Typed error taxonomy for alarm configuration parsing and condition
//! compilation. These sit beneath the `anyhow::Error` boundary used
//! everywhere else in the crate; call sites that need to branch on error
//! *kind* (AlarmManager deciding whether a reload failure should retain
//! the previous config, for example) match on these instead of
//! downcasting an opaque `anyhow::Error`. Notifier dispatch and data
//! source polling are best-effort and log-and-continue, so they stay on
//! plain `anyhow::Result` rather than their own typed variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed alarm configuration at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("invalid alarm configuration: {0}")]
    Schema(String),

    #[error(
        "could not read '{path}' as JSON and it looks like a bare file path; \
         did you mean '@{path}'?"
    )]
    MissingSigilHint { path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("expected a value after operator, found end of expression")]
    MissingOperand,

    #[error("unit '{unit}' is not valid for field '{field}'")]
    IncompatibleUnit { field: String, unit: String },

    #[error("malformed literal '{0}'")]
    MalformedLiteral(String),

    #[error(
        "invalid condition (operator precedence: && before ||): {detail}"
    )]
    Syntax { detail: String },
}

