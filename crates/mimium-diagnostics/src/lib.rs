// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Shared diagnostic vocabulary for the mimium closure-conversion and
//! code-emission core.
//!
//! Each compiler stage gets its own `thiserror` enum so call sites can match
//! on the specific failure; [`Diagnostic`] is the single flattened shape the
//! CLI renders, produced via [`ToDiagnostic`].

use std::fmt;

/// Failures raised by closure conversion (`mimium-mir`). Both are fatal per
/// the "no partial recovery" propagation policy: a bad instruction
/// invalidates the whole compile.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConvertError {
    /// An operand referenced a name that is bound nowhere in the scope chain.
    #[error("name not bound: `{0}`")]
    UnboundName(String),
    /// A captured name has no entry in the type environment.
    #[error("no type recorded for captured variable `{0}`")]
    UnknownType(String),
}

/// Failures raised by code emission (`mimium-codegen`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("unsupported MIR type reached the lowerer: {0}")]
    UnsupportedType(String),
    #[error("name `{0}` not found in the emitter's name map")]
    NameNotFound(String),
    #[error("function `{0}` could not be referenced (not a builtin, not declared)")]
    CalleeNotFound(String),
    #[error("cranelift error: {0}")]
    Cranelift(String),
    #[error("function `{0}` does not return on every path")]
    MissingReturn(String),
}

/// Severity of a rendered [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single diagnostic ready for CLI display. Unlike a full source-level
/// diagnostic (the upstream parser/checker's concern), this core has no
/// spans to attach — it reports on MIR names and stages instead.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn error(stage: &'static str, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Error, stage, message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.stage, self.message)
    }
}

/// Converts a stage-specific error into the flattened [`Diagnostic`] shape.
pub trait ToDiagnostic {
    fn to_diagnostic(&self) -> Diagnostic;
}

impl ToDiagnostic for ConvertError {
    fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error("closure-convert", self.to_string())
    }
}

impl ToDiagnostic for CodegenError {
    fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error("codegen", self.to_string())
    }
}
