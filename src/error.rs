//! Diagnostics: the error kinds the front end and middle end can raise, and
//! the sink they are reported through.
//!
//! Semantic errors carry a line number and cause the offending handler to
//! return failure, which its caller propagates; the driver turns any
//! accumulated error into a non-zero exit status. Some mismatches (return
//! type mismatch, assignment type mismatch) are reported as warnings and do
//! not stop lowering, matching the best-effort IR the test harness expects.

use crate::common::Line;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("line {line}: undefined variable '{name}'")]
    UndefinedVariable { line: Line, name: String },

    #[error("line {line}: undefined function '{name}'")]
    UndefinedFunction { line: Line, name: String },

    #[error("line {line}: function '{name}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        line: Line,
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("line {line}: 'break' used outside of a loop")]
    BreakOutsideLoop { line: Line },

    #[error("line {line}: 'continue' used outside of a loop")]
    ContinueOutsideLoop { line: Line },

    #[error("line {line}: nested function definitions are not allowed")]
    NestedFunctionDefinition { line: Line },

    #[error("line {line}: array dimension must be a non-negative constant")]
    NonConstantArrayDimension { line: Line },

    #[error("line {line}: function '{name}' is already defined")]
    DuplicateFunction { line: Line, name: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// A warning: lowering continues, but the issue is worth surfacing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticWarning {
    #[error("line {line}: return value type does not match declared return type of '{func}'")]
    ReturnTypeMismatch { line: Line, func: String },

    #[error("line {line}: assignment type mismatch for '{name}'")]
    AssignTypeMismatch { line: Line, name: String },
}

/// Accumulates diagnostics over a lowering pass. Fatal errors are pushed to
/// `errors`; lowering that encounters one returns `false` from its handler
/// but the walk continues so that later errors in the same source are also
/// reported in one pass.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub errors: Vec<SemanticError>,
    pub warnings: Vec<SemanticWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, e: SemanticError) {
        tracing::error!(%e, "semantic error");
        self.errors.push(e);
    }

    pub fn warn(&mut self, w: SemanticWarning) {
        tracing::warn!(%w, "semantic warning");
        self.warnings.push(w);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
