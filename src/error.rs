//! Contract errors raised by the engine.
//!
//! Every variant is a programmer error: a case built or driven against its contract. They are raised at the point of
//! detection, abort the affected scope, and are never retried.

use casekit_core::TaskSetError;
use miette::Diagnostic;
use thiserror::Error;

use crate::host::RunHandle;

/// Error type for engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CaseError {
    #[error("callback shape mismatch; callbackID={id} expected={expected} found={found}")]
    #[diagnostic(
        code(casekit::shape_mismatch),
        help("invoke the callback with the argument type it was registered with")
    )]
    ShapeMismatch { id: String, expected: String, found: String },

    #[error("duplicate task key; key={key}")]
    #[diagnostic(
        code(casekit::duplicate_key),
        help("every task of one case needs its own key; copy the case to override a task")
    )]
    DuplicateKey { key: String },

    #[error("no task; case={case}")]
    #[diagnostic(code(casekit::no_tasks), help("add at least one task before running the case"))]
    NoTasks { case: String },

    #[error("no active run; handle={handle}")]
    #[diagnostic(
        code(casekit::no_active_run),
        help("callbacks can only be invoked from inside a task of a running case")
    )]
    NoActiveRun { handle: RunHandle },

    #[error("unknown callback; callbackID={id} case={case}")]
    #[diagnostic(
        code(casekit::unknown_callback),
        help("register the callback on the case, or use the optional invocation for skippable hooks")
    )]
    UnknownCallback { id: String, case: String },

    #[error("invalid workspace shape; expected={expected} found={found}")]
    #[diagnostic(
        code(casekit::invalid_factory_shape),
        help("callbacks receive the workspace produced by the case's factory")
    )]
    InvalidFactoryShape { expected: String, found: String },

    #[error("run already registered; handle={handle}")]
    #[diagnostic(code(casekit::run_already_registered))]
    RunAlreadyRegistered { handle: RunHandle },

    #[error("callback failed; callbackID={id}: {message}")]
    #[diagnostic(code(casekit::callback_failed))]
    CallbackFailed { id: String, message: String },

    #[error("case was built with an error; case={case}")]
    #[diagnostic(code(casekit::build_failed))]
    BuildFailed {
        case: String,
        #[source]
        source: Box<CaseError>,
    },
}

impl From<TaskSetError> for CaseError {
    fn from(err: TaskSetError) -> Self {
        match err {
            TaskSetError::DuplicateKey { key } => CaseError::DuplicateKey { key },
        }
    }
}

/// Result type for engine operations.
pub type CaseResult<T> = Result<T, CaseError>;

/// Render a contract error for a scope failure message.
///
/// The output is `[code] message`, followed by the cause chain and the help text when present.
pub fn render_diagnostic(err: &CaseError) -> String {
    let mut out = match err.code() {
        Some(code) => format!("[{code}] {err}"),
        None => err.to_string(),
    };
    if let CaseError::BuildFailed { source, .. } = err {
        out.push_str("\n  caused by: ");
        out.push_str(&render_diagnostic(source));
    }
    if let Some(help) = err.help() {
        out.push_str(&format!("\n  help: {help}"));
    }
    out
}
