//! Result reporting
//!
//! ## Reporter Trait
//!
//! The host uses a `Reporter` trait to separate reporting from execution. Custom output formats are added by
//! implementing the trait and passing it to [`crate::Harness::with_reporter`].
//!
//! Events for parallel scopes arrive from several threads; the harness serializes calls, so implementations only need
//! to be `Send`.

use std::io::{self, Write};
use std::time::Duration;

use serde_json::json;

use super::scope::RunHandle;

/// Identity of a scope, as seen by reporters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInfo {
    /// Full `/`-separated scope path
    pub name: String,
    /// Nesting depth; the harness root is `0`
    pub depth: usize,
    pub parallel: bool,
    pub handle: RunHandle,
}

/// Result of one completed scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeOutcome {
    Passed { duration: Duration, logs: Vec<String> },
    Failed { duration: Duration, messages: Vec<String> },
    Skipped(String),
}

impl ScopeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ScopeOutcome::Passed { .. } => "passed",
            ScopeOutcome::Failed { .. } => "failed",
            ScopeOutcome::Skipped(_) => "skipped",
        }
    }
}

/// Summary of a harness run; the root scope is not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
}

/// Trait for reporting scope results.
pub trait Reporter {
    /// Called when a scope starts running
    fn on_scope_start(&mut self, _scope: &ScopeInfo) {}

    /// Called when a scope completes or is skipped
    fn on_scope_complete(&mut self, scope: &ScopeInfo, outcome: &ScopeOutcome);

    /// Called once every scope of the run has completed
    fn on_run_complete(&mut self, summary: &Summary);
}

// ============================================================================
// Console reporter
// ============================================================================

/// Default console reporter (pytest-style)
#[derive(Default)]
pub struct ConsoleReporter {
    pub verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Reporter for ConsoleReporter {
    fn on_scope_complete(&mut self, scope: &ScopeInfo, outcome: &ScopeOutcome) {
        let indent = "  ".repeat(scope.depth);
        match outcome {
            ScopeOutcome::Passed { duration, logs } => {
                if self.verbose {
                    eprintln!(
                        "{}{} \x1b[32mPASSED\x1b[0m ({:.0}ms)",
                        indent,
                        scope.name,
                        duration.as_millis()
                    );
                    for line in logs {
                        eprintln!("{}    {}", indent, line);
                    }
                }
            }
            ScopeOutcome::Failed { duration, messages } => {
                eprintln!(
                    "{}{} \x1b[31mFAILED\x1b[0m ({:.0}ms)",
                    indent,
                    scope.name,
                    duration.as_millis()
                );
                for line in messages {
                    eprintln!("{}    \x1b[31m{}\x1b[0m", indent, line);
                }
            }
            ScopeOutcome::Skipped(reason) => {
                if self.verbose {
                    eprintln!("{}{} \x1b[33mSKIPPED\x1b[0m ({})", indent, scope.name, reason);
                }
            }
        }
    }

    fn on_run_complete(&mut self, summary: &Summary) {
        let mut parts = Vec::new();
        if summary.passed > 0 {
            parts.push(format!("\x1b[32m{} passed\x1b[0m", summary.passed));
        }
        if summary.failed > 0 {
            parts.push(format!("\x1b[31m{} failed\x1b[0m", summary.failed));
        }
        if summary.skipped > 0 {
            parts.push(format!("\x1b[33m{} skipped\x1b[0m", summary.skipped));
        }
        if parts.is_empty() {
            parts.push("no scopes".to_string());
        }

        eprintln!(
            "====== {} in {:.2}s ======",
            parts.join(", "),
            summary.duration.as_secs_f64()
        );
    }
}

// ============================================================================
// JSON reporter
// ============================================================================

/// Machine-readable reporter writing one JSON object per line.
pub struct JsonReporter<W: Write> {
    out: W,
}

impl JsonReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: serde_json::Value) {
        if let Err(e) = writeln!(self.out, "{event}") {
            tracing::warn!("failed to write report event: {}", e);
        }
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn on_scope_start(&mut self, scope: &ScopeInfo) {
        self.emit(json!({
            "event": "start",
            "name": scope.name,
            "depth": scope.depth,
            "parallel": scope.parallel,
            "handle": scope.handle.as_u64(),
        }));
    }

    fn on_scope_complete(&mut self, scope: &ScopeInfo, outcome: &ScopeOutcome) {
        let mut event = json!({
            "event": "complete",
            "name": scope.name,
            "depth": scope.depth,
            "outcome": outcome.label(),
        });
        match outcome {
            ScopeOutcome::Passed { duration, logs } => {
                event["duration_ms"] = json!(duration.as_millis() as u64);
                event["messages"] = json!(logs);
            }
            ScopeOutcome::Failed { duration, messages } => {
                event["duration_ms"] = json!(duration.as_millis() as u64);
                event["messages"] = json!(messages);
            }
            ScopeOutcome::Skipped(reason) => {
                event["reason"] = json!(reason);
            }
        }
        self.emit(event);
    }

    fn on_run_complete(&mut self, summary: &Summary) {
        self.emit(json!({
            "event": "summary",
            "total": summary.total,
            "passed": summary.passed,
            "failed": summary.failed,
            "skipped": summary.skipped,
            "duration_ms": summary.duration.as_millis() as u64,
        }));
    }
}

/// Reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_scope_complete(&mut self, _scope: &ScopeInfo, _outcome: &ScopeOutcome) {}

    fn on_run_complete(&mut self, _summary: &Summary) {}
}
