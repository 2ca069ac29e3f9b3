//! Host test framework
//!
//! libtest has no sub-tests, so the engine runs inside this small host instead. The host provides exactly what the
//! engine consumes:
//!
//! - named, nestable scopes ([`Scope::run`]) and parallel scopes ([`Scope::run_parallel`])
//! - scope-bound cleanups ([`Scope::cleanup`])
//! - diagnostic lines ([`Scope::log`]) and failure signalling ([`Scope::error`], [`Scope::fatal`])
//! - result reporting through the [`Reporter`] trait
//!
//! ## Usage
//!
//! ```rust,ignore
//! #[test]
//! fn login_cases() {
//!     casekit::harness("login_cases", |t| {
//!         casekit::run_list(t, &cases());
//!     })
//!     .assert_passed();
//! }
//! ```

pub mod report;
pub mod scope;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::{HarnessConfig, ReportFormat};

pub use report::{ConsoleReporter, JsonReporter, NullReporter, Reporter, ScopeInfo, ScopeOutcome, Summary};
pub use scope::{RunHandle, Scope};

// ============================================================================
// Scope body results
// ============================================================================

/// Error returned by a task or scope body.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a task or scope body.
pub type TaskResult = Result<(), TaskError>;

/// Return types accepted from task and scope bodies: `()` or `Result<(), E>`.
pub trait IntoTaskResult {
    fn into_task_result(self) -> TaskResult;
}

impl IntoTaskResult for () {
    fn into_task_result(self) -> TaskResult {
        Ok(())
    }
}

impl<E> IntoTaskResult for Result<(), E>
where
    E: Into<TaskError>,
{
    fn into_task_result(self) -> TaskResult {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A failed scope, as collected for the run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub name: String,
    pub messages: Vec<String>,
}

/// Error returned by [`RunReport::into_result`] when any scope failed.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{failed} scope(s) failed: {}", .names.join(", "))]
    Failed { failed: usize, names: Vec<String> },
}

#[derive(Default)]
struct Results {
    passed: usize,
    failed: usize,
    skipped: usize,
    failures: Vec<Failure>,
}

/// State shared by every scope of one harness run.
pub(crate) struct HarnessShared {
    pub(crate) config: HarnessConfig,
    pub(crate) reporter: Mutex<Box<dyn Reporter + Send>>,
    results: Mutex<Results>,
    any_failed: AtomicBool,
}

impl HarnessShared {
    pub(crate) fn any_failed(&self) -> bool {
        self.any_failed.load(Ordering::Acquire)
    }

    pub(crate) fn note_failure(&self) {
        self.any_failed.store(true, Ordering::Release);
    }

    /// Count a completed scope and forward it to the reporter.
    ///
    /// The root scope (depth 0) is reported but not counted.
    pub(crate) fn record(&self, info: &ScopeInfo, outcome: ScopeOutcome) {
        {
            let mut results = self.results.lock();
            match &outcome {
                ScopeOutcome::Passed { .. } if info.depth > 0 => results.passed += 1,
                ScopeOutcome::Skipped(_) if info.depth > 0 => results.skipped += 1,
                ScopeOutcome::Failed { messages, .. } => {
                    if info.depth > 0 {
                        results.failed += 1;
                    }
                    if info.depth > 0 || !messages.is_empty() {
                        results.failures.push(Failure {
                            name: info.name.clone(),
                            messages: messages.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
        self.reporter.lock().on_scope_complete(info, &outcome);
    }
}

/// Entry point that runs a root scope and collects the results of everything opened beneath it.
pub struct Harness {
    config: HarnessConfig,
    reporter: Box<dyn Reporter + Send>,
}

impl Harness {
    /// Create a harness whose reporter follows `config.format`.
    pub fn new(config: HarnessConfig) -> Self {
        let reporter: Box<dyn Reporter + Send> = match config.format {
            ReportFormat::Console => Box::new(ConsoleReporter::new(config.verbose)),
            ReportFormat::Json => Box::new(JsonReporter::stdout()),
            ReportFormat::Quiet => Box::new(NullReporter),
        };
        Self { config, reporter }
    }

    /// Create a harness configured from the `CASEKIT_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(HarnessConfig::from_env())
    }

    /// Replace the reporter.
    pub fn with_reporter(mut self, reporter: impl Reporter + Send + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Configuration the harness runs with.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run `body` in a root scope named `name` and report the results.
    ///
    /// Returns once the root scope and every scope opened beneath it (including parallel ones) have completed.
    pub fn run<F, R>(self, name: &str, body: F) -> RunReport
    where
        F: FnOnce(&Scope) -> R,
        R: IntoTaskResult,
    {
        let started = Instant::now();
        let shared = Arc::new(HarnessShared {
            config: self.config,
            reporter: Mutex::new(self.reporter),
            results: Mutex::new(Results::default()),
            any_failed: AtomicBool::new(false),
        });

        let root = Scope::root(name, Arc::clone(&shared));
        root.execute(body);
        let success = !root.failed();

        let results = std::mem::take(&mut *shared.results.lock());
        let summary = Summary {
            total: results.passed + results.failed + results.skipped,
            passed: results.passed,
            failed: results.failed,
            skipped: results.skipped,
            duration: started.elapsed(),
        };
        shared.reporter.lock().on_run_complete(&summary);

        RunReport {
            name: name.to_string(),
            summary,
            failures: results.failures,
            success,
        }
    }
}

/// Run `body` under a harness configured from the environment.
pub fn harness<F, R>(name: &str, body: F) -> RunReport
where
    F: FnOnce(&Scope) -> R,
    R: IntoTaskResult,
{
    Harness::from_env().run(name, body)
}

/// Outcome of one harness run.
#[derive(Debug, Clone)]
pub struct RunReport {
    name: String,
    summary: Summary,
    failures: Vec<Failure>,
    success: bool,
}

impl RunReport {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Failed scopes in completion order.
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Convert into a `Result` for `#[test]` functions that return one.
    pub fn into_result(self) -> Result<Summary, HarnessError> {
        if self.success {
            Ok(self.summary)
        } else {
            Err(HarnessError::Failed {
                failed: self.failures.len(),
                names: self.failures.into_iter().map(|f| f.name).collect(),
            })
        }
    }

    /// Panic with every failure message unless the run succeeded.
    #[track_caller]
    pub fn assert_passed(&self) {
        if !self.success {
            panic!("{self}");
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.success { "passed" } else { "failed" };
        writeln!(
            f,
            "{} {}: {} passed, {} failed, {} skipped",
            self.name, verdict, self.summary.passed, self.summary.failed, self.summary.skipped
        )?;
        for failure in &self.failures {
            writeln!(f, "--- FAIL: {}", failure.name)?;
            for message in &failure.messages {
                writeln!(f, "    {message}")?;
            }
        }
        Ok(())
    }
}
