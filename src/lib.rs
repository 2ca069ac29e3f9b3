#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! casekit: test-case orchestration
//!
//! A test case is an ordered set of tasks that share one freshly built workspace per run. Cases can be copied and
//! extended, expose named callbacks that tasks invoke, and are run alone or as lists (sequentially or in parallel)
//! with exclude/focus controls.
//!
//! The crate is split into:
//!
//! - [`engine`]: test cases, workspaces, callbacks and the list runner
//! - [`host`]: the scope-based harness the engine runs in (nested and parallel scopes, cleanups, reporting)
//! - [`config`], [`error`], [`logging`]: ambient configuration, contract errors and `tracing` setup
//!
//! Task ordering lives in the `casekit_core` crate.
//!
//! ## Panic Policy
//!
//! - **Library code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`; `unwrap`/`expect` are denied.
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//! - **Task bodies**: panics (including [`Scope::fatal`]) are caught at the scope boundary and reported as failures
//!   of that scope.

pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod logging;

pub use casekit_core::{OrderedTaskSet, TaskKey, TaskSetError};

pub use config::{ConfigError, HarnessConfig, ReportFormat};
pub use engine::{
    CallbackId, CallbackRegistry, Case, TestCase, Workspace, has_callback, invoke_callback, invoke_callback_with,
    invoke_optional_callback, invoke_optional_callback_with, run_list, run_list_parallel,
};
pub use error::{CaseError, CaseResult, render_diagnostic};
pub use host::{
    Failure, Harness, HarnessError, IntoTaskResult, Reporter, RunHandle, RunReport, Scope, Summary, TaskError,
    TaskResult, harness,
};
