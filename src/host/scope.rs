//! Named, nestable test scopes
//!
//! A [`Scope`] is one running (sub-)test: it owns a process-unique [`RunHandle`], collects log lines and failures,
//! runs its cleanups when it completes, and opens child scopes either inline ([`Scope::run`]) or on their own thread
//! ([`Scope::run_parallel`]). A scope joins its parallel children before running its own cleanups and reporting.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use super::report::{ScopeInfo, ScopeOutcome};
use super::{HarnessShared, IntoTaskResult};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one running scope.
///
/// Handles are allocated from a counter and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunHandle(u64);

impl RunHandle {
    pub(crate) fn next() -> Self {
        RunHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Unwind payload used by [`Scope::fatal`]; the failure is already recorded when it is caught.
struct FatalAbort;

type ScopeCleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ScopeState {
    failed: bool,
    messages: Vec<String>,
    cleanups: Vec<ScopeCleanup>,
    children: Vec<JoinHandle<()>>,
    child_names: HashMap<String, usize>,
}

struct ScopeInner {
    name: String,
    depth: usize,
    parallel: bool,
    handle: RunHandle,
    parent: Option<Arc<ScopeInner>>,
    shared: Arc<HarnessShared>,
    state: Mutex<ScopeState>,
}

/// Handle to a running test scope.
///
/// Cloning is cheap; clones refer to the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.inner.name)
            .field("handle", &self.inner.handle)
            .field("parallel", &self.inner.parallel)
            .finish()
    }
}

impl Scope {
    pub(crate) fn root(name: &str, shared: Arc<HarnessShared>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name: name.to_string(),
                depth: 0,
                parallel: false,
                handle: RunHandle::next(),
                parent: None,
                shared,
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    fn child(&self, name: &str, parallel: bool) -> Self {
        let unique = {
            let mut state = self.inner.state.lock();
            let seen = state.child_names.entry(name.to_string()).or_insert(0);
            let unique = if *seen == 0 {
                name.to_string()
            } else {
                format!("{name}#{seen:02}")
            };
            *seen += 1;
            unique
        };
        Self {
            inner: Arc::new(ScopeInner {
                name: format!("{}/{}", self.inner.name, unique),
                depth: self.inner.depth + 1,
                parallel,
                handle: RunHandle::next(),
                parent: Some(Arc::clone(&self.inner)),
                shared: Arc::clone(&self.inner.shared),
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    /// Full `/`-separated path of this scope.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn handle(&self) -> RunHandle {
        self.inner.handle
    }

    /// Nesting depth; the harness root is `0`.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Whether this scope was opened with [`Scope::run_parallel`].
    pub fn is_parallel(&self) -> bool {
        self.inner.parallel
    }

    /// Whether this scope (or any of its children) has failed so far.
    pub fn failed(&self) -> bool {
        self.inner.state.lock().failed
    }

    /// Record a diagnostic line.
    ///
    /// Lines are shown for failed scopes, and for every scope in verbose mode.
    pub fn log(&self, message: impl fmt::Display) {
        let line = message.to_string();
        tracing::info!(scope = %self.inner.name, "{}", line);
        self.inner.state.lock().messages.push(line);
    }

    /// Record a failure and keep running.
    pub fn error(&self, message: impl fmt::Display) {
        let line = message.to_string();
        tracing::debug!(scope = %self.inner.name, "scope failed: {}", line);
        self.inner.state.lock().messages.push(line);
        self.mark_failed();
    }

    /// Record a failure and abort the current scope.
    ///
    /// Unwinds to the scope boundary; cleanups registered on the scope (and workspaces being dropped on the way out)
    /// still run. A body or task closure made only of this call needs an explicit `-> ()` return type.
    pub fn fatal(&self, message: impl fmt::Display) -> ! {
        self.error(message);
        panic::resume_unwind(Box::new(FatalAbort))
    }

    /// Unwrap `result`, aborting the scope with the error message on `Err`.
    pub fn require<T, E: fmt::Display>(&self, result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => self.fatal(e),
        }
    }

    /// Register `cleanup` to run when this scope completes, after its parallel children.
    ///
    /// Cleanups run in reverse order of registration.
    pub fn cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        self.inner.state.lock().cleanups.push(Box::new(cleanup));
    }

    /// Run `body` in a named child scope on the current thread.
    ///
    /// ## Returns
    /// - (`bool`): `false` if the child scope failed.
    pub fn run<F, R>(&self, name: &str, body: F) -> bool
    where
        F: FnOnce(&Scope) -> R,
        R: IntoTaskResult,
    {
        let child = self.child(name, false);
        if let Some(reason) = child.skip_reason() {
            child.complete_skipped(reason);
            return true;
        }
        child.execute(body);
        !child.failed()
    }

    /// Run `body` in a named child scope that may execute concurrently with its siblings.
    ///
    /// The child runs on its own thread and is joined when this scope completes.
    ///
    /// ## Returns
    /// - (`bool`): `true` unless the child could not be started; its outcome is reported when it completes.
    pub fn run_parallel<F, R>(&self, name: &str, body: F) -> bool
    where
        F: FnOnce(&Scope) -> R + Send + 'static,
        R: IntoTaskResult,
    {
        let child = self.child(name, true);
        if let Some(reason) = child.skip_reason() {
            child.complete_skipped(reason);
            return true;
        }

        let worker = child.clone();
        let spawned = thread::Builder::new()
            .name(child.name().to_string())
            .spawn(move || worker.execute(body));
        match spawned {
            Ok(join) => {
                self.inner.state.lock().children.push(join);
                true
            }
            Err(e) => {
                let started = Instant::now();
                child.report_start();
                child.error(format_args!("failed to start parallel scope: {e}"));
                child.finish(started);
                false
            }
        }
    }

    pub(crate) fn info(&self) -> ScopeInfo {
        ScopeInfo {
            name: self.inner.name.clone(),
            depth: self.inner.depth,
            parallel: self.inner.parallel,
            handle: self.inner.handle,
        }
    }

    pub(crate) fn execute<F, R>(&self, body: F)
    where
        F: FnOnce(&Scope) -> R,
        R: IntoTaskResult,
    {
        let started = Instant::now();
        self.report_start();

        match panic::catch_unwind(AssertUnwindSafe(|| body(self))) {
            Ok(result) => {
                if let Err(e) = result.into_task_result() {
                    self.error(e);
                }
            }
            Err(payload) => self.record_panic(payload),
        }

        self.finish(started);
    }

    fn report_start(&self) {
        self.inner.shared.reporter.lock().on_scope_start(&self.info());
    }

    fn finish(&self, started: Instant) {
        let children = std::mem::take(&mut self.inner.state.lock().children);
        for child in children {
            if child.join().is_err() {
                self.error("parallel scope thread panicked outside its body");
            }
        }

        loop {
            let next = self.inner.state.lock().cleanups.pop();
            let Some(cleanup) = next else { break };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                self.error(format_args!("cleanup panicked: {}", panic_message(payload.as_ref())));
            }
        }

        let duration = started.elapsed();
        let (failed, messages) = {
            let state = self.inner.state.lock();
            (state.failed, state.messages.clone())
        };
        let outcome = if failed {
            ScopeOutcome::Failed { duration, messages }
        } else {
            ScopeOutcome::Passed { duration, logs: messages }
        };
        self.inner.shared.record(&self.info(), outcome);
    }

    fn complete_skipped(&self, reason: String) {
        tracing::debug!(scope = %self.inner.name, "skipping scope: {}", reason);
        self.inner.shared.record(&self.info(), ScopeOutcome::Skipped(reason));
    }

    fn skip_reason(&self) -> Option<String> {
        let config = &self.inner.shared.config;
        if !config.selects(&self.inner.name) {
            let keyword = config.filter.as_deref().unwrap_or_default();
            return Some(format!("deselected by filter `{keyword}`"));
        }
        if config.fail_fast && self.inner.shared.any_failed() {
            return Some("skipped after an earlier failure".to_string());
        }
        None
    }

    fn record_panic(&self, payload: Box<dyn Any + Send>) {
        if is_fatal_abort(payload.as_ref()) {
            return;
        }
        self.error(format_args!("panicked: {}", panic_message(payload.as_ref())));
    }

    fn mark_failed(&self) {
        self.inner.shared.note_failure();
        let mut current = Some(&self.inner);
        while let Some(inner) = current {
            inner.state.lock().failed = true;
            current = inner.parent.as_ref();
        }
    }
}

/// Whether `payload` is the unwind of a [`Scope::fatal`] call, whose failure is already recorded.
pub(crate) fn is_fatal_abort(payload: &(dyn Any + Send)) -> bool {
    payload.is::<FatalAbort>()
}

/// Extract the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
