//! Per-run workspace and its cleanup stack.
//!
//! A [`Workspace`] wraps the caller's state record for one execution of a case together with a [`Lifecycle`]: the
//! run's scope plus the cleanups the tasks registered. Cleanups run in reverse order of registration when the workspace
//! is unwound, either explicitly at the end of the run or when it is dropped while a failing task unwinds the stack.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};

use crate::host::Scope;
use crate::host::scope::{is_fatal_abort, panic_message};

type Cleanup = Box<dyn FnOnce()>;

/// Scope handle and cleanup stack of one run.
pub struct Lifecycle {
    scope: Scope,
    cleanups: Vec<Cleanup>,
}

impl Lifecycle {
    fn new(scope: &Scope) -> Self {
        Self {
            scope: scope.clone(),
            cleanups: Vec::new(),
        }
    }

    /// Run every pending cleanup, newest first, and empty the stack.
    ///
    /// A panicking cleanup fails the scope; the remaining cleanups still run. A cleanup aborting with
    /// [`Scope::fatal`] has already recorded its failure.
    fn unwind(&mut self) {
        if self.cleanups.is_empty() {
            return;
        }
        tracing::debug!(scope = %self.scope.name(), pending = self.cleanups.len(), "unwinding workspace");
        while let Some(cleanup) = self.cleanups.pop() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                if is_fatal_abort(payload.as_ref()) {
                    continue;
                }
                self.scope
                    .error(format_args!("workspace cleanup panicked: {}", panic_message(payload.as_ref())));
            }
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.unwind();
    }
}

/// Caller-defined state of one run, plus its lifecycle.
///
/// Dereferences to the state record, so tasks read and write its fields directly. A workspace is created fresh for
/// every run and is only ever touched by the thread executing that run's tasks.
pub struct Workspace<W> {
    // Declared first so cleanups run before the state is dropped.
    lifecycle: Lifecycle,
    state: W,
}

impl<W> Workspace<W> {
    /// Wrap `state` with an empty cleanup stack bound to `scope`.
    pub fn create(scope: &Scope, state: W) -> Self {
        Self {
            lifecycle: Lifecycle::new(scope),
            state,
        }
    }

    /// The scope of the run owning this workspace.
    pub fn scope(&self) -> &Scope {
        &self.lifecycle.scope
    }

    pub fn state(&self) -> &W {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut W {
        &mut self.state
    }

    /// Push a cleanup; cleanups run in reverse order of registration.
    pub fn add_cleanup(&mut self, cleanup: impl FnOnce() + 'static) {
        self.lifecycle.cleanups.push(Box::new(cleanup));
    }

    /// Number of cleanups not yet run.
    pub fn cleanup_count(&self) -> usize {
        self.lifecycle.cleanups.len()
    }

    /// Run the pending cleanups now. Calling it again only runs cleanups added since.
    pub fn unwind(&mut self) {
        self.lifecycle.unwind();
    }

    /// Unwind and return the state record.
    pub fn into_inner(self) -> W {
        let Workspace { mut lifecycle, state } = self;
        lifecycle.unwind();
        state
    }
}

impl<W> Deref for Workspace<W> {
    type Target = W;

    fn deref(&self) -> &W {
        &self.state
    }
}

impl<W> DerefMut for Workspace<W> {
    fn deref_mut(&mut self) -> &mut W {
        &mut self.state
    }
}

impl<W: fmt::Debug> fmt::Debug for Workspace<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("scope", &self.lifecycle.scope.name())
            .field("pending_cleanups", &self.lifecycle.cleanups.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HarnessConfig, ReportFormat};
    use crate::host::Harness;
    use std::sync::{Arc, Mutex};

    fn quiet() -> Harness {
        Harness::new(HarnessConfig::new().with_format(ReportFormat::Quiet))
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce()>) {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&trail);
        let make = move |label: &str| -> Box<dyn FnOnce()> {
            let sink = Arc::clone(&sink);
            let label = label.to_string();
            Box::new(move || sink.lock().unwrap().push(label))
        };
        (trail, make)
    }

    #[test]
    fn test_unwind_runs_cleanups_in_reverse_order() {
        let (trail, make) = recorder();
        quiet()
            .run("root", |t| {
                let mut ws = Workspace::create(t, 0u32);
                for label in ["a", "b", "c"] {
                    ws.add_cleanup(make(label));
                }
                assert_eq!(ws.cleanup_count(), 3);
                ws.unwind();
                assert_eq!(ws.cleanup_count(), 0);
                ws.unwind();
            })
            .assert_passed();
        assert_eq!(*trail.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_drop_unwinds_pending_cleanups() {
        let (trail, make) = recorder();
        quiet()
            .run("root", |t| {
                let mut ws = Workspace::create(t, String::from("state"));
                ws.add_cleanup(make("first"));
                ws.add_cleanup(make("second"));
                ws.push_str(" mutated");
                ws.state_mut().push('!');
                assert_eq!(ws.state(), "state mutated!");
            })
            .assert_passed();
        assert_eq!(*trail.lock().unwrap(), vec!["second", "first"]);
    }

    #[test]
    fn test_panicking_cleanup_fails_scope_and_others_still_run() {
        let (trail, make) = recorder();
        let report = quiet().run("root", |t| {
            let mut ws = Workspace::create(t, ());
            ws.add_cleanup(make("a"));
            ws.add_cleanup(|| panic!("cleanup exploded"));
            ws.add_cleanup(make("c"));
        });
        assert!(!report.is_success());
        assert_eq!(*trail.lock().unwrap(), vec!["c", "a"]);
        assert_eq!(
            report.failures()[0].messages,
            vec!["workspace cleanup panicked: cleanup exploded".to_string()]
        );
    }

    #[test]
    fn test_fatal_cleanup_is_recorded_once() {
        let (trail, make) = recorder();
        let report = quiet().run("root", |t| {
            let mut ws = Workspace::create(t, ());
            let scope = ws.scope().clone();
            ws.add_cleanup(make("a"));
            ws.add_cleanup(move || scope.fatal("cleanup gave up"));
            ws.add_cleanup(make("c"));
        });
        assert!(!report.is_success());
        assert_eq!(*trail.lock().unwrap(), vec!["c", "a"]);
        assert_eq!(report.failures()[0].messages, vec!["cleanup gave up".to_string()]);
    }

    #[test]
    fn test_into_inner_unwinds_and_returns_state() {
        let (trail, make) = recorder();
        quiet()
            .run("root", |t| {
                let mut ws = Workspace::create(t, vec![1, 2]);
                ws.add_cleanup(make("done"));
                ws.push(3);
                assert_eq!(ws.scope().name(), "root");
                assert_eq!(ws.into_inner(), vec![1, 2, 3]);
            })
            .assert_passed();
        assert_eq!(*trail.lock().unwrap(), vec!["done"]);
    }
}
