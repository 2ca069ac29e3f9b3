//! Test case definition and execution.
//!
//! A [`TestCase`] is a workspace factory plus an ordered set of tasks. Building a case only records what to do; every
//! run executes a snapshot of the definition against a brand-new workspace, inside its own host scope.
//!
//! ## Lifecycle of a run
//!
//! 1. a sub-scope named after the case is opened (parallel on request)
//! 2. the given/when/then annotations are logged
//! 3. the run is registered with the [`CallbackRegistry`]
//! 4. the factory builds the workspace
//! 5. tasks run in ascending key order until one fails
//! 6. the workspace is unwound, then the registration is dropped

use std::any::type_name;
use std::fmt;
use std::panic::Location;
use std::path::Path;
use std::sync::Arc;

use casekit_core::{OrderedTaskSet, TaskKey};

use crate::error::{CaseError, CaseResult, render_diagnostic};
use crate::host::{IntoTaskResult, Scope, TaskResult};

use super::callback::{CallbackId, CallbackRegistry, CallbackTable, RunEntry, StoredCallback};
use super::workspace::Workspace;

type Task<W> = Arc<dyn Fn(&Scope, &mut Workspace<W>) -> TaskResult + Send + Sync>;
type Factory<W> = Arc<dyn Fn(&Scope) -> W + Send + Sync>;

/// `file.rs:line` of a call site.
fn locator_of(location: &Location<'_>) -> String {
    let file = Path::new(location.file())
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| location.file().to_string());
    format!("{}:{}", file, location.line())
}

// ============================================================================
// Case trait
// ============================================================================

/// A runnable case, as seen by the list runner.
///
/// Object safe, so lists of cases with different workspace types can be held as `Box<dyn Case>`.
pub trait Case {
    /// Explicit name, or the locator of the call site that built the case.
    fn name(&self) -> &str;

    fn is_excluded(&self) -> bool;

    fn excludes_others(&self) -> bool;

    /// Start one run of the case in a sub-scope of `scope`.
    ///
    /// ## Returns
    /// - `Ok(())` once the run was started; task failures are reported through the sub-scope.
    /// - `Err` for a case that cannot run at all, before any scope is opened.
    fn execute(&self, scope: &Scope, parallel: bool) -> CaseResult<()>;
}

impl<C: Case + ?Sized> Case for &C {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_excluded(&self) -> bool {
        (**self).is_excluded()
    }

    fn excludes_others(&self) -> bool {
        (**self).excludes_others()
    }

    fn execute(&self, scope: &Scope, parallel: bool) -> CaseResult<()> {
        (**self).execute(scope, parallel)
    }
}

impl<C: Case + ?Sized> Case for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_excluded(&self) -> bool {
        (**self).is_excluded()
    }

    fn excludes_others(&self) -> bool {
        (**self).excludes_others()
    }

    fn execute(&self, scope: &Scope, parallel: bool) -> CaseResult<()> {
        (**self).execute(scope, parallel)
    }
}

// ============================================================================
// TestCase
// ============================================================================

/// One logical test: an ordered set of tasks sharing a per-run workspace of type `W`, ordered by keys of type `K`.
pub struct TestCase<W, K = i64> {
    factory: Factory<W>,
    tasks: OrderedTaskSet<K, Task<W>>,
    given: Option<String>,
    when: Option<String>,
    then: Option<String>,
    locator: String,
    name: Option<String>,
    excluded: bool,
    excludes_others: bool,
    callbacks: CallbackTable,
    build_error: Option<CaseError>,
}

impl<W, K: Clone> Clone for TestCase<W, K> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            tasks: self.tasks.clone(),
            given: self.given.clone(),
            when: self.when.clone(),
            then: self.then.clone(),
            locator: self.locator.clone(),
            name: self.name.clone(),
            excluded: self.excluded,
            excludes_others: self.excludes_others,
            callbacks: self.callbacks.clone(),
            build_error: self.build_error.clone(),
        }
    }
}

impl<W: Default + 'static, K: TaskKey> TestCase<W, K> {
    /// Create a case whose workspace starts as `W::default()`.
    #[track_caller]
    pub fn new() -> Self {
        Self::with_factory(|_| W::default())
    }
}

impl<W: Default + 'static, K: TaskKey> Default for TestCase<W, K> {
    #[track_caller]
    fn default() -> Self {
        Self::new()
    }
}

impl<W: 'static, K: TaskKey> TestCase<W, K> {
    /// Create a case whose workspace is built by `factory` at the start of every run.
    #[track_caller]
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&Scope) -> W + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            tasks: OrderedTaskSet::new(),
            given: None,
            when: None,
            then: None,
            locator: locator_of(Location::caller()),
            name: None,
            excluded: false,
            excludes_others: false,
            callbacks: CallbackTable::new(),
            build_error: None,
        }
    }

    // ========================================
    // Building
    // ========================================

    /// Add a task under `key`; tasks run in ascending key order.
    ///
    /// A duplicate key keeps the first task and is reported when the case is run.
    ///
    /// A closure whose body always diverges (only a `panic!` or [`Scope::fatal`]) needs an explicit `-> ()` return
    /// type, since `!` is not an accepted task result.
    pub fn add_task<F, R>(mut self, key: K, task: F) -> Self
    where
        F: Fn(&Scope, &mut Workspace<W>) -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        if let Err(e) = self.insert_task(key, task) {
            tracing::error!(case = %self.name(), "{}", e);
            self.build_error.get_or_insert(e);
        }
        self
    }

    /// Same as [`TestCase::add_task`].
    pub fn add_step<F, R>(self, key: K, step: F) -> Self
    where
        F: Fn(&Scope, &mut Workspace<W>) -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        self.add_task(key, step)
    }

    /// Add a task under `key`, failing right away on a duplicate key.
    pub fn try_add_task<F, R>(&mut self, key: K, task: F) -> CaseResult<&mut Self>
    where
        F: Fn(&Scope, &mut Workspace<W>) -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        self.insert_task(key, task)?;
        Ok(self)
    }

    /// Same as [`TestCase::try_add_task`].
    pub fn try_add_step<F, R>(&mut self, key: K, step: F) -> CaseResult<&mut Self>
    where
        F: Fn(&Scope, &mut Workspace<W>) -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        self.try_add_task(key, step)
    }

    fn insert_task<F, R>(&mut self, key: K, task: F) -> CaseResult<()>
    where
        F: Fn(&Scope, &mut Workspace<W>) -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        let task: Task<W> =
            Arc::new(move |scope: &Scope, workspace: &mut Workspace<W>| task(scope, workspace).into_task_result());
        self.tasks.insert(key, task)?;
        Ok(())
    }

    pub fn given(mut self, given: impl Into<String>) -> Self {
        self.given = Some(given.into());
        self
    }

    pub fn when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }

    pub fn then(mut self, then: impl Into<String>) -> Self {
        self.then = Some(then.into());
        self
    }

    /// Name the case's scope `name` instead of its locator.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Skip this case when it is run as part of a list.
    pub fn exclude(mut self) -> Self {
        self.excluded = true;
        self
    }

    /// Run only this case when it is run as part of a list.
    pub fn exclude_others(mut self) -> Self {
        self.excludes_others = true;
        self
    }

    /// Declare the callback `id`, invoked without arguments.
    ///
    /// Declaring an id again replaces the earlier callback.
    pub fn register_callback<F, R>(self, id: impl Into<CallbackId>, callback: F) -> Self
    where
        F: Fn(&Scope, &mut Workspace<W>) -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        self.register_callback_with(id, move |scope: &Scope, workspace: &mut Workspace<W>, (): ()| {
            callback(scope, workspace)
        })
    }

    /// Declare the callback `id`, invoked with arguments of type `A`.
    pub fn register_callback_with<A, F, R>(mut self, id: impl Into<CallbackId>, callback: F) -> Self
    where
        A: 'static,
        F: Fn(&Scope, &mut Workspace<W>, A) -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        self.callbacks.insert(id.into(), StoredCallback::new(callback));
        self
    }

    /// Independent copy of this case, located at the caller.
    ///
    /// Tasks and callbacks added to the copy are not seen by the original, and the reverse.
    #[track_caller]
    pub fn copy(&self) -> Self {
        let mut copy = self.clone();
        copy.locator = locator_of(Location::caller());
        copy
    }

    // ========================================
    // Introspection
    // ========================================

    /// `file.rs:line` of the call that created this case.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Explicit name, or the locator.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.locator)
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn excludes_others(&self) -> bool {
        self.excludes_others
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Task keys in execution order.
    pub fn task_keys(&self) -> Vec<K> {
        self.tasks.keys().copied().collect()
    }

    /// Declared callback ids, sorted by their display text.
    pub fn callback_ids(&self) -> Vec<CallbackId> {
        let mut ids: Vec<CallbackId> = self.callbacks.keys().cloned().collect();
        ids.sort_by_cached_key(ToString::to_string);
        ids
    }

    /// First error recorded while building, if any.
    pub fn build_error(&self) -> Option<&CaseError> {
        self.build_error.as_ref()
    }

    /// Render the declared shape of the case.
    ///
    /// ```text
    /// Workspace Type: my_tests::Login
    /// Task Keys: -10, 0, 20
    /// Callback IDs: check, init
    /// ```
    pub fn dump(&self) -> String {
        let keys: Vec<String> = self.tasks.keys().map(ToString::to_string).collect();
        let ids: Vec<String> = self.callback_ids().iter().map(ToString::to_string).collect();
        format!(
            "Workspace Type: {}\nTask Keys: {}\nCallback IDs: {}",
            type_name::<W>(),
            keys.join(", "),
            ids.join(", ")
        )
    }

    // ========================================
    // Execution
    // ========================================

    /// Run the case in a sub-scope of `scope`.
    ///
    /// See [`Case::execute`] for the returned errors.
    pub fn run(&self, scope: &Scope) -> CaseResult<()> {
        self.start(scope, false)
    }

    /// Run the case in a sub-scope of `scope` that runs concurrently with its parallel siblings.
    pub fn run_parallel(&self, scope: &Scope) -> CaseResult<()> {
        self.start(scope, true)
    }

    #[tracing::instrument(skip_all, fields(case = %self.name(), parallel = parallel))]
    fn start(&self, scope: &Scope, parallel: bool) -> CaseResult<()> {
        if let Some(source) = &self.build_error {
            return Err(CaseError::BuildFailed {
                case: self.name().to_string(),
                source: Box::new(source.clone()),
            });
        }
        if self.tasks.is_empty() {
            return Err(CaseError::NoTasks {
                case: self.name().to_string(),
            });
        }

        let case = self.clone();
        let name = self.name().to_string();
        if parallel {
            scope.run_parallel(&name, move |t| case.run_tasks(t));
        } else {
            scope.run(&name, move |t| case.run_tasks(t));
        }
        Ok(())
    }

    /// Body of the run's scope.
    fn run_tasks(self, scope: &Scope) {
        if let Some(annotations) = self.annotations() {
            scope.log(annotations);
        }

        let TestCase {
            factory,
            tasks,
            callbacks,
            locator,
            name,
            ..
        } = self;
        let display = name.unwrap_or(locator);

        let entry = RunEntry::new::<W>(display, callbacks);
        let _registration = match CallbackRegistry::global().register(scope.handle(), entry) {
            Ok(registration) => registration,
            Err(e) => scope.fatal(render_diagnostic(&e)),
        };

        // Dropped before the registration, so cleanups can still reach the callbacks.
        let mut workspace = Workspace::create(scope, factory(scope));
        for (key, task) in tasks.iter() {
            tracing::debug!(scope = %scope.name(), %key, "running task");
            if let Err(e) = task(scope, &mut workspace) {
                scope.error(format_args!("task {key} failed: {e}"));
                break;
            }
        }
        workspace.unwind();
    }

    /// `GIVEN`/`WHEN`/`THEN` lines for the annotations that are set.
    fn annotations(&self) -> Option<String> {
        let lines: Vec<String> = [("GIVEN", &self.given), ("WHEN", &self.when), ("THEN", &self.then)]
            .into_iter()
            .filter_map(|(label, text)| {
                text.as_deref()
                    .filter(|text| !text.is_empty())
                    .map(|text| format!("{label} {text}"))
            })
            .collect();
        if lines.is_empty() { None } else { Some(lines.join("\n")) }
    }
}

impl<W: 'static, K: TaskKey> Case for TestCase<W, K> {
    fn name(&self) -> &str {
        TestCase::name(self)
    }

    fn is_excluded(&self) -> bool {
        self.excluded
    }

    fn excludes_others(&self) -> bool {
        self.excludes_others
    }

    fn execute(&self, scope: &Scope, parallel: bool) -> CaseResult<()> {
        self.start(scope, parallel)
    }
}

impl<W, K: TaskKey> fmt::Debug for TestCase<W, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("locator", &self.locator)
            .field("name", &self.name)
            .field("tasks", &self.tasks.len())
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .field("excluded", &self.excluded)
            .field("excludes_others", &self.excludes_others)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HarnessConfig, ReportFormat};
    use crate::host::{Harness, Reporter, ScopeInfo, ScopeOutcome, Summary};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Trail {
        steps: Vec<String>,
    }

    fn quiet() -> Harness {
        Harness::new(HarnessConfig::new().with_format(ReportFormat::Quiet))
    }

    fn push(label: &'static str) -> impl Fn(&Scope, &mut Workspace<Trail>) + Send + Sync + 'static {
        move |_, w| w.steps.push(label.to_string())
    }

    // ========================================
    // Builder tests
    // ========================================

    #[test]
    fn test_locator_points_at_the_caller() {
        let case = TestCase::<Trail>::new();
        let expected = format!("case.rs:{}", line!() - 1);
        assert_eq!(case.locator(), expected);
        assert_eq!(case.name(), expected);

        let copy = case.copy();
        assert_eq!(copy.locator(), format!("case.rs:{}", line!() - 1));
        assert_eq!(case.named("login").name(), "login");
    }

    #[test]
    fn test_duplicate_key_is_deferred_and_keeps_first_task() {
        let case = TestCase::<Trail>::new()
            .add_task(1, push("first"))
            .add_task(1, push("second"))
            .add_task(2, push("third"))
            .add_step(2, push("fourth"));
        assert_eq!(case.task_count(), 2);
        assert_eq!(case.build_error(), Some(&CaseError::DuplicateKey { key: "1".to_string() }));
    }

    #[test]
    fn test_try_add_task_fails_immediately() {
        let mut case = TestCase::<Trail, u8>::new();
        case.try_add_task(3, push("a")).unwrap().try_add_step(1, push("b")).unwrap();
        let err = case.try_add_task(3, push("c")).err();
        assert_eq!(err, Some(CaseError::DuplicateKey { key: "3".to_string() }));
        assert_eq!(case.task_keys(), vec![1, 3]);
        assert!(case.build_error().is_none());
    }

    #[test]
    fn test_copy_is_independent() {
        let base = TestCase::<Trail>::new()
            .add_task(10, push("base"))
            .register_callback("init", |_: &Scope, _: &mut Workspace<Trail>| {});
        let copy = base
            .copy()
            .add_task(20, push("extra"))
            .register_callback("check", |_: &Scope, _: &mut Workspace<Trail>| {});
        assert_eq!(base.task_keys(), vec![10]);
        assert_eq!(copy.task_keys(), vec![10, 20]);
        assert_eq!(base.callback_ids(), vec![CallbackId::from("init")]);
        assert_eq!(copy.callback_ids().len(), 2);
    }

    #[test]
    fn test_dump_lists_keys_and_sorted_callbacks() {
        let case = TestCase::<Trail>::new()
            .add_task(20, push("b"))
            .add_task(-10, push("a"))
            .register_callback("zeta", |_: &Scope, _: &mut Workspace<Trail>| {})
            .register_callback(7, |_: &Scope, _: &mut Workspace<Trail>| {})
            .register_callback("alpha", |_: &Scope, _: &mut Workspace<Trail>| {});
        insta::assert_snapshot!(case.dump(), @r"
        Workspace Type: casekit::engine::case::tests::Trail
        Task Keys: -10, 20
        Callback IDs: 7, alpha, zeta
        ");
    }

    // ========================================
    // Execution tests
    // ========================================

    #[test]
    fn test_run_executes_tasks_in_key_order_with_fresh_workspace() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let case = TestCase::<Trail>::new()
            .add_task(3001, push("3001"))
            .add_task(-5000, push("-5000"))
            .add_task(1010, push("1010"))
            .add_task(9999, move |_, w| sink.lock().unwrap().push(w.steps.join(",")));
        quiet()
            .run("root", |t| {
                case.run(t).unwrap();
                case.run(t).unwrap();
            })
            .assert_passed();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["-5000,1010,3001".to_string(), "-5000,1010,3001".to_string()]
        );
    }

    #[test]
    fn test_failing_task_stops_the_run() {
        let case = TestCase::<Trail>::new()
            .named("stops")
            .add_task(1, |_: &Scope, _: &mut Workspace<Trail>| -> Result<(), String> { Err("boom".to_string()) })
            .add_task(2, |t: &Scope, _: &mut Workspace<Trail>| t.error("must not run"));
        let report = quiet().run("root", |t| case.run(t));
        assert!(!report.is_success());
        assert_eq!(report.failures()[0].name, "root/stops");
        assert_eq!(report.failures()[0].messages, vec!["task 1 failed: boom".to_string()]);
    }

    #[test]
    fn test_annotations_are_logged() {
        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<(String, Vec<String>)>>>);

        impl Reporter for Capture {
            fn on_scope_complete(&mut self, scope: &ScopeInfo, outcome: &ScopeOutcome) {
                if let ScopeOutcome::Passed { logs, .. } = outcome {
                    self.0.lock().unwrap().push((scope.name.clone(), logs.clone()));
                }
            }

            fn on_run_complete(&mut self, _summary: &Summary) {}
        }

        let capture = Capture::default();
        let case = TestCase::<Trail>::new()
            .named("annotated")
            .given("a user")
            .when("")
            .then("it works")
            .add_task(1, push("x"));
        let blank = TestCase::<Trail>::new()
            .named("blank")
            .given("")
            .when("")
            .then("")
            .add_task(1, push("x"));
        Harness::new(HarnessConfig::new())
            .with_reporter(capture.clone())
            .run("root", |t| {
                case.run(t)?;
                blank.run(t)
            })
            .assert_passed();

        let completed = capture.0.lock().unwrap();
        assert_eq!(
            completed[0],
            ("root/annotated".to_string(), vec!["GIVEN a user\nTHEN it works".to_string()])
        );
        assert_eq!(completed[1], ("root/blank".to_string(), Vec::<String>::new()));
        assert_eq!(TestCase::<Trail>::new().annotations(), None);
    }

    #[test]
    fn test_diverging_tasks_abort_the_run() {
        let case = TestCase::<Trail>::new()
            .named("diverges")
            .add_task(1, |t: &Scope, _: &mut Workspace<Trail>| -> () { t.fatal("gave up") })
            .add_task(2, |t: &Scope, _: &mut Workspace<Trail>| t.error("must not run"));
        let report = quiet().run("root", |t| case.run(t));
        assert!(!report.is_success());
        assert_eq!(report.failures()[0].messages, vec!["gave up".to_string()]);
    }

    #[test]
    fn test_unrunnable_cases_return_errors() {
        let empty = TestCase::<Trail>::new().named("empty");
        let broken = TestCase::<Trail>::new()
            .named("broken")
            .add_task(1, push("a"))
            .add_task(1, push("b"));
        quiet()
            .run("root", |t| {
                assert_eq!(empty.run(t), Err(CaseError::NoTasks { case: "empty".to_string() }));
                match broken.run(t) {
                    Err(CaseError::BuildFailed { case, source }) => {
                        assert_eq!(case, "broken");
                        assert_eq!(*source, CaseError::DuplicateKey { key: "1".to_string() });
                    }
                    other => panic!("expected BuildFailed, got {other:?}"),
                }
            })
            .assert_passed();
    }
}
