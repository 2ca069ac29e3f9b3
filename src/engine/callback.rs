//! Extension points of running cases.
//!
//! A case declares named callbacks while it is being built. When one of its runs starts, the run's callback table is
//! registered in a process-wide [`CallbackRegistry`] under the run's [`RunHandle`]; tasks of that run look callbacks up
//! through their scope and invoke them with the workspace they are mutating.
//!
//! Callbacks are stored type-erased. The argument type is recorded at registration and checked on every invocation,
//! as is the workspace type of the run.

use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{CaseError, CaseResult};
use crate::host::{IntoTaskResult, RunHandle, Scope, TaskResult};

use super::workspace::Workspace;

// ============================================================================
// Identifiers and stored callbacks
// ============================================================================

/// Name of an extension point: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallbackId {
    Name(String),
    Number(i64),
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackId::Name(name) => f.write_str(name),
            CallbackId::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<&str> for CallbackId {
    fn from(name: &str) -> Self {
        CallbackId::Name(name.to_string())
    }
}

impl From<String> for CallbackId {
    fn from(name: String) -> Self {
        CallbackId::Name(name)
    }
}

impl From<i64> for CallbackId {
    fn from(number: i64) -> Self {
        CallbackId::Number(number)
    }
}

impl From<i32> for CallbackId {
    fn from(number: i32) -> Self {
        CallbackId::Number(i64::from(number))
    }
}

impl From<u32> for CallbackId {
    fn from(number: u32) -> Self {
        CallbackId::Number(i64::from(number))
    }
}

/// Runtime identity of a type, with its name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    pub(crate) fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

type CallbackFn<W, A> = dyn Fn(&Scope, &mut Workspace<W>, A) -> TaskResult + Send + Sync;

/// A type-erased callback together with the argument type it accepts.
#[derive(Clone)]
pub(crate) struct StoredCallback {
    args: TypeInfo,
    // Holds an `Arc<CallbackFn<W, A>>`.
    call: Arc<dyn Any + Send + Sync>,
}

impl StoredCallback {
    pub(crate) fn new<W, A, F, R>(callback: F) -> Self
    where
        W: 'static,
        A: 'static,
        F: Fn(&Scope, &mut Workspace<W>, A) -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        let call: Arc<CallbackFn<W, A>> =
            Arc::new(move |scope: &Scope, workspace: &mut Workspace<W>, args: A| {
                callback(scope, workspace, args).into_task_result()
            });
        Self {
            args: TypeInfo::of::<A>(),
            call: Arc::new(call),
        }
    }

    fn downcast<W: 'static, A: 'static>(&self) -> Option<Arc<CallbackFn<W, A>>> {
        self.call.downcast_ref::<Arc<CallbackFn<W, A>>>().cloned()
    }
}

/// Callbacks of one case, keyed by id.
pub(crate) type CallbackTable = BTreeMap<CallbackId, StoredCallback>;

// ============================================================================
// Registry
// ============================================================================

/// What the registry knows about one live run.
pub struct RunEntry {
    case: String,
    workspace: TypeInfo,
    callbacks: Arc<CallbackTable>,
}

impl RunEntry {
    pub(crate) fn new<W: 'static>(case: impl Into<String>, callbacks: CallbackTable) -> Self {
        Self {
            case: case.into(),
            workspace: TypeInfo::of::<W>(),
            callbacks: Arc::new(callbacks),
        }
    }

    /// Display name of the running case.
    pub fn case(&self) -> &str {
        &self.case
    }

    /// Type name of the run's workspace state.
    pub fn workspace_type(&self) -> &'static str {
        self.workspace.name
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }
}

static GLOBAL: Lazy<CallbackRegistry> = Lazy::new(CallbackRegistry::new);

/// Table from run handle to the callback table of that run.
///
/// The table sits behind one shared-read lock. Every operation holds it for a single lookup, insert or removal;
/// callbacks are invoked after it is released, so a callback may invoke further callbacks.
#[derive(Default)]
pub struct CallbackRegistry {
    runs: RwLock<HashMap<RunHandle, Arc<RunEntry>>>,
}

impl CallbackRegistry {
    /// Create an empty registry, independent of the global one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by running cases.
    pub fn global() -> &'static CallbackRegistry {
        &GLOBAL
    }

    /// Register the run `handle`.
    ///
    /// ## Returns
    /// - A guard that removes the entry when dropped.
    /// - `Err(CaseError::RunAlreadyRegistered)` if the handle is already live.
    pub fn register(&self, handle: RunHandle, entry: RunEntry) -> CaseResult<Registration<'_>> {
        let mut runs = self.runs.write();
        if runs.contains_key(&handle) {
            return Err(CaseError::RunAlreadyRegistered { handle });
        }
        tracing::debug!(%handle, case = %entry.case, "registering run");
        runs.insert(handle, Arc::new(entry));
        Ok(Registration { registry: self, handle })
    }

    /// Remove the run `handle`; returns whether it was registered.
    pub fn unregister(&self, handle: RunHandle) -> bool {
        let removed = self.runs.write().remove(&handle).is_some();
        if removed {
            tracing::debug!(%handle, "unregistered run");
        }
        removed
    }

    pub fn is_registered(&self, handle: RunHandle) -> bool {
        self.runs.read().contains_key(&handle)
    }

    /// Number of live runs.
    pub fn active_runs(&self) -> usize {
        self.runs.read().len()
    }

    /// Entry of the live run `handle`.
    pub fn entry(&self, handle: RunHandle) -> CaseResult<Arc<RunEntry>> {
        self.runs
            .read()
            .get(&handle)
            .cloned()
            .ok_or(CaseError::NoActiveRun { handle })
    }

    /// Whether the run of `scope` declares the callback `id`.
    pub fn has_callback(&self, scope: &Scope, id: &CallbackId) -> bool {
        self.entry(scope.handle())
            .map(|entry| entry.callbacks.contains_key(id))
            .unwrap_or(false)
    }

    /// Invoke the callback `id` of the run of `scope`.
    ///
    /// ## Parameters
    /// - `scope`: the scope of the running case, as handed to its tasks.
    /// - `id`: the extension point.
    /// - `workspace`: the workspace of the run, lent by the calling task.
    /// - `args`: passed to the callback; must have the type it was registered with.
    ///
    /// ## Returns
    /// - `Ok(())` once the callback returned successfully.
    /// - `Err(CaseError::NoActiveRun)`, `UnknownCallback`, `InvalidFactoryShape` or `ShapeMismatch` when the lookup
    ///   fails, in that order of checking.
    /// - `Err(CaseError::CallbackFailed)` when the callback returned an error.
    pub fn invoke_with<W, A>(
        &self,
        scope: &Scope,
        id: &CallbackId,
        workspace: &mut Workspace<W>,
        args: A,
    ) -> CaseResult<()>
    where
        W: 'static,
        A: 'static,
    {
        match self.resolve::<W, A>(scope, id)? {
            Some(callback) => call(scope, id, callback.as_ref(), workspace, args),
            None => {
                let case = self.entry(scope.handle()).map(|e| e.case.clone()).unwrap_or_default();
                Err(CaseError::UnknownCallback { id: id.to_string(), case })
            }
        }
    }

    /// Like [`CallbackRegistry::invoke_with`], but an undeclared callback is skipped.
    ///
    /// ## Returns
    /// - (`bool`): whether the callback was declared and ran.
    pub fn invoke_optional_with<W, A>(
        &self,
        scope: &Scope,
        id: &CallbackId,
        workspace: &mut Workspace<W>,
        args: A,
    ) -> CaseResult<bool>
    where
        W: 'static,
        A: 'static,
    {
        match self.resolve::<W, A>(scope, id)? {
            Some(callback) => call(scope, id, callback.as_ref(), workspace, args).map(|()| true),
            None => Ok(false),
        }
    }

    /// Look up the callback `id` and check it against the workspace and argument types of the caller.
    ///
    /// Only the entry is cloned out under the lock.
    fn resolve<W: 'static, A: 'static>(
        &self,
        scope: &Scope,
        id: &CallbackId,
    ) -> CaseResult<Option<Arc<CallbackFn<W, A>>>> {
        let entry = self.entry(scope.handle())?;
        let Some(stored) = entry.callbacks.get(id) else {
            return Ok(None);
        };
        if !entry.workspace.is::<W>() {
            return Err(CaseError::InvalidFactoryShape {
                expected: entry.workspace.name.to_string(),
                found: type_name::<W>().to_string(),
            });
        }
        match stored.downcast::<W, A>() {
            Some(callback) => Ok(Some(callback)),
            None => Err(CaseError::ShapeMismatch {
                id: id.to_string(),
                expected: stored.args.name.to_string(),
                found: type_name::<A>().to_string(),
            }),
        }
    }
}

fn call<W: 'static, A: 'static>(
    scope: &Scope,
    id: &CallbackId,
    callback: &CallbackFn<W, A>,
    workspace: &mut Workspace<W>,
    args: A,
) -> CaseResult<()> {
    tracing::debug!(scope = %scope.name(), callback = %id, "invoking callback");
    callback(scope, workspace, args).map_err(|e| CaseError::CallbackFailed {
        id: id.to_string(),
        message: e.to_string(),
    })
}

/// Live registration of one run; unregisters it when dropped.
#[must_use = "the run is unregistered as soon as the registration is dropped"]
pub struct Registration<'a> {
    registry: &'a CallbackRegistry,
    handle: RunHandle,
}

impl Registration<'_> {
    pub fn handle(&self) -> RunHandle {
        self.handle
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.handle);
    }
}

// ============================================================================
// Invocation from tasks
// ============================================================================

/// Invoke the callback `id` of the running case, without arguments.
///
/// See [`CallbackRegistry::invoke_with`] for the failure modes.
pub fn invoke_callback<W: 'static>(
    scope: &Scope,
    id: impl Into<CallbackId>,
    workspace: &mut Workspace<W>,
) -> CaseResult<()> {
    CallbackRegistry::global().invoke_with(scope, &id.into(), workspace, ())
}

/// Invoke the callback `id` of the running case with `args`.
pub fn invoke_callback_with<W: 'static, A: 'static>(
    scope: &Scope,
    id: impl Into<CallbackId>,
    workspace: &mut Workspace<W>,
    args: A,
) -> CaseResult<()> {
    CallbackRegistry::global().invoke_with(scope, &id.into(), workspace, args)
}

/// Invoke the callback `id` if the running case declares it.
///
/// ## Returns
/// - (`bool`): whether the callback ran.
pub fn invoke_optional_callback<W: 'static>(
    scope: &Scope,
    id: impl Into<CallbackId>,
    workspace: &mut Workspace<W>,
) -> CaseResult<bool> {
    CallbackRegistry::global().invoke_optional_with(scope, &id.into(), workspace, ())
}

/// Invoke the callback `id` with `args` if the running case declares it.
pub fn invoke_optional_callback_with<W: 'static, A: 'static>(
    scope: &Scope,
    id: impl Into<CallbackId>,
    workspace: &mut Workspace<W>,
    args: A,
) -> CaseResult<bool> {
    CallbackRegistry::global().invoke_optional_with(scope, &id.into(), workspace, args)
}

/// Whether the running case declares the callback `id`.
pub fn has_callback(scope: &Scope, id: impl Into<CallbackId>) -> bool {
    CallbackRegistry::global().has_callback(scope, &id.into())
}
