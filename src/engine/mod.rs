//! Test-case orchestration engine
//!
//! - [`workspace`]: per-run state and its cleanup stack
//! - [`case`]: the [`TestCase`] builder and its execution
//! - [`callback`]: extension points and the registry of live runs
//! - [`list`]: running lists of cases with exclude/focus controls
//!
//! ## Example
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct Login {
//!     user: String,
//!     token: Option<String>,
//! }
//!
//! fn base() -> TestCase<Login> {
//!     TestCase::new()
//!         .add_task(10, |_, w| w.user = "alice".to_string())
//!         .add_task(20, |t, w| invoke_callback(t, "login", w))
//!         .add_task(30, |t, w| {
//!             if w.token.is_none() {
//!                 t.error("no token");
//!             }
//!         })
//! }
//! ```

pub mod callback;
pub mod case;
pub mod list;
pub mod workspace;

pub use callback::{
    CallbackId, CallbackRegistry, Registration, RunEntry, has_callback, invoke_callback, invoke_callback_with,
    invoke_optional_callback, invoke_optional_callback_with,
};
pub use case::{Case, TestCase};
pub use list::{run_list, run_list_parallel};
pub use workspace::{Lifecycle, Workspace};
