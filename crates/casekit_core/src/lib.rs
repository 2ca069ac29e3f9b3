//! Provide the ordering vocabulary shared by the casekit engine: task keys and the ordered task set.
//!
//! This crate is intentionally small and dependency-light. It contains deterministic helpers that the engine uses to
//! decide in which order the work items of one test case run.
//!
//! ## Notes
//!
//! - This is a "semantic core" crate: **no IO**, no global state, and no engine or host types.
//! - Current scope: key comparison policy (integers and IEEE reals) and the keyed, ascending-order task set.

pub mod errors;
pub mod keys;
pub mod task_set;

pub use errors::TaskSetError;
pub use keys::TaskKey;
pub use task_set::OrderedTaskSet;
