//! # Tasks
//!
//! The data model of the worker core: typed arguments and results, task
//! signatures, lifecycle states, and the binding layer that turns a
//! signature's arguments into a concrete invocation.

pub mod args;
pub mod invocable;
pub mod signature;
pub mod states;

pub use args::{humanize_results, TaskArg, TaskResult};
pub use invocable::{
    task_fn, BindError, BoundTask, CallError, CallResult, FromTaskArg, TaskFn, TaskHandler,
};
pub use signature::Signature;
pub use states::{TaskState, TaskStateRecord};
