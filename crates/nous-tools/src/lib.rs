//! Tool model, registry and the event-wrapped executor.
//!
//! Every permitted [`ToolExecutor::run`] call records `tool.invoked` and then
//! exactly one of `tool.completed`, `tool.failed` or `tool.timeout`.

mod builtin;
mod executor;
mod registry;
mod tool;

pub use builtin::{FS_READ, FS_WRITE};
pub use executor::ToolExecutor;
pub use registry::ToolRegistry;
pub use tool::{AtomicTool, FnHandler, ToolContext, ToolHandler, ToolPermission, ToolSource};
