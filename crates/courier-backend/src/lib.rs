//! # courier-backend
//!
//! Backend implementations: the `claude` CLI subprocess invoker for chat
//! turns, and the task runner for long-running work.

pub mod claude_code;
pub mod task_runner;

pub use claude_code::ClaudeCodeBackend;
pub use task_runner::TaskRunner;
