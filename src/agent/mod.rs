//! Agent module - the tool orchestration loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context with the skill's instructions, the tool catalog and the task
//! 2. Check the character budget, then ask the model for its next action
//! 3. If the model requests tools, run them in order and feed every result back
//! 4. Repeat until the model answers, the budget runs out or steps are exhausted

pub mod budget;
pub mod dispatch;
mod executor;
pub mod prompt;
pub mod protocol;

pub use executor::{
    BatchJob, Executor, Limits, LogEntryType, RunError, RunLogEntry, RunOutcome, RunReport,
};
pub use prompt::build_system_prompt;
pub use protocol::ModelAction;
