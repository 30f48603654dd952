//! # skill_agent
//!
//! A bounded tool-using agent loop over OpenAI-compatible chat models.
//!
//! This library provides:
//! - An [`agent::Executor`] that alternates model queries and tool invocations
//! - Skills describing instructions, permitted tools and a default model
//! - Projects that scope a skill with an extra preamble, tools and model
//! - A tool catalog with built-in tools and closure-backed custom tools
//! - Integration with OpenRouter for LLM access, plus a scripted mock
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Build context with the skill's system prompt and available tools
//! 2. Check the character budget, call the LLM, execute any tool calls
//! 3. Feed results back to the LLM, repeat until it answers or a limit is hit
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skill_agent::{agent::Executor, llm::MockLlmClient, skills::SkillRegistry, tools::ToolRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let skills = SkillRegistry::with_builtins();
//! let tools = skills.tools_for("tutor", &ToolRegistry::with_safe_defaults())?;
//! let profile = skills.get("tutor")?;
//! let executor = Executor::new(Arc::new(MockLlmClient::default()));
//! let report = executor.run_default("What is 2+2?", &profile, &tools, &CancellationToken::new()).await?;
//! println!("{}", report.outcome);
//! ```

pub mod agent;
pub mod config;
pub mod conversation;
pub mod llm;
pub mod project;
pub mod skills;
pub mod tools;

pub use config::Config;
