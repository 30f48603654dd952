//! Skills - reusable execution profiles.
//!
//! A [`Skill`] bundles an instruction preamble, a default model and the names
//! of the tools it may use. The executor treats it as read-only input.

mod builtin;
mod loader;

pub use builtin::{builtin_skills, default_skills};
pub use loader::{load_skills_dir, SkillFile};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::{ToolError, ToolRegistry, ToolSet};

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill not found: {0}")]
    NotFound(String),

    #[error("tool not found for skill {skill}: {tool}")]
    MissingTool { skill: String, tool: String },
}

/// Immutable behavior descriptor for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Instruction preamble placed at the top of the system turn.
    pub system_prompt: String,
    /// Permitted tool names.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    /// Empty means "use the executor's default model".
    #[serde(default)]
    pub default_model: String,
}

impl Skill {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            examples: Vec::new(),
            default_model: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Resolve the tool subset this skill is permitted to use.
    pub fn resolve_tools(&self, tools: &ToolRegistry) -> Result<ToolSet, SkillError> {
        tools.subset(&self.tools).map_err(|e| match e {
            ToolError::NotFound(tool) => SkillError::MissingTool {
                skill: self.name.clone(),
                tool,
            },
        })
    }
}

/// Named skills available to the application.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, Arc<Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in skill.
    pub fn with_builtins() -> Self {
        Self::from_skills(builtin_skills())
    }

    /// Only the general-purpose built-ins.
    pub fn with_defaults() -> Self {
        Self::from_skills(default_skills())
    }

    fn from_skills(skills: Vec<Skill>) -> Self {
        let mut registry = Self::new();
        for skill in skills {
            registry.register(skill);
        }
        registry
    }

    pub fn register(&mut self, skill: Skill) {
        self.skills.insert(skill.name.clone(), Arc::new(skill));
    }

    pub fn get(&self, name: &str) -> Result<Arc<Skill>, SkillError> {
        self.skills
            .get(name)
            .cloned()
            .ok_or_else(|| SkillError::NotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<Arc<Skill>> {
        self.skills.values().cloned().collect()
    }

    /// Resolve the tool subset a registered skill is permitted to use.
    pub fn tools_for(&self, name: &str, tools: &ToolRegistry) -> Result<ToolSet, SkillError> {
        self.get(name)?.resolve_tools(tools)
    }

    /// Tool names referenced by skills but absent from `tools`, keyed by skill.
    pub fn missing_tools(&self, tools: &ToolRegistry) -> BTreeMap<String, Vec<String>> {
        let mut missing = BTreeMap::new();
        for skill in self.skills.values() {
            let absent: Vec<String> = skill
                .tools
                .iter()
                .filter(|t| !tools.has_tool(t))
                .cloned()
                .collect();
            if !absent.is_empty() {
                missing.insert(skill.name.clone(), absent);
            }
        }
        missing
    }
}
