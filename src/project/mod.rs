//! Projects - named scopes layered over a skill.
//!
//! A [`Project`] adds its own preamble in front of a skill's instructions,
//! can narrow which skills may run under it, and can replace the skill's tool
//! list and default model.

mod loader;

pub use loader::load_projects_dir;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::skills::Skill;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project not found: {0}")]
    NotFound(String),

    #[error("skill {skill} is not enabled in project {project}")]
    SkillNotAllowed { project: String, skill: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Defaults to the file stem when loaded from disk.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Placed before the skill's own system prompt.
    #[serde(default)]
    pub system_prompt: String,
    /// Replaces the skill's tool list when non-empty.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Skills allowed under this project. Empty allows all.
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub default_model: String,
}

impl Project {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
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

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn allows_skill(&self, name: &str) -> bool {
        self.skills.is_empty() || self.skills.iter().any(|s| s == name)
    }

    /// Derive the skill to run under this project. The input skill is not modified.
    pub fn scope(&self, skill: &Skill) -> Result<Skill, ProjectError> {
        if !self.allows_skill(&skill.name) {
            return Err(ProjectError::SkillNotAllowed {
                project: self.id.clone(),
                skill: skill.name.clone(),
            });
        }

        let mut scoped = skill.clone();
        let preamble = self.system_prompt.trim();
        if !preamble.is_empty() {
            scoped.system_prompt = format!("{}\n\n{}", preamble, skill.system_prompt);
        }
        if !self.tools.is_empty() {
            scoped.tools = self.tools.clone();
        }
        if !self.default_model.trim().is_empty() {
            scoped.default_model = self.default_model.clone();
        }
        Ok(scoped)
    }
}

/// Projects keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: BTreeMap<String, Arc<Project>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, project: Project) {
        let id = project.id.clone();
        if self.projects.insert(id.clone(), Arc::new(project)).is_some() {
            tracing::debug!("Replaced project definition: {}", id);
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<Project>, ProjectError> {
        self.projects
            .get(id)
            .cloned()
            .ok_or_else(|| ProjectError::NotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<Arc<Project>> {
        self.projects.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
