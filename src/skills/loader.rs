//! Load skills from YAML files.

use std::path::Path;

use serde::Deserialize;
use walkdir::WalkDir;

use super::{Skill, SkillRegistry};
use crate::tools::loader::is_yaml;

/// On-disk shape of a skill definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub default_model: String,
}

impl From<SkillFile> for Skill {
    fn from(file: SkillFile) -> Self {
        Skill {
            name: file.name,
            description: file.description,
            system_prompt: file.system_prompt,
            tools: file.tools,
            examples: file.examples,
            default_model: file.default_model,
        }
    }
}

/// Register every named skill found under `dir`; returns how many were loaded.
///
/// Files without a `name` are skipped. A missing directory loads nothing.
pub fn load_skills_dir(dir: &Path, registry: &mut SkillRegistry) -> anyhow::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut loaded = 0;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_yaml(entry.path()) {
            continue;
        }
        let data = std::fs::read_to_string(entry.path())?;
        let file: SkillFile = serde_yaml::from_str(&data)
            .map_err(|e| anyhow::anyhow!("parse skill yaml {}: {}", entry.path().display(), e))?;
        if file.name.trim().is_empty() {
            tracing::debug!("Skipping nameless skill file {}", entry.path().display());
            continue;
        }
        tracing::debug!("Loaded skill '{}' from {}", file.name, entry.path().display());
        registry.register(file.into());
        loaded += 1;
    }
    Ok(loaded)
}
