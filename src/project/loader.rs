//! Load projects from YAML files.

use std::path::Path;

use walkdir::WalkDir;

use super::{Project, ProjectRegistry};
use crate::tools::loader::is_yaml;

/// Register every project found under `dir`; returns how many were loaded.
///
/// A project without an `id` takes its file stem. A missing directory loads nothing.
pub fn load_projects_dir(dir: &Path, registry: &mut ProjectRegistry) -> anyhow::Result<usize> {
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
        let mut project: Project = serde_yaml::from_str(&data)
            .map_err(|e| anyhow::anyhow!("parse project yaml {}: {}", entry.path().display(), e))?;
        if project.id.trim().is_empty() {
            project.id = entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        tracing::debug!("Loaded project '{}' from {}", project.id, entry.path().display());
        registry.register(project);
        loaded += 1;
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_projects_with_file_stem_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("handbook.yaml"),
            r#"
name: Handbook
system_prompt: You maintain the team handbook.
tools: [fetch_url]
skills: [summarizer]
"#,
        )
        .unwrap();
        let nested = dir.path().join("finance");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            nested.join("q3.yml"),
            "id: q3-report\ndefault_model: openai/gpt-4o\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a project").unwrap();

        let mut registry = ProjectRegistry::new();
        assert_eq!(load_projects_dir(dir.path(), &mut registry).unwrap(), 2);

        let handbook = registry.get("handbook").unwrap();
        assert_eq!(handbook.name, "Handbook");
        assert_eq!(handbook.tools, vec!["fetch_url".to_string()]);
        assert!(handbook.allows_skill("summarizer"));
        assert!(!handbook.allows_skill("coder"));
        assert_eq!(registry.get("q3-report").unwrap().default_model, "openai/gpt-4o");
    }

    #[test]
    fn test_missing_dir_and_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ProjectRegistry::new();
        assert_eq!(load_projects_dir(&dir.path().join("absent"), &mut registry).unwrap(), 0);

        std::fs::write(dir.path().join("broken.yaml"), "tools: [unclosed").unwrap();
        assert!(load_projects_dir(dir.path(), &mut registry).is_err());
    }
}
