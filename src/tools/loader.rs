//! YAML metadata overlays for registered tools.
//!
//! A file such as `defs/tools/calc.yaml`:
//!
//! ```yaml
//! name: calculator
//! description: Do arithmetic for the user
//! model_type: text
//! ```
//!
//! replaces the advertised description of the `calculator` tool while keeping
//! its implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use super::{Tool, ToolRegistry};
use crate::llm::ModelType;

/// Tool metadata as written in YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required_model: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Load every `*.yaml`/`*.yml` file under `dir`. A missing directory yields no entries.
pub fn load_metadata_dir(dir: &Path) -> anyhow::Result<Vec<ToolMetadata>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_yaml(entry.path()) {
            continue;
        }
        let data = std::fs::read_to_string(entry.path())?;
        let meta: ToolMetadata = serde_yaml::from_str(&data)
            .map_err(|e| anyhow::anyhow!("parse tool yaml {}: {}", entry.path().display(), e))?;
        if meta.name.trim().is_empty() {
            anyhow::bail!("tool yaml {} missing name", entry.path().display());
        }
        out.push(meta);
    }
    Ok(out)
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

/// Overlay metadata on registered tools. Returns names with no registered tool.
pub fn apply_metadata(registry: &mut ToolRegistry, metadata: Vec<ToolMetadata>) -> Vec<String> {
    let mut unknown = Vec::new();
    for meta in metadata {
        let Some(base) = registry.get(&meta.name) else {
            tracing::warn!("Tool metadata for unregistered tool: {}", meta.name);
            unknown.push(meta.name);
            continue;
        };
        let model_type = match meta.model_type.as_deref().map(str::parse::<ModelType>) {
            Some(Ok(t)) => Some(t),
            Some(Err(e)) => {
                tracing::warn!("Ignoring model_type for {}: {}", meta.name, e);
                None
            }
            None => None,
        };
        registry.register_arc(Arc::new(WrappedTool {
            base,
            description: meta.description,
            parameters: meta.parameters,
            required_model: meta.required_model,
            model_type,
        }));
    }
    unknown
}

/// Registered tool with overridden metadata; execution delegates to `base`.
struct WrappedTool {
    base: Arc<dyn Tool>,
    description: Option<String>,
    parameters: Option<Value>,
    required_model: Option<String>,
    model_type: Option<ModelType>,
}

#[async_trait]
impl Tool for WrappedTool {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| self.base.description())
    }

    fn parameters_schema(&self) -> Value {
        self.parameters
            .clone()
            .unwrap_or_else(|| self.base.parameters_schema())
    }

    fn required_model(&self) -> Option<&str> {
        self.required_model
            .as_deref()
            .or_else(|| self.base.required_model())
    }

    fn model_type(&self) -> ModelType {
        self.model_type.unwrap_or_else(|| self.base.model_type())
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        self.base.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Calculator;
    use serde_json::json;

    #[tokio::test]
    async fn test_overlay_from_yaml_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("calc.yaml"),
            "name: calculator\ndescription: Do sums\nmodel_type: vision\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("ghost.yml"), "name: ghost\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = ToolRegistry::new();
        registry.register(Calculator);

        let metadata = load_metadata_dir(dir.path()).unwrap();
        assert_eq!(metadata.len(), 2);

        let unknown = apply_metadata(&mut registry, metadata);
        assert_eq!(unknown, vec!["ghost".to_string()]);

        let tool = registry.get("calculator").unwrap();
        assert_eq!(tool.description(), "Do sums");
        assert_eq!(tool.model_type(), ModelType::Vision);
        assert_eq!(tool.parameters_schema()["required"], json!(["expression"]));
        assert_eq!(tool.execute(json!({"expression": "3*3"})).await.unwrap(), "9");
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let metadata = load_metadata_dir(Path::new("/definitely/not/here")).unwrap();
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_nameless_yaml_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "description: no name\n").unwrap();
        assert!(load_metadata_dir(dir.path()).is_err());
    }
}
