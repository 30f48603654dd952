//! Tools module - callable capabilities offered to the model.
//!
//! # Tools
//! - **calculator**: evaluate arithmetic expressions
//! - **fetch_url**: read the text content of a URL
//! - **web_search**: search the web (DuckDuckGo HTML)
//! - **execute_code**: run a Python or Node.js snippet (opt-in)
//!
//! Applications add their own tools by implementing [`Tool`] or wrapping a
//! closure in [`SimpleTool`].

mod calculator;
mod code;
pub(crate) mod loader;
mod simple;
mod web;

pub use calculator::Calculator;
pub use code::ExecuteCode;
pub use loader::{apply_metadata, load_metadata_dir, ToolMetadata};
pub use simple::SimpleTool;
pub use web::{FetchUrl, WebSearch};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::{ModelType, ToolSchema};

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the argument object.
    fn parameters_schema(&self) -> Value;

    /// Specific model this tool needs, if any.
    fn required_model(&self) -> Option<&str> {
        None
    }

    fn model_type(&self) -> ModelType {
        ModelType::Text
    }

    /// Run the tool. `args` is always a JSON object.
    async fn execute(&self, args: Value) -> anyhow::Result<String>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
}

/// Catalog of every tool known to the application.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the tools that have no side effects beyond network reads.
    pub fn with_safe_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Calculator);
        registry.register(FetchUrl::new());
        registry.register(WebSearch::new());
        registry
    }

    /// Add or replace a tool under its own name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!("Replaced tool registration: {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tools, ordered by name.
    pub fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| schema_of(t.as_ref())).collect()
    }

    /// Build the subset permitted for one run, preserving the order of `names`.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<ToolSet, ToolError> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if tools.iter().any(|t| t.name() == name) {
                continue;
            }
            let tool = self
                .get(name)
                .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
            tools.push(tool);
        }
        Ok(ToolSet { tools })
    }
}

/// Read-only tool subset handed to a single run.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| schema_of(t.as_ref())).collect()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn schema_of(tool: &dyn Tool) -> ToolSchema {
    ToolSchema::function(tool.name(), tool.description(), tool.parameters_schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(name: &str) -> SimpleTool {
        SimpleTool::new(name, "echoes", |args| async move { Ok(args.to_string()) })
    }

    #[test]
    fn test_subset_preserves_requested_order() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("b"));
        registry.register(echo("a"));
        registry.register(echo("c"));

        let set = registry.subset(&["c", "a", "c"]).unwrap();
        assert_eq!(set.names(), vec!["c", "a"]);
        assert!(set.get("b").is_none());
    }

    #[test]
    fn test_subset_rejects_unknown_names() {
        let registry = ToolRegistry::with_safe_defaults();
        let err = registry.subset(&["calculator", "teleport"]).unwrap_err();
        assert_eq!(err, ToolError::NotFound("teleport".to_string()));
    }

    #[test]
    fn test_schemas_are_function_shaped() {
        let mut registry = ToolRegistry::new();
        registry.register(Calculator);
        let schemas = registry.get_tool_schemas();
        assert_eq!(schemas.len(), 1);
        let value = serde_json::to_value(&schemas[0]).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "calculator");
        assert_eq!(value["function"]["parameters"]["required"], json!(["expression"]));
    }
}
