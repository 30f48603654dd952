//! Closure-backed tools for quick application-defined capabilities.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::Tool;
use crate::llm::ModelType;

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// A tool defined by a name, a description and an async handler.
///
/// ```rust,ignore
/// let shout = SimpleTool::new("shout", "Upper-cases text", |args| async move {
///     Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
/// });
/// ```
#[derive(Clone)]
pub struct SimpleTool {
    name: String,
    description: String,
    parameters: Value,
    model: Option<String>,
    model_type: ModelType,
    handler: Handler,
}

impl SimpleTool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({ "type": "object", "properties": {} }),
            model: None,
            model_type: ModelType::Text,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }
}

#[async_trait]
impl Tool for SimpleTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn required_model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn model_type(&self) -> ModelType {
        self.model_type
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        (self.handler)(args).await
    }
}
