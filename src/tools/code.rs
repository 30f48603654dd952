//! Code snippet execution tool.
//!
//! Runs untrusted model-written code on the host. Only register it where that is acceptable.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::Tool;

const MAX_OUTPUT_BYTES: usize = 10_000;

/// Run a Python or Node.js snippet in a subprocess.
pub struct ExecuteCode {
    timeout: Duration,
}

impl ExecuteCode {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ExecuteCode {
    fn default() -> Self {
        Self::new()
    }
}

fn interpreter(language: &str) -> anyhow::Result<(&'static str, &'static str)> {
    match language {
        "python" => Ok(("python3", "-c")),
        "node" => Ok(("node", "-e")),
        other => Err(anyhow::anyhow!("Language not allowed: {}", other)),
    }
}

#[async_trait]
impl Tool for ExecuteCode {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Execute a short Python or Node.js program and return its exit code, stdout and stderr."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "description": "Programming language",
                    "enum": ["python", "node"]
                },
                "code": {
                    "type": "string",
                    "description": "Code to execute"
                }
            },
            "required": ["language", "code"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let language = args["language"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'language' argument"))?;
        let code = args["code"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'code' argument"))?;
        let (program, flag) = interpreter(language)?;

        tracing::info!("Executing {} snippet ({} bytes)", language, code.len());

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(program)
                .arg(flag)
                .arg(code)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Execution timed out after {:?}", self.timeout))?
        .map_err(|e| anyhow::anyhow!("Failed to start {}: {}", program, e))?;

        let mut result = format!("Exit code: {}\n", output.status.code().unwrap_or(-1));

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.is_empty() {
            result.push_str("\n--- stdout ---\n");
            result.push_str(&stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            result.push_str("\n--- stderr ---\n");
            result.push_str(&stderr);
        }

        if result.len() > MAX_OUTPUT_BYTES {
            let mut cut = MAX_OUTPUT_BYTES;
            while !result.is_char_boundary(cut) {
                cut -= 1;
            }
            result.truncate(cut);
            result.push_str("\n... [output truncated]");
        }

        Ok(result)
    }
}
