//! System turn composition.

use std::fmt::Write;

use crate::skills::Skill;
use crate::tools::ToolSet;

/// Fixed instruction describing how the model may answer.
pub const TOOL_PROTOCOL: &str = r#"You can use tools to complete the task. If you choose to use a tool, respond ONLY with JSON in the form {"tool":"name","args":{...}}. Otherwise, reply with the final answer in plain text."#;

/// Build the system prompt: the skill's preamble, the tool protocol and every
/// permitted tool with its argument schema.
pub fn build_system_prompt(profile: &Skill, tools: &ToolSet) -> String {
    let mut prompt = String::new();
    prompt.push_str(profile.system_prompt.trim_end());
    prompt.push_str("\n\n");
    prompt.push_str(TOOL_PROTOCOL);
    prompt.push_str("\n\nAvailable tools:\n");

    if tools.is_empty() {
        prompt.push_str("(none)\n");
    }
    for tool in tools.iter() {
        let params = serde_json::to_string(&tool.parameters_schema()).unwrap_or_else(|_| "{}".to_string());
        let _ = writeln!(prompt, "- {}: {}\n  parameters: {}", tool.name(), tool.description(), params);
    }

    prompt
}
