//! Prompt builders for classification, planning, and direct answers.

use serde_json::{Map, Value};

use hearth_core::{Intent, IntentCategory};

const CATEGORY_GUIDE: [(IntentCategory, &str); 11] = [
    (IntentCategory::FilesystemRead, "User wants to read or view files/directories"),
    (IntentCategory::FilesystemWrite, "User wants to create or modify files"),
    (IntentCategory::FilesystemDelete, "User wants to delete files or directories"),
    (IntentCategory::TerminalCommand, "User wants to execute a shell command"),
    (IntentCategory::GitOperation, "User wants to perform git operations"),
    (IntentCategory::BrowserAction, "User wants to interact with a browser"),
    (IntentCategory::CodeAnalysis, "User wants to understand or analyze code"),
    (IntentCategory::Question, "User is asking a question that doesn't require actions"),
    (IntentCategory::ClarificationNeeded, "The intent is unclear and needs clarification"),
    (IntentCategory::Greeting, "User is greeting or making small talk"),
    (IntentCategory::Other, "Doesn't fit any category"),
];

pub fn intent_prompt(message: &str) -> String {
    let categories = CATEGORY_GUIDE
        .iter()
        .map(|(category, hint)| format!("- {category}: {hint}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze the user's message and classify their intent.

User message: "{message}"

Classify the intent into one of these categories:
{categories}

Also assess:
1. Confidence (0.0-1.0): How confident are you in this classification?
2. Risk Level (low/medium/high): What's the risk level of this action?
3. Requires Approval (true/false): Should this action require user approval?
4. Entities: Extract key entities (file paths, commands, URLs, etc.)

Respond in JSON format:
{{
  "intent": "CATEGORY",
  "confidence": 0.0-1.0,
  "risk_level": "low|medium|high",
  "requires_approval": true|false,
  "entities": {{
    "paths": [],
    "commands": [],
    "urls": [],
    "other": []
  }},
  "explanation": "Brief explanation of why this classification was chosen"
}}"#
    )
}

pub fn planning_prompt(message: &str, intent: &Intent, context: &Map<String, Value>, tools: &Value) -> String {
    let entities = serde_json::to_string(&intent.entities).unwrap_or_else(|_| "{}".into());
    let cwd = context
        .get("current_directory")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let recent: Vec<&Value> = context
        .get("directory_listing")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().take(5).collect())
        .unwrap_or_default();
    let recent = serde_json::to_string(&recent).unwrap_or_else(|_| "[]".into());
    let tools = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".into());

    format!(
        r#"Based on the user's intent, create an action plan.

User Message: "{message}"
Intent: {category}
Entities: {entities}
Current Context:
- Working Directory: {cwd}
- Recent Files: {recent}

Available tools:
{tools}

Create a step-by-step plan using only the tools above. For each step:
1. Specify the tool to use
2. Specify the parameters
3. Explain what this step accomplishes
4. Note any dependencies on previous steps

Respond in JSON format:
{{
  "plan_summary": "Brief description of what will be done",
  "steps": [
    {{
      "step_number": 1,
      "tool": "tool_name",
      "parameters": {{}},
      "description": "What this step does",
      "depends_on": [],
      "risk_level": "low|medium|high",
      "requires_approval": true|false
    }}
  ],
  "total_risk_level": "low|medium|high",
  "requires_user_confirmation": true|false,
  "confirmation_message": "Message to show user if confirmation needed"
}}"#,
        category = intent.category,
    )
}

/// System instruction used for direct answers.
pub fn system_prompt(assistant_name: &str) -> String {
    format!(
        "You are {assistant_name}, a helpful assistant that runs locally on the user's computer. \
         You can read and manage files, run terminal commands, and help with git and code.\n\n\
         Be concise but informative. Explain what you are about to do before doing it, \
         ask for confirmation before anything destructive, and ask a clarifying question \
         when a request is ambiguous. Everything runs on this machine; be transparent \
         about what data you access."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_prompt_lists_every_category() {
        let prompt = intent_prompt("show me ~/notes.txt");
        for category in IntentCategory::ALL {
            assert!(prompt.contains(category.as_str()), "{category}");
        }
        assert!(prompt.contains("\"show me ~/notes.txt\""));
    }

    #[test]
    fn test_planning_prompt_includes_context() {
        let intent = Intent::new(IntentCategory::FilesystemRead, 0.9)
            .with_entity("paths", vec!["a.txt".into()]);
        let mut context = Map::new();
        context.insert("current_directory".into(), json!("/work"));
        context.insert(
            "directory_listing".into(),
            json!(["a", "b", "c", "d", "e", "f", "g"]),
        );
        let tools = json!([{"name": "filesystem_read"}]);

        let prompt = planning_prompt("read a.txt", &intent, &context, &tools);
        assert!(prompt.contains("Intent: FILESYSTEM_READ"));
        assert!(prompt.contains("Working Directory: /work"));
        assert!(prompt.contains(r#"["a","b","c","d","e"]"#));
        assert!(prompt.contains("filesystem_read"));
        assert!(prompt.contains(r#"{"paths":["a.txt"]}"#));
    }

    #[test]
    fn test_planning_prompt_without_context() {
        let intent = Intent::new(IntentCategory::TerminalCommand, 0.9);
        let prompt = planning_prompt("run ls", &intent, &Map::new(), &json!([]));
        assert!(prompt.contains("Working Directory: unknown"));
        assert!(prompt.contains("Recent Files: []"));
    }
}
