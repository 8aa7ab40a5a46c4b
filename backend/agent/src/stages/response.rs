//! Final reply for the turn, picked by precedence: an existing reply, an
//! error, a pending approval, tool results, then intent-specific text.

use futures::StreamExt;
use tracing::{debug, warn};

use hearth_core::{ApprovalRequest, IntentCategory, Message, ToolCall, ToolCallStatus};

use crate::pipeline::TokenSink;
use crate::prompts::system_prompt;
use crate::stages::Services;
use crate::state::AgentState;

const SUCCESS_PREVIEW_CHARS: usize = 500;
const MIXED_PREVIEW_CHARS: usize = 200;

pub const UNCLEAR_REPLY: &str =
    "I'm not sure how to help with that. Could you please provide more details?";
pub const NO_INTENT_REPLY: &str = "I'm here to help. What would you like me to do?";
pub const EMPTY_ANSWER_ERROR: &str = "The model returned an empty answer";

pub fn error_reply(error: &str) -> String {
    format!(
        "I encountered an error while processing your request:\n\n**Error**: {error}\n\n\
         Would you like me to try a different approach?"
    )
}

pub fn greeting_reply(assistant_name: &str) -> String {
    format!("Hello! I'm {assistant_name}, your desktop AI assistant. How can I help you today?")
}

pub fn approval_prompt(approval: &ApprovalRequest) -> String {
    format!(
        "I'd like to perform the following actions:\n\n**{}**\n\n{}\n\n**Risk Level**: {}\n\n\
         Do you approve these actions?",
        approval.action,
        approval.steps.join("\n"),
        approval.risk_level.as_str().to_uppercase(),
    )
}

fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let head: String = text.chars().take(limit).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn error_text(call: &ToolCall) -> &str {
    call.error.as_deref().unwrap_or("Unknown error")
}

pub fn summarize_tool_calls(calls: &[ToolCall]) -> String {
    let (succeeded, failed): (Vec<&ToolCall>, Vec<&ToolCall>) = calls
        .iter()
        .partition(|c| c.status == ToolCallStatus::Complete);

    if failed.is_empty() {
        let results: Vec<String> = succeeded
            .iter()
            .map(|c| {
                let result = c.result.as_deref().unwrap_or_default();
                format!("**{}**: {}", c.name, preview(result, SUCCESS_PREVIEW_CHARS))
            })
            .collect();
        return format!("I've completed your request.\n\n{}", results.join("\n\n"));
    }

    if succeeded.is_empty() {
        let errors: Vec<String> = failed
            .iter()
            .map(|c| format!("- {}: {}", c.name, error_text(c)))
            .collect();
        return format!(
            "I wasn't able to complete your request due to errors:\n\n{}",
            errors.join("\n")
        );
    }

    let mut reply = String::from("Here's what happened:\n\n**Completed:**\n");
    for call in &succeeded {
        let result = call.result.as_deref().unwrap_or_default();
        reply.push_str(&format!("- {}: {}\n", call.name, preview(result, MIXED_PREVIEW_CHARS)));
    }
    reply.push_str("\n**Failed:**\n");
    for call in &failed {
        reply.push_str(&format!("- {}: {}\n", call.name, error_text(call)));
    }
    reply
}

pub async fn run(services: &Services, state: &mut AgentState, sink: Option<&TokenSink>) {
    state.should_continue = false;
    if state.turn_reply().is_some() {
        return;
    }

    if let Some(error) = &state.error {
        let reply = error_reply(error);
        state.push_assistant(reply);
        return;
    }

    if let Some(approval) = state.awaiting_approval() {
        let reply = approval_prompt(approval);
        state.push_assistant(reply);
        return;
    }

    if !state.tool_calls.is_empty() {
        let reply = summarize_tool_calls(&state.tool_calls);
        state
            .messages
            .push(Message::assistant(reply).with_tool_calls(state.tool_calls.clone()));
        return;
    }

    let reply = match state.intent.as_ref().map(|i| i.category) {
        Some(IntentCategory::Greeting) => greeting_reply(&services.assistant_name),
        Some(IntentCategory::Question) => {
            let answer = answer(services, state, sink).await;
            if let Some(error) = answer.error {
                state.error = Some(error);
            }
            answer.text
        }
        Some(_) => UNCLEAR_REPLY.to_string(),
        None => NO_INTENT_REPLY.to_string(),
    };
    state.push_assistant(reply);
}

/// Reply text for a QUESTION turn plus the failure, if any, that cut it short.
struct Answer {
    text: String,
    error: Option<String>,
}

impl Answer {
    fn failed(partial: String, error: String, sink: Option<&TokenSink>) -> Self {
        let notice = if partial.trim().is_empty() {
            error_reply(&error)
        } else {
            format!("\n\n{}", error_reply(&error))
        };
        if let Some(sink) = sink {
            let _ = sink.send(notice.clone());
        }
        Self {
            text: format!("{partial}{notice}"),
            error: Some(error),
        }
    }

    fn finished(text: String, sink: Option<&TokenSink>) -> Self {
        if text.trim().is_empty() {
            warn!("Answer was empty");
            return Self::failed(text, EMPTY_ANSWER_ERROR.to_string(), sink);
        }
        Self { text, error: None }
    }
}

/// Answer a question directly, streaming to the sink when one is attached.
/// Any failure, including one after tokens were already delivered, is
/// appended to the reply and reported as the turn's error.
async fn answer(services: &Services, state: &AgentState, sink: Option<&TokenSink>) -> Answer {
    let message = state.current_message.as_deref().unwrap_or_default();
    let system = system_prompt(&services.assistant_name);

    let Some(sink) = sink else {
        return match services.gateway.generate(message, Some(&system)).await {
            Ok(text) => Answer::finished(text, None),
            Err(e) => {
                warn!(error = %e, "Answer generation failed");
                Answer::failed(String::new(), e.to_string(), None)
            }
        };
    };

    let mut stream = match services.gateway.stream(message, Some(&system)).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Answer streaming failed");
            return Answer::failed(String::new(), e.to_string(), Some(sink));
        }
    };

    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(token) => {
                text.push_str(&token);
                if sink.send(token).is_err() {
                    debug!("Token receiver dropped, stopping stream");
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, received = text.len(), "Answer stream interrupted");
                return Answer::failed(text, e.to_string(), Some(sink));
            }
        }
    }
    Answer::finished(text, Some(sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{ActionPlan, PlanStep, RiskLevel};
    use serde_json::json;

    fn done(n: usize, name: &str, result: &str) -> ToolCall {
        let mut call = ToolCall::new(n, name, json!({}));
        call.complete(result);
        call
    }

    fn failed(n: usize, name: &str, error: &str) -> ToolCall {
        let mut call = ToolCall::new(n, name, json!({}));
        call.fail(error);
        call
    }

    #[test]
    fn test_all_succeeded_truncates_at_500() {
        let long = "x".repeat(600);
        let reply = summarize_tool_calls(&[done(1, "filesystem_read", &long), done(2, "filesystem_list", "a\nb")]);
        assert!(reply.starts_with("I've completed your request.\n\n**filesystem_read**: "));
        assert!(reply.contains(&format!("{}...", "x".repeat(500))));
        assert!(!reply.contains(&"x".repeat(501)));
        assert!(reply.ends_with("\n\n**filesystem_list**: a\nb"));
    }

    #[test]
    fn test_all_failed() {
        let reply = summarize_tool_calls(&[failed(1, "filesystem_read", "Access denied")]);
        assert_eq!(
            reply,
            "I wasn't able to complete your request due to errors:\n\n- filesystem_read: Access denied"
        );
    }

    #[test]
    fn test_mixed_truncates_at_200() {
        let long = "y".repeat(250);
        let reply = summarize_tool_calls(&[
            done(1, "filesystem_list", &long),
            failed(2, "filesystem_read", "not found"),
        ]);
        assert_eq!(
            reply,
            format!(
                "Here's what happened:\n\n**Completed:**\n- filesystem_list: {}...\n\n**Failed:**\n- filesystem_read: not found\n",
                "y".repeat(200)
            )
        );
    }

    #[test]
    fn test_approval_prompt() {
        let plan = ActionPlan::new(
            "Remove build output",
            vec![
                PlanStep::new(1, "filesystem_delete", json!({"path": "target"}))
                    .with_description("Delete target/"),
            ],
            RiskLevel::High,
        );
        let prompt = approval_prompt(&ApprovalRequest::for_plan(&plan));
        assert_eq!(
            prompt,
            "I'd like to perform the following actions:\n\n**Remove build output**\n\n\
             1. Delete target/ (filesystem_delete)\n\n**Risk Level**: HIGH\n\nDo you approve these actions?"
        );
    }

    #[test]
    fn test_canned_texts() {
        assert_eq!(
            greeting_reply("Hearth"),
            "Hello! I'm Hearth, your desktop AI assistant. How can I help you today?"
        );
        assert_eq!(
            error_reply("boom"),
            "I encountered an error while processing your request:\n\n**Error**: boom\n\nWould you like me to try a different approach?"
        );
    }
}
