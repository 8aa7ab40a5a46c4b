use tracing::debug;

use hearth_core::IntentCategory;

use crate::stage::CONFIDENCE_THRESHOLD;
use crate::state::AgentState;

pub const GENERIC_QUESTION: &str = "I'm not sure what you'd like me to do. Could you please clarify:\n\n\
- What action would you like me to take?\n\
- What files or resources are involved?\n\
- What's the expected outcome?";

pub fn qualified_question(category: IntentCategory) -> String {
    format!(
        "I think you want me to perform a {}, but I'm not entirely sure. \
         Could you please confirm or provide more details about what you'd like me to do?",
        category.describe()
    )
}

/// Ask a clarifying question unless the intent is already clear. An
/// upstream error takes precedence, so no question is asked then.
pub fn run(state: &mut AgentState) {
    if state.error.is_some() {
        return;
    }
    let question = match &state.intent {
        Some(intent)
            if intent.category != IntentCategory::ClarificationNeeded
                && intent.confidence >= CONFIDENCE_THRESHOLD =>
        {
            return;
        }
        None => GENERIC_QUESTION.to_string(),
        Some(intent) if intent.category == IntentCategory::ClarificationNeeded => {
            GENERIC_QUESTION.to_string()
        }
        Some(intent) => qualified_question(intent.category),
    };
    debug!("Asking for clarification");
    state.push_assistant(question);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::Intent;

    #[test]
    fn test_generic_question_without_intent() {
        let mut state = AgentState::new("s");
        state.begin_turn("hmm");
        run(&mut state);
        assert_eq!(state.turn_reply().unwrap().content, GENERIC_QUESTION);
    }

    #[test]
    fn test_qualified_question_for_low_confidence() {
        let mut state = AgentState::new("s");
        state.begin_turn("do the git thing");
        state.intent = Some(Intent::new(IntentCategory::GitOperation, 0.4));
        run(&mut state);
        let reply = &state.turn_reply().unwrap().content;
        assert!(reply.starts_with("I think you want me to perform a git operation, but"));
    }

    #[test]
    fn test_no_question_when_clear_or_errored() {
        let mut state = AgentState::new("s");
        state.begin_turn("read a.txt");
        state.intent = Some(Intent::new(IntentCategory::FilesystemRead, 0.9));
        run(&mut state);
        assert!(state.turn_reply().is_none());

        state.intent = None;
        state.error = Some("no generation backend available".into());
        run(&mut state);
        assert!(state.turn_reply().is_none());
    }
}
