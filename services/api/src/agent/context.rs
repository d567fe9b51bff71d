//! The conversation so far, as handed to the language model.

use crate::provider::{ContextMessage, ContextRole};
use voxbridge_core::transcript::Role;

#[derive(Debug, Clone)]
pub struct ConversationContext {
    system_instruction: String,
    turns: Vec<ContextMessage>,
}

impl ConversationContext {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            turns: Vec::new(),
        }
    }

    /// Appends a final utterance. Consecutive utterances of one role are
    /// merged into a single turn.
    pub fn push(&mut self, role: Role, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let role = ContextRole::from(role);
        match self.turns.last_mut() {
            Some(last) if last.role == role => {
                last.text.push(' ');
                last.text.push_str(text);
            }
            _ => self.turns.push(ContextMessage {
                role,
                text: text.to_string(),
            }),
        }
    }

    /// System instruction first, then the turns in order.
    pub fn messages(&self) -> Vec<ContextMessage> {
        std::iter::once(ContextMessage {
            role: ContextRole::System,
            text: self.system_instruction.clone(),
        })
        .chain(self.turns.iter().cloned())
        .collect()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }
}
