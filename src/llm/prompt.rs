//! Upstream message assembly.
//!
//! The resolved prompt template becomes the single leading system message;
//! the caller's turns follow unchanged and in order.

use thiserror::Error;

use super::{AssembledMessages, ChatMessage, ChatRole, ChatTurn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt template is empty")]
    EmptyTemplate,
}

/// Build the upstream message sequence.
///
/// An empty template is a hard failure regardless of why it is empty.
pub fn assemble(template: &str, turns: &[ChatTurn]) -> Result<AssembledMessages, PromptError> {
    if template.is_empty() {
        return Err(PromptError::EmptyTemplate);
    }

    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessage {
        role: ChatRole::System,
        content: template.to_string(),
    });
    messages.extend(turns.iter().map(|t| ChatMessage {
        role: t.role.into(),
        content: t.content.clone(),
    }));

    Ok(AssembledMessages(messages))
}
