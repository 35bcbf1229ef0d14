//! UI-agnostic conversation state
//!
//! The conversation owns its turns and the single report excerpt attached to
//! follow-up questions. It is passed explicitly to chat calls instead of living
//! in a global, so separate sessions never see each other's context.

use serde::{Deserialize, Serialize};

use crate::history::ReportRecord;

/// Longest report excerpt carried into chat prompts, in characters.
pub const CONTEXT_LIMIT: usize = 1000;

/// One turn of the chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// Who wrote a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Assistant,
}

/// Excerpt of report text that biases follow-up chat answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    excerpt: String,
    source: String,
}

impl ConversationContext {
    /// Build from freshly recognized report text. `None` for blank text.
    pub fn from_report_text(source: &str, text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            excerpt: truncate_chars(trimmed, CONTEXT_LIMIT).to_string(),
            source: source.to_string(),
        })
    }

    /// Build from a saved report picked out of the history list.
    pub fn from_record(record: &ReportRecord) -> Option<Self> {
        Self::from_report_text(&record.file_name, &record.ocr_text_snippet)
    }

    pub fn excerpt(&self) -> &str {
        &self.excerpt
    }

    /// Name of the report the excerpt came from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
    context: Option<ConversationContext>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(ChatTurn {
            role: ChatRole::User,
            text: text.into(),
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(ChatTurn {
            role: ChatRole::Assistant,
            text: text.into(),
        });
    }

    pub fn context(&self) -> Option<&ConversationContext> {
        self.context.as_ref()
    }

    /// Replaces the active context. Only a new report or a history pick calls this.
    pub fn set_context(&mut self, context: Option<ConversationContext>) {
        if context.is_some() {
            self.context = context;
        }
    }

    pub fn clear_context(&mut self) {
        self.context = None;
    }
}

/// Prefix of at most `max` characters, cut on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
