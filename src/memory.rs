//! Conversation memory for one interactive session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::pipeline::types::{ConversationHistory, Role, Turn};

/// Messages longer than this are stored truncated.
const MAX_MESSAGE_CHARS: usize = 2400;
const TRUNCATED_CHARS: usize = MAX_MESSAGE_CHARS - 100;
const TRUNCATION_MARKER: &str = "... [content truncated]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct SessionMemory {
    session_id: String,
    messages: Vec<StoredMessage>,
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMemory {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[StoredMessage] {
        &self.messages
    }

    pub fn add(&mut self, role: Role, content: &str) {
        let (content, truncated) = match content.char_indices().nth(MAX_MESSAGE_CHARS) {
            Some(_) => {
                let end = content
                    .char_indices()
                    .nth(TRUNCATED_CHARS)
                    .map_or(content.len(), |(i, _)| i);
                (format!("{}{TRUNCATION_MARKER}", &content[..end]), true)
            }
            None => (content.to_string(), false),
        };
        if truncated {
            info!(session = %self.session_id, "Stored truncated message");
        }
        self.messages.push(StoredMessage {
            role,
            content,
            timestamp: Utc::now(),
            truncated,
        });
    }

    /// Records one question and its answer.
    pub fn add_exchange(&mut self, question: &str, answer: &str) {
        self.add(Role::User, question);
        self.add(Role::Assistant, answer);
    }

    /// The stored messages as pipeline history, oldest first.
    pub fn history(&self) -> ConversationHistory {
        self.messages
            .iter()
            .map(|message| Turn {
                role: message.role,
                content: message.content.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
