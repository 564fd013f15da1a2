//! Chat turn types shared by the IRC endpoint and the engine unit.
//!
//! A [`ChatRequest`] is built by the IRC endpoint when a channel message is
//! addressed to the bot. It crosses the unit boundary exactly once, through a
//! [`ChatRouter`], and comes back as a [`ChatReply`].

use std::fmt;

use async_trait::async_trait;

use crate::error::ChatError;

/// A directed channel message waiting for an engine reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Message text with the `<nick>: ` prefix removed.
    pub text: String,
    /// Nickname of the sender.
    pub sender: String,
    /// Channel the message arrived on.
    pub channel: String,
}

impl ChatRequest {
    /// Build a request.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        sender: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            sender: sender.into(),
            channel: channel.into(),
        }
    }
}

/// Engine output for one turn, flattened to a single line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatReply(pub String);

impl ChatReply {
    /// Reply text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChatReply {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Capability to run one chat turn against the engine.
///
/// The IRC endpoint is handed this at construction instead of looking the
/// engine up globally. Callers await the reply; the engine's internal state
/// is never touched directly.
#[async_trait]
pub trait ChatRouter: Send + Sync {
    /// Ask the engine to answer a request.
    async fn answer(&self, request: ChatRequest) -> Result<ChatReply, ChatError>;
}
