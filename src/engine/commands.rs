//! Mailbox commands for the engine unit.
//!
//! Callers never touch the engine's pipe. They send an [`EngineCommand`]
//! through an [`EngineHandle`] and, for request/response commands, await
//! the oneshot receiver that comes back with it. The engine unit processes
//! commands one at a time, so a second chat turn waits until the first
//! reply has been read in full.
//!
//! ```ignore
//! let (cmd, rx) = EngineCommand::answer(ChatRequest::new("hello", "alice", "#room"));
//! engine_tx.send(cmd)?;
//! let reply = rx.await??;
//! ```

// Rust guideline compliant 2026-02

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::EngineState;
use crate::chat::{ChatReply, ChatRequest, ChatRouter};
use crate::error::ChatError;
use crate::supervisor::UnitHandle;

/// Registry name of the engine unit.
pub const ENGINE_UNIT: &str = "megahal";

/// Result of a chat turn.
pub type AnswerResult = Result<ChatReply, ChatError>;

/// Result of a control command (save, restart).
pub type ControlResult = Result<(), ChatError>;

/// Commands accepted by the engine unit.
#[derive(Debug)]
pub enum EngineCommand {
    /// Run one chat turn.
    Answer {
        /// The directed message to answer.
        request: ChatRequest,
        /// Channel for sending the reply back.
        response_tx: oneshot::Sender<AnswerResult>,
    },

    /// Persist the brain and drain the engine's acknowledgement.
    Save {
        /// Channel for reporting completion.
        response_tx: oneshot::Sender<ControlResult>,
    },

    /// Quit the engine process and launch a fresh one.
    Restart {
        /// Channel for reporting completion.
        response_tx: oneshot::Sender<ControlResult>,
    },

    /// Report the transport's lifecycle state.
    State {
        /// Channel for sending the state back.
        response_tx: oneshot::Sender<EngineState>,
    },

    /// Quit the engine and stop the unit. Fire-and-forget.
    Quit,
}

impl EngineCommand {
    /// Create an answer command and the receiver for its reply.
    #[must_use]
    pub fn answer(request: ChatRequest) -> (Self, oneshot::Receiver<AnswerResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Answer {
                request,
                response_tx: tx,
            },
            rx,
        )
    }

    /// Create a save command.
    #[must_use]
    pub fn save() -> (Self, oneshot::Receiver<ControlResult>) {
        let (tx, rx) = oneshot::channel();
        (Self::Save { response_tx: tx }, rx)
    }

    /// Create a restart command.
    #[must_use]
    pub fn restart() -> (Self, oneshot::Receiver<ControlResult>) {
        let (tx, rx) = oneshot::channel();
        (Self::Restart { response_tx: tx }, rx)
    }

    /// Create a state query.
    #[must_use]
    pub fn state() -> (Self, oneshot::Receiver<EngineState>) {
        let (tx, rx) = oneshot::channel();
        (Self::State { response_tx: tx }, rx)
    }
}

/// Cloneable handle to the engine unit's mailbox.
///
/// The mailbox outlives individual engine incarnations, so a handle taken
/// before a supervisor restart keeps working afterwards.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// Wrap a command sender.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self { tx }
    }

    /// Queue a command and wait for its response.
    async fn request<T>(
        &self,
        (cmd, rx): (EngineCommand, oneshot::Receiver<T>),
    ) -> Result<T, ChatError> {
        self.tx.send(cmd).map_err(|_closed| ChatError::Unavailable)?;
        rx.await.map_err(|_dropped| ChatError::Unavailable)
    }

    /// Ask the engine to answer a request.
    pub async fn answer(&self, request: ChatRequest) -> AnswerResult {
        self.request(EngineCommand::answer(request)).await?
    }

    /// Persist the engine's brain.
    pub async fn save(&self) -> ControlResult {
        self.request(EngineCommand::save()).await?
    }

    /// Relaunch the engine process.
    pub async fn restart(&self) -> ControlResult {
        self.request(EngineCommand::restart()).await?
    }

    /// Current transport state, or `None` if the unit is gone.
    pub async fn state(&self) -> Option<EngineState> {
        self.request(EngineCommand::state()).await.ok()
    }
}

#[async_trait]
impl ChatRouter for EngineHandle {
    async fn answer(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        EngineHandle::answer(self, request).await
    }
}

impl UnitHandle for EngineHandle {
    fn name(&self) -> &'static str {
        ENGINE_UNIT
    }

    fn quit(&self) {
        if self.tx.send(EngineCommand::Quit).is_err() {
            log::debug!("[Engine] Quit ignored, mailbox already closed");
        }
    }
}
