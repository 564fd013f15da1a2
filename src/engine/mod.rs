//! MegaHAL engine transport and unit.
//!
//! The engine is an external binary launched as
//! `<command> -b -p -d <data_dir>` (batch mode, persistent learning,
//! explicit brain directory) and driven over its stdin/stdout.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start──► Starting ──banner drained──► Ready
//!                                                  │ ▲
//!                                          answer  │ │ terminator line
//!                                                  ▼ │
//!                                             AwaitingReply
//!
//! quit: any state ──► Stopped
//! restart: Restarting ──quit──► Stopped ──start──► Starting ...
//! ```
//!
//! [`EngineTransport`] owns the child process and its pipes exclusively.
//! [`EngineUnit`] wraps a transport in a mailbox loop so other units reach
//! it only through an [`EngineHandle`].

// Rust guideline compliant 2026-02

pub mod commands;
pub mod protocol;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

pub use commands::{EngineCommand, EngineHandle, ENGINE_UNIT};
pub use protocol::{is_final_line, strip_marker, EngineIo};

use crate::chat::ChatReply;
use crate::config::EngineConfig;
use crate::error::{ChatError, EngineError};
use crate::supervisor::Unit;

/// Lifecycle state of the engine transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No process.
    Stopped,
    /// Process launched, startup banner not yet drained.
    Starting,
    /// Waiting for a request.
    Ready,
    /// A request was written and its reply is being read.
    AwaitingReply,
    /// Quitting the current process before launching a new one.
    Restarting,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::AwaitingReply => write!(f, "awaiting reply"),
            Self::Restarting => write!(f, "restarting"),
        }
    }
}

/// Owns the engine child process and speaks its line protocol.
#[derive(Debug)]
pub struct EngineTransport {
    command: PathBuf,
    data_dir: PathBuf,
    reply_timeout: Option<Duration>,
    state: EngineState,
    child: Option<Child>,
    io: Option<EngineIo<ChildStdout, ChildStdin>>,
}

impl EngineTransport {
    /// Create a stopped transport for the configured binary.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            command: config.command.clone(),
            data_dir: config.data_dir.clone(),
            reply_timeout: config.reply_timeout(),
            state: EngineState::Stopped,
            child: None,
            io: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Arguments passed to the engine binary.
    pub fn args(&self) -> Vec<OsString> {
        vec![
            OsString::from("-b"),
            OsString::from("-p"),
            OsString::from("-d"),
            self.data_dir.clone().into_os_string(),
        ]
    }

    /// Human-readable command line, for logs and errors.
    pub fn command_line(&self) -> String {
        format!(
            "{} -b -p -d {}",
            self.command.display(),
            self.data_dir.display()
        )
    }

    /// Launch the engine and drain its startup banner.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.state = EngineState::Starting;
        log::info!("[Engine] Starting MegaHAL: {}", self.command_line());

        let result = self.launch().await;
        if result.is_err() {
            self.state = EngineState::Stopped;
        }
        result
    }

    async fn launch(&mut self) -> Result<(), EngineError> {
        let mut child = Command::new(&self.command)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Launch {
                command: self.command_line(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(EngineError::NotRunning);
        };
        let mut io = EngineIo::new(stdout, stdin);

        // Startup prints an unsolicited reply; consume it before taking requests.
        io.wait_readable().await?;
        let drained = io.resync()?;
        log::debug!("[Engine] Drained {} byte(s) of startup output", drained);

        self.child = Some(child);
        self.io = Some(io);
        self.state = EngineState::Ready;
        log::info!("[Engine] Ready");
        Ok(())
    }

    /// Send one chat line and read the flattened reply.
    pub async fn answer(&mut self, text: &str) -> Result<ChatReply, EngineError> {
        let io = self.io.as_mut().ok_or(EngineError::NotRunning)?;
        self.state = EngineState::AwaitingReply;

        let result = match self.reply_timeout {
            Some(limit) => match tokio::time::timeout(limit, io.answer(text)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(EngineError::Timeout(limit)),
            },
            None => io.answer(text).await,
        };

        match result {
            Ok(reply) => {
                self.state = EngineState::Ready;
                Ok(reply)
            }
            Err(e) => {
                // Out of step with the engine; later requests must not reach it.
                let _reaper = self.quit().await;
                Err(e)
            }
        }
    }

    /// Persist the brain and drain the engine's acknowledgement.
    pub async fn save(&mut self) -> Result<(), EngineError> {
        let io = self.io.as_mut().ok_or(EngineError::NotRunning)?;
        log::info!("[Engine] Saving brain");
        io.save().await
    }

    /// Ask the engine to exit and release the process.
    ///
    /// Never waits for a reply. The process is reaped in the background so
    /// it can finish writing its brain after `#QUIT`; await the returned
    /// handle to know it has exited. Dropping the handle detaches the reaper,
    /// but a runtime shutdown then kills the process.
    pub async fn quit(&mut self) -> Option<JoinHandle<()>> {
        if let Some(mut io) = self.io.take() {
            if let Err(e) = io.quit().await {
                log::warn!("[Engine] Failed to send quit: {}", e);
            }
            // Dropping the pipes closes the engine's stdin.
            drop(io);
        }

        let reaper = self.child.take().map(|mut child| {
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => log::info!("[Engine] Process exited: {}", status),
                    Err(e) => log::warn!("[Engine] Failed to reap process: {}", e),
                }
            })
        });

        self.state = EngineState::Stopped;
        reaper
    }

    /// Quit and wait until the process has exited.
    pub async fn quit_and_wait(&mut self) {
        if let Some(reaper) = self.quit().await {
            if let Err(e) = reaper.await {
                log::warn!("[Engine] Reaper task failed: {}", e);
            }
        }
    }

    /// Quit the current process and launch a new one.
    pub async fn restart(&mut self) -> Result<(), EngineError> {
        self.state = EngineState::Restarting;
        log::info!("[Engine] Restarting");
        // The old brain must be on disk before the new process loads it.
        self.quit_and_wait().await;
        self.start().await
    }
}

/// Supervised unit that serves the engine mailbox.
///
/// The mailbox receiver lives here rather than in an incarnation, so
/// commands queued while the engine restarts are served by the next one.
#[derive(Debug)]
pub struct EngineUnit {
    config: EngineConfig,
    mailbox: Mutex<mpsc::UnboundedReceiver<EngineCommand>>,
}

impl EngineUnit {
    /// Create the unit and the handle other units use to reach it.
    pub fn new(config: EngineConfig) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let unit = Self {
            config,
            mailbox: Mutex::new(rx),
        };
        (unit, EngineHandle::new(tx))
    }
}

/// Forward a failure to the waiting caller and hand it back for the unit.
fn report<T>(
    response_tx: tokio::sync::oneshot::Sender<Result<T, ChatError>>,
    error: EngineError,
) -> EngineError {
    let _ = response_tx.send(Err(ChatError::Engine(error.to_string())));
    error
}

#[async_trait]
impl Unit for EngineUnit {
    fn name(&self) -> &'static str {
        ENGINE_UNIT
    }

    async fn run(&self) -> anyhow::Result<()> {
        let mut mailbox = self.mailbox.lock().await;
        let mut transport = EngineTransport::new(&self.config);
        transport.start().await?;

        while let Some(command) = mailbox.recv().await {
            match command {
                EngineCommand::Answer {
                    request,
                    response_tx,
                } => {
                    log::debug!(
                        "[Engine] Answering {} on {}: {}",
                        request.sender,
                        request.channel,
                        request.text
                    );
                    match transport.answer(&request.text).await {
                        Ok(reply) => {
                            let _ = response_tx.send(Ok(reply));
                        }
                        Err(e) => {
                            return Err(report(response_tx, e)).context("chat turn failed");
                        }
                    }
                }
                EngineCommand::Save { response_tx } => match transport.save().await {
                    Ok(()) => {
                        let _ = response_tx.send(Ok(()));
                    }
                    Err(e) => return Err(report(response_tx, e)).context("save failed"),
                },
                EngineCommand::Restart { response_tx } => match transport.restart().await {
                    Ok(()) => {
                        let _ = response_tx.send(Ok(()));
                    }
                    Err(e) => return Err(report(response_tx, e)).context("restart failed"),
                },
                EngineCommand::State { response_tx } => {
                    let _ = response_tx.send(transport.state());
                }
                EngineCommand::Quit => {
                    log::info!("[Engine] Quit requested");
                    transport.quit_and_wait().await;
                    return Ok(());
                }
            }
        }

        // Every handle is gone; nobody can ask for anything again.
        transport.quit_and_wait().await;
        Ok(())
    }
}
