//! Line-oriented operator console.
//!
//! Reads one command per line and acts on it through the unit handles:
//!
//! ```text
//! join <channel>        part <channel>       say <target> <text>
//! ask <text>            save                 restart
//! state                 units                quit
//! ```
//!
//! End of input behaves like `quit`.

// Rust guideline compliant 2026-02

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::chat::ChatRequest;
use crate::engine::EngineHandle;
use crate::irc::ClientHandle;
use crate::shutdown::ShutdownHook;

/// Sender and channel recorded on chat turns started from the console.
const CONSOLE_SOURCE: &str = "console";

const HELP: &str =
    "commands: join <channel> | part <channel> | say <target> <text> | ask <text> | save | restart | state | units | quit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Join a channel.
    Join(String),
    /// Leave a channel.
    Part(String),
    /// Send a message.
    Say {
        /// Channel or nick.
        target: String,
        /// Message body.
        text: String,
    },
    /// Run a chat turn and print the reply.
    Ask(String),
    /// Persist the brain.
    Save,
    /// Relaunch the engine.
    Restart,
    /// Print the engine's lifecycle state.
    State,
    /// List registered units.
    Units,
    /// Shut down.
    Quit,
    /// Print usage.
    Help,
}

impl ConsoleCommand {
    /// Parse one line. Blank lines yield `None`; anything unknown is `Help`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match (word, rest) {
            ("join", channel) if !channel.is_empty() => Self::Join(channel.to_string()),
            ("part", channel) if !channel.is_empty() => Self::Part(channel.to_string()),
            ("say", rest) => match rest.split_once(char::is_whitespace) {
                Some((target, text)) if !text.trim().is_empty() => Self::Say {
                    target: target.to_string(),
                    text: text.trim().to_string(),
                },
                _ => Self::Help,
            },
            ("ask", text) if !text.is_empty() => Self::Ask(text.to_string()),
            ("save", "") => Self::Save,
            ("restart", "") => Self::Restart,
            ("state", "") => Self::State,
            ("units", "") => Self::Units,
            ("quit" | "exit", "") => Self::Quit,
            _ => Self::Help,
        };
        Some(command)
    }
}

/// Dispatches console commands to the running units.
#[derive(Debug, Clone)]
pub struct Console {
    engine: EngineHandle,
    client: ClientHandle,
    hook: ShutdownHook,
    units: Vec<&'static str>,
}

impl Console {
    /// Console over the given handles. `units` is what `units` prints.
    pub fn new(
        engine: EngineHandle,
        client: ClientHandle,
        hook: ShutdownHook,
        units: Vec<&'static str>,
    ) -> Self {
        Self {
            engine,
            client,
            hook,
            units,
        }
    }

    /// Serve commands from `input` until `quit` or end of input, then
    /// trigger shutdown.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await? {
            let Some(command) = ConsoleCommand::parse(&line) else {
                continue;
            };
            if command == ConsoleCommand::Quit {
                break;
            }

            let response = self.execute(command).await;
            if !response.is_empty() {
                output.write_all(response.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
        }

        log::info!("[Console] Quit");
        self.hook.trigger();
        Ok(())
    }

    /// Carry out one command and describe the outcome.
    pub async fn execute(&self, command: ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Join(channel) => {
                self.client.join(channel);
                String::new()
            }
            ConsoleCommand::Part(channel) => {
                self.client.part(channel);
                String::new()
            }
            ConsoleCommand::Say { target, text } => {
                self.client.say(target, text);
                String::new()
            }
            ConsoleCommand::Ask(text) => {
                let request = ChatRequest::new(text, CONSOLE_SOURCE, CONSOLE_SOURCE);
                match self.engine.answer(request).await {
                    Ok(reply) => reply.to_string(),
                    Err(e) => format!("error: {}", e),
                }
            }
            ConsoleCommand::Save => match self.engine.save().await {
                Ok(()) => "saved".to_string(),
                Err(e) => format!("error: {}", e),
            },
            ConsoleCommand::Restart => match self.engine.restart().await {
                Ok(()) => "restarted".to_string(),
                Err(e) => format!("error: {}", e),
            },
            ConsoleCommand::State => match self.engine.state().await {
                Some(state) => state.to_string(),
                None => "engine unit unavailable".to_string(),
            },
            ConsoleCommand::Units => self.units.join(" "),
            ConsoleCommand::Quit => {
                self.hook.trigger();
                String::new()
            }
            ConsoleCommand::Help => HELP.to_string(),
        }
    }
}
