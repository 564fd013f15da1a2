//! Stirspeare - IRC bot backed by the MegaHAL conversational engine.
//!
//! Channel messages addressed to the bot (`<nick>: <text>`) are handed to a
//! MegaHAL child process and its reply is posted back to the channel,
//! prefixed with the sender's nick.
//!
//! # Architecture
//!
//! Two independently supervised units talk only through mailboxes:
//!
//! - **Engine** - owns the MegaHAL process and its pipes
//! - **Client** - owns the IRC socket, answers keepalives, joins channels
//! - **Supervisor** - restarts either unit when it fails, maps names to handles
//! - **Shutdown hook** - quits both units on signal or console `quit`
//!
//! # Modules
//!
//! - [`engine`] - MegaHAL transport, line protocol, and unit
//! - [`irc`] - IRC endpoint, line matching, and unit
//! - [`supervisor`] - Unit restarts and handle registry
//! - [`config`] - Configuration loading/saving
//! - [`console`] - Operator console

pub mod chat;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod irc;
pub mod shutdown;
pub mod supervisor;

// Re-export commonly used types
pub use chat::{ChatReply, ChatRequest, ChatRouter};
pub use config::Config;
pub use engine::{EngineHandle, EngineState, EngineTransport, EngineUnit};
pub use error::{ChatError, ConfigError, ConnectionError, EngineError};
pub use irc::{ClientHandle, ClientState, ClientUnit, ConnectionEndpoint};
pub use shutdown::ShutdownHook;
pub use supervisor::{Registry, RestartPolicy, Supervisor, Unit, UnitHandle};
