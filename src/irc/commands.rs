//! Outbound protocol lines and the connection unit's mailbox.

// Rust guideline compliant 2026-02

use std::fmt;

use tokio::sync::mpsc;

use crate::supervisor::UnitHandle;

/// Registry name of the connection unit.
pub const CLIENT_UNIT: &str = "client";

/// Reason sent with `QUIT`.
pub const QUIT_REASON: &str = "exited";

/// A single outbound protocol line, without its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound<'a> {
    /// `USER <user> <user> <user> : <user>`
    User(&'a str),
    /// `NICK <nick>`
    Nick(&'a str),
    /// `JOIN :<channel>`
    Join(&'a str),
    /// `PART :<channel>`
    Part(&'a str),
    /// `PONG :<token>`
    Pong(&'a str),
    /// `PRIVMSG <target> :<text>`
    Privmsg {
        /// Channel or nick.
        target: &'a str,
        /// Message body.
        text: &'a str,
    },
    /// `QUIT :<reason>`
    Quit(&'a str),
}

impl fmt::Display for Outbound<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user) => write!(f, "USER {user} {user} {user} : {user}"),
            Self::Nick(nick) => write!(f, "NICK {nick}"),
            Self::Join(channel) => write!(f, "JOIN :{channel}"),
            Self::Part(channel) => write!(f, "PART :{channel}"),
            Self::Pong(token) => write!(f, "PONG :{token}"),
            // A body must never smuggle in a second protocol line.
            Self::Privmsg { target, text } => {
                write!(f, "PRIVMSG {target} :{}", text.replace(['\r', '\n'], " "))
            }
            Self::Quit(reason) => write!(f, "QUIT :{reason}"),
        }
    }
}

/// Commands accepted by the connection unit. All are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Join a channel.
    Join(String),
    /// Leave a channel.
    Part(String),
    /// Send a message to a channel or nick.
    Say {
        /// Channel or nick.
        target: String,
        /// Message body.
        text: String,
    },
    /// Send `QUIT` and stop the read loop.
    Quit,
}

/// Cloneable handle to the connection unit's mailbox.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<ClientCommand>,
}

impl ClientHandle {
    /// Wrap a command sender.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<ClientCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, cmd: ClientCommand) {
        if let Err(e) = self.tx.send(cmd) {
            log::debug!("[Irc] Dropping {:?}, mailbox closed", e.0);
        }
    }

    /// Join `channel`.
    pub fn join(&self, channel: impl Into<String>) {
        self.send(ClientCommand::Join(channel.into()));
    }

    /// Leave `channel`.
    pub fn part(&self, channel: impl Into<String>) {
        self.send(ClientCommand::Part(channel.into()));
    }

    /// Send `text` to `target`.
    pub fn say(&self, target: impl Into<String>, text: impl Into<String>) {
        self.send(ClientCommand::Say {
            target: target.into(),
            text: text.into(),
        });
    }
}

impl UnitHandle for ClientHandle {
    fn name(&self) -> &'static str {
        CLIENT_UNIT
    }

    fn quit(&self) {
        self.send(ClientCommand::Quit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_lines() {
        assert_eq!(
            Outbound::User("bot").to_string(),
            "USER bot bot bot : bot"
        );
        assert_eq!(Outbound::Nick("botnick").to_string(), "NICK botnick");
        assert_eq!(Outbound::Join("#room").to_string(), "JOIN :#room");
        assert_eq!(Outbound::Part("#room").to_string(), "PART :#room");
        assert_eq!(Outbound::Pong("tok").to_string(), "PONG :tok");
        assert_eq!(
            Outbound::Privmsg {
                target: "#room",
                text: "alice: hi"
            }
            .to_string(),
            "PRIVMSG #room :alice: hi"
        );
        assert_eq!(Outbound::Quit(QUIT_REASON).to_string(), "QUIT :exited");
    }

    #[test]
    fn test_privmsg_body_stays_on_one_line() {
        let line = Outbound::Privmsg {
            target: "#room",
            text: "one\r\nQUIT :gotcha",
        }
        .to_string();
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
    }

    #[test]
    fn test_handle_queues_commands_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ClientHandle::new(tx);

        handle.join("#a");
        handle.say("#a", "hello");
        handle.part("#a");
        handle.quit();

        assert_eq!(rx.try_recv().unwrap(), ClientCommand::Join("#a".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientCommand::Say {
                target: "#a".to_string(),
                text: "hello".to_string()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), ClientCommand::Part("#a".to_string()));
        assert_eq!(rx.try_recv().unwrap(), ClientCommand::Quit);
    }

    #[test]
    fn test_closed_mailbox_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ClientHandle::new(tx);
        handle.join("#a");
        handle.quit();
        assert_eq!(UnitHandle::name(&handle), CLIENT_UNIT);
    }
}
