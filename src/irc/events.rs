//! Inbound IRC line framing and matching.
//!
//! Socket reads are cut into lines by [`LineBuffer`]; each line is then run
//! through [`LineMatcher::events`], which reports every recognised pattern
//! in a fixed order: keepalive, welcome, directed message. Anything else is
//! [`InboundEvent::Unrecognized`] and ignored by the endpoint.

use regex::Regex;

use crate::chat::ChatRequest;

/// Server keepalive carrying a token that must be echoed back.
const PING_PATTERN: &str = r"PING :(.+)";

/// Registration-complete numeric.
const WELCOME_PATTERN: &str = r"001.*Welcome";

/// Something the endpoint must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// `PING :<token>`.
    Ping {
        /// Token to echo in the `PONG`.
        token: String,
    },
    /// The `001` welcome numeric.
    Welcome,
    /// A channel message addressed to our nick.
    DirectedMessage(ChatRequest),
    /// No pattern matched.
    Unrecognized,
}

/// Matches inbound lines for one nickname.
#[derive(Debug, Clone)]
pub struct LineMatcher {
    nick: String,
    ping: Regex,
    welcome: Regex,
    directed: Regex,
}

impl LineMatcher {
    /// Build a matcher for messages addressed to `nick`.
    ///
    /// The nick is matched literally and case-sensitively.
    pub fn new(nick: &str) -> Result<Self, regex::Error> {
        let directed = Regex::new(&format!(
            r":([^!]+)!.+PRIVMSG ([^\s:]+) :{}: (.*)",
            regex::escape(nick)
        ))?;
        Ok(Self {
            nick: nick.to_string(),
            ping: Regex::new(PING_PATTERN)?,
            welcome: Regex::new(WELCOME_PATTERN)?,
            directed,
        })
    }

    /// Nickname this matcher answers to.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// `PING :<token>` anywhere in the line.
    pub fn match_ping(&self, line: &str) -> Option<InboundEvent> {
        self.ping.captures(line).map(|caps| InboundEvent::Ping {
            token: caps[1].to_string(),
        })
    }

    /// `001 ... Welcome` anywhere in the line.
    pub fn match_welcome(&self, line: &str) -> Option<InboundEvent> {
        self.welcome.is_match(line).then_some(InboundEvent::Welcome)
    }

    /// `:<sender>!... PRIVMSG <channel> :<nick>: <text>`.
    pub fn match_directed(&self, line: &str) -> Option<InboundEvent> {
        self.directed.captures(line).map(|caps| {
            InboundEvent::DirectedMessage(ChatRequest::new(&caps[3], &caps[1], &caps[2]))
        })
    }

    /// Every event the line carries, in dispatch order.
    ///
    /// A line may match more than one pattern; each match is acted on.
    pub fn events(&self, line: &str) -> Vec<InboundEvent> {
        let events: Vec<_> = [
            self.match_ping(line),
            self.match_welcome(line),
            self.match_directed(line),
        ]
        .into_iter()
        .flatten()
        .collect();

        if events.is_empty() {
            vec![InboundEvent::Unrecognized]
        } else {
            events
        }
    }
}

/// Splits a byte stream into lines, carrying partial lines between reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    /// Feed one read's worth of bytes; returns the complete lines, in order.
    ///
    /// Lines are decoded lossily, lose their trailing `\r`, and empty lines
    /// are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}
