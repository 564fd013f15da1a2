//! MegaHAL's line protocol over a pair of byte streams.
//!
//! The engine reads newline-delimited input and treats a blank line as the
//! end of a request. Replies come back one line at a time; a reply is over
//! when a line ends in something other than a word character. Multi-line
//! replies are flattened with single spaces.
//!
//! [`EngineIo`] is generic over the reader and writer so it can be driven by
//! a child process's pipes in production and by an in-memory duplex stream
//! in tests.

// Rust guideline compliant 2026-02

use std::io::ErrorKind;

use futures_util::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::chat::ChatReply;
use crate::error::EngineError;

/// Leading character that marks engine commands such as `#QUIT`.
///
/// Stripped from chat text so channel users cannot drive the engine.
pub const COMMAND_MARKER: char = '#';

/// Persist the brain to the data directory.
pub const SAVE_COMMAND: &str = "#SAVE";

/// Persist and exit.
pub const QUIT_COMMAND: &str = "#QUIT";

/// Bytes read per attempt while draining stray output.
pub const DRAIN_CHUNK: usize = 128;

/// Remove a single leading [`COMMAND_MARKER`], if present.
pub fn strip_marker(text: &str) -> &str {
    text.strip_prefix(COMMAND_MARKER).unwrap_or(text)
}

/// `true` for ASCII letters, digits and underscore.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether a trimmed reply line ends the reply.
///
/// The last character must exist and must not be a word character. Blank
/// lines never end a reply.
pub fn is_final_line(line: &str) -> bool {
    line.chars().last().is_some_and(|c| !is_word_char(c))
}

/// Request/reply framing over the engine's input and output.
#[derive(Debug)]
pub struct EngineIo<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R, W> EngineIo<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap the engine's output (`reader`) and input (`writer`).
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Write `text` followed by the blank terminator line.
    async fn send(&mut self, text: &str) -> Result<(), EngineError> {
        self.writer
            .write_all(text.as_bytes())
            .await
            .map_err(EngineError::Write)?;
        self.writer
            .write_all(b"\n\n")
            .await
            .map_err(EngineError::Write)?;
        self.writer.flush().await.map_err(EngineError::Write)
    }

    /// Send one chat line and read the engine's reply.
    pub async fn answer(&mut self, text: &str) -> Result<ChatReply, EngineError> {
        self.send(strip_marker(text)).await?;
        self.read_reply().await
    }

    /// Read lines until [`is_final_line`] accepts one, joining them with spaces.
    pub async fn read_reply(&mut self) -> Result<ChatReply, EngineError> {
        let mut lines = Vec::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(EngineError::Read)?;
            if n == 0 {
                return Err(EngineError::Closed);
            }

            let line = String::from_utf8_lossy(&buf).trim().to_string();
            let done = is_final_line(&line);
            lines.push(line);
            if done {
                break;
            }
        }

        Ok(ChatReply(lines.join(" ")))
    }

    /// Ask the engine to persist its brain, then discard the acknowledgement.
    pub async fn save(&mut self) -> Result<(), EngineError> {
        self.send(SAVE_COMMAND).await?;
        self.wait_readable().await?;
        self.resync()?;
        Ok(())
    }

    /// Ask the engine to exit. Does not wait for any output.
    pub async fn quit(&mut self) -> Result<(), EngineError> {
        self.send(QUIT_COMMAND).await
    }

    /// Wait until the engine has output available, without consuming it.
    pub async fn wait_readable(&mut self) -> Result<(), EngineError> {
        let available = self.reader.fill_buf().await.map_err(EngineError::Read)?;
        if available.is_empty() {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    /// Discard everything the engine has already written, without blocking.
    ///
    /// Each read is polled exactly once; a pending read means no more output
    /// is immediately available and ends the drain. Returns the number of
    /// bytes discarded.
    pub fn resync(&mut self) -> Result<usize, EngineError> {
        let mut chunk = [0u8; DRAIN_CHUNK];
        let mut drained = 0;

        loop {
            match self.reader.read(&mut chunk).now_or_never() {
                None => break,
                Some(Ok(0)) => return Err(EngineError::Closed),
                Some(Ok(n)) => drained += n,
                Some(Err(e)) if e.kind() == ErrorKind::WouldBlock => break,
                Some(Err(e)) => return Err(EngineError::Read(e)),
            }
        }

        Ok(drained)
    }
}
