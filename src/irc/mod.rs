//! IRC connection endpoint and unit.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──USER/NICK sent──► Registered ──001 Welcome──► Joining ──all JOINs sent──► Joined
//!
//! quit: any state ──► Closing (loop exits)
//! ```
//!
//! The endpoint owns its socket exclusively. Directed messages are answered
//! through the [`ChatRouter`] handed to it at construction; the read loop is
//! blocked until each reply is written back, so one chat turn is served at a
//! time.

// Rust guideline compliant 2026-02

pub mod commands;
pub mod events;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

pub use commands::{ClientCommand, ClientHandle, Outbound, CLIENT_UNIT, QUIT_REASON};
pub use events::{InboundEvent, LineBuffer, LineMatcher};

use crate::chat::{ChatRequest, ChatRouter};
use crate::config::Config;
use crate::error::ConnectionError;
use crate::supervisor::Unit;

/// Bytes requested per socket read.
const READ_CHUNK: usize = 4096;

/// Lifecycle state of the connection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Socket open, registration not yet sent.
    Connecting,
    /// `USER` and `NICK` sent.
    Registered,
    /// Welcome seen, joins being sent.
    Joining,
    /// Every configured channel joined.
    Joined,
    /// `QUIT` sent; the loop is ending.
    Closing,
}

/// Identity and behaviour of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Username for the `USER` line.
    pub user: String,
    /// Channels joined after the welcome numeric, in order.
    pub channels: Vec<String>,
    /// Optional bound on socket silence.
    pub read_timeout: Option<Duration>,
}

impl EndpointSettings {
    /// Settings taken from the loaded config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            user: config.irc.user.clone(),
            channels: config.irc.join.clone(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// Speaks the IRC line protocol over one stream.
pub struct ConnectionEndpoint<S> {
    stream: S,
    settings: EndpointSettings,
    matcher: LineMatcher,
    router: Arc<dyn ChatRouter>,
    lines: LineBuffer,
    state: ClientState,
    running: bool,
}

impl<S> fmt::Debug for ConnectionEndpoint<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEndpoint")
            .field("nick", &self.matcher.nick())
            .field("state", &self.state)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl ConnectionEndpoint<TcpStream> {
    /// Dial `addr`, wait until the socket is writable, and register.
    pub async fn connect(
        addr: &str,
        settings: EndpointSettings,
        matcher: LineMatcher,
        router: Arc<dyn ChatRouter>,
    ) -> Result<Self, ConnectionError> {
        log::info!("[Irc] Connecting to {}", addr);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream
            .writable()
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        let mut endpoint = Self::new(stream, settings, matcher, router);
        endpoint.register().await?;
        Ok(endpoint)
    }
}

impl<S> ConnectionEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open stream. Nothing is sent yet.
    pub fn new(
        stream: S,
        settings: EndpointSettings,
        matcher: LineMatcher,
        router: Arc<dyn ChatRouter>,
    ) -> Self {
        Self {
            stream,
            settings,
            matcher,
            router,
            lines: LineBuffer::default(),
            state: ClientState::Connecting,
            running: true,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Whether the read loop keeps going.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Send `USER` then `NICK`.
    pub async fn register(&mut self) -> Result<(), ConnectionError> {
        let user = self.settings.user.clone();
        let nick = self.matcher.nick().to_string();
        self.write_line(Outbound::User(&user)).await?;
        self.write_line(Outbound::Nick(&nick)).await?;
        self.state = ClientState::Registered;
        log::info!("[Irc] Registered as {}", nick);
        Ok(())
    }

    /// Join `channel`.
    pub async fn join(&mut self, channel: &str) -> Result<(), ConnectionError> {
        log::info!("[Irc] Joining {}", channel);
        self.write_line(Outbound::Join(channel)).await
    }

    /// Leave `channel`.
    pub async fn part(&mut self, channel: &str) -> Result<(), ConnectionError> {
        log::info!("[Irc] Leaving {}", channel);
        self.write_line(Outbound::Part(channel)).await
    }

    /// Send `text` to a channel or nick.
    pub async fn say(&mut self, target: &str, text: &str) -> Result<(), ConnectionError> {
        self.write_line(Outbound::Privmsg { target, text }).await
    }

    /// Send `QUIT` and end the read loop at its next iteration.
    ///
    /// A failed write is logged; the loop stops either way.
    pub async fn quit(&mut self) {
        self.state = ClientState::Closing;
        self.running = false;
        if let Err(e) = self.write_line(Outbound::Quit(QUIT_REASON)).await {
            log::warn!("[Irc] Failed to send quit: {}", e);
        }
    }

    /// Write one protocol line with its `\n` terminator.
    pub async fn write_line(&mut self, line: Outbound<'_>) -> Result<(), ConnectionError> {
        log::debug!("[Irc] -> {}", line);
        let text = format!("{}\n", line);
        self.stream
            .write_all(text.as_bytes())
            .await
            .map_err(ConnectionError::Write)?;
        self.stream.flush().await.map_err(ConnectionError::Write)
    }

    /// Serve the socket and the mailbox until `quit`.
    ///
    /// Mailbox commands take priority over socket data. Returns `Ok` only
    /// after a quit; end of stream and I/O failures are errors.
    pub async fn run(
        &mut self,
        mailbox: &mut mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<(), ConnectionError> {
        let mut buf = vec![0u8; READ_CHUNK];

        while self.running {
            tokio::select! {
                biased;

                command = mailbox.recv() => match command {
                    Some(command) => self.handle_command(command).await?,
                    None => {
                        log::info!("[Irc] Mailbox closed, quitting");
                        self.quit().await;
                    }
                },
                read = read_some(&mut self.stream, &mut buf, self.settings.read_timeout) => {
                    let n = read?;
                    if n == 0 {
                        log::info!("[Irc] Server closed the connection");
                        return Err(ConnectionError::Closed);
                    }
                    for line in self.lines.push(&buf[..n]) {
                        self.dispatch_line(&line).await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_command(&mut self, command: ClientCommand) -> Result<(), ConnectionError> {
        match command {
            ClientCommand::Join(channel) => self.join(&channel).await,
            ClientCommand::Part(channel) => self.part(&channel).await,
            ClientCommand::Say { target, text } => self.say(&target, &text).await,
            ClientCommand::Quit => {
                self.quit().await;
                Ok(())
            }
        }
    }

    /// Act on every event one inbound line carries.
    pub async fn dispatch_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        log::trace!("[Irc] <- {}", line);

        for event in self.matcher.events(line) {
            match event {
                InboundEvent::Ping { token } => {
                    log::debug!("[Irc] Received PING, responding with {}", token);
                    self.write_line(Outbound::Pong(&token)).await?;
                }
                InboundEvent::Welcome => self.join_configured().await?,
                InboundEvent::DirectedMessage(request) => self.answer(request).await?,
                InboundEvent::Unrecognized => {}
            }
        }
        Ok(())
    }

    async fn join_configured(&mut self) -> Result<(), ConnectionError> {
        self.state = ClientState::Joining;
        let channels = self.settings.channels.clone();
        for channel in &channels {
            self.join(channel).await?;
        }
        self.state = ClientState::Joined;
        Ok(())
    }

    /// Run one chat turn and post the reply to the originating channel.
    async fn answer(&mut self, request: ChatRequest) -> Result<(), ConnectionError> {
        log::info!(
            "[Irc] <{}!{}> {}",
            request.sender,
            request.channel,
            request.text
        );

        let reply = match self.router.answer(request.clone()).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!(
                    "[Irc] No reply for {} on {}: {}",
                    request.sender,
                    request.channel,
                    e
                );
                return Ok(());
            }
        };

        let text = format!("{}: {}", request.sender, reply);
        log::info!("[Irc] Response: {}", text);
        self.write_line(Outbound::Privmsg {
            target: &request.channel,
            text: &text,
        })
        .await
    }
}

/// One read, optionally bounded.
async fn read_some<S>(
    stream: &mut S,
    buf: &mut [u8],
    limit: Option<Duration>,
) -> Result<usize, ConnectionError>
where
    S: AsyncRead + Unpin,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, stream.read(buf)).await {
            Ok(result) => result.map_err(ConnectionError::Read),
            Err(_elapsed) => Err(ConnectionError::Timeout(limit)),
        },
        None => stream.read(buf).await.map_err(ConnectionError::Read),
    }
}

/// Supervised unit that owns one IRC connection per incarnation.
///
/// Each incarnation dials, registers, and joins from scratch. The mailbox
/// is shared across incarnations.
pub struct ClientUnit {
    addr: String,
    settings: EndpointSettings,
    matcher: LineMatcher,
    router: Arc<dyn ChatRouter>,
    mailbox: Mutex<mpsc::UnboundedReceiver<ClientCommand>>,
}

impl fmt::Debug for ClientUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientUnit")
            .field("addr", &self.addr)
            .field("nick", &self.matcher.nick())
            .finish_non_exhaustive()
    }
}

impl ClientUnit {
    /// Create the unit and its handle. Chat turns go to `router`.
    pub fn new(
        config: &Config,
        router: Arc<dyn ChatRouter>,
    ) -> Result<(Self, ClientHandle), regex::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let unit = Self {
            addr: config.server_addr(),
            settings: EndpointSettings::from_config(config),
            matcher: LineMatcher::new(&config.irc.nick)?,
            router,
            mailbox: Mutex::new(rx),
        };
        Ok((unit, ClientHandle::new(tx)))
    }
}

#[async_trait]
impl Unit for ClientUnit {
    fn name(&self) -> &'static str {
        CLIENT_UNIT
    }

    async fn run(&self) -> anyhow::Result<()> {
        let mut mailbox = self.mailbox.lock().await;
        let mut endpoint = ConnectionEndpoint::connect(
            &self.addr,
            self.settings.clone(),
            self.matcher.clone(),
            Arc::clone(&self.router),
        )
        .await?;

        endpoint.run(&mut mailbox).await?;
        log::info!("[Irc] Disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatReply;
    use crate::error::ChatError;
    use crate::supervisor::UnitHandle;
    use std::sync::Mutex as StdMutex;
    use tokio::io::{duplex, split, AsyncBufReadExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    /// Echoes requests back after an optional delay, or fails every turn.
    #[derive(Default)]
    struct FakeRouter {
        requests: StdMutex<Vec<ChatRequest>>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ChatRouter for FakeRouter {
        async fn answer(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let text = format!("echo {}.", request.text);
            self.requests.lock().unwrap().push(request);
            if self.fail {
                Err(ChatError::Engine("boom".to_string()))
            } else {
                Ok(ChatReply(text))
            }
        }
    }

    struct Harness {
        server_lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        server_tx: WriteHalf<DuplexStream>,
        handle: ClientHandle,
        task: JoinHandle<(ConnectionEndpoint<DuplexStream>, Result<(), ConnectionError>)>,
    }

    impl Harness {
        async fn next_line(&mut self) -> String {
            self.server_lines.next_line().await.unwrap().unwrap()
        }

        async fn send(&mut self, bytes: &str) {
            self.server_tx.write_all(bytes.as_bytes()).await.unwrap();
            self.server_tx.flush().await.unwrap();
        }
    }

    fn settings() -> EndpointSettings {
        EndpointSettings {
            user: "bot".to_string(),
            channels: vec!["#a".to_string(), "#b".to_string()],
            read_timeout: None,
        }
    }

    /// Register an endpoint over a duplex stream and start its loop.
    async fn start(router: Arc<FakeRouter>) -> Harness {
        let (ours, server) = duplex(8192);
        let mut endpoint = ConnectionEndpoint::new(
            ours,
            settings(),
            LineMatcher::new("botnick").unwrap(),
            router,
        );
        endpoint.register().await.unwrap();
        assert_eq!(endpoint.state(), ClientState::Registered);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let result = endpoint.run(&mut rx).await;
            (endpoint, result)
        });

        let (server_rx, server_tx) = split(server);
        let mut harness = Harness {
            server_lines: BufReader::new(server_rx).lines(),
            server_tx,
            handle: ClientHandle::new(tx),
            task,
        };
        assert_eq!(harness.next_line().await, "USER bot bot bot : bot");
        assert_eq!(harness.next_line().await, "NICK botnick");
        harness
    }

    #[tokio::test]
    async fn test_ping_welcome_and_noise_in_one_read() {
        let router = Arc::new(FakeRouter::default());
        let mut h = start(Arc::clone(&router)).await;

        h.send("PING :abc\r\n:srv 001 botnick :Welcome to the network\r\n:srv NOTICE * :hi\r\n")
            .await;
        assert_eq!(h.next_line().await, "PONG :abc");
        assert_eq!(h.next_line().await, "JOIN :#a");
        assert_eq!(h.next_line().await, "JOIN :#b");

        h.handle.quit();
        assert_eq!(h.next_line().await, "QUIT :exited");
        let (endpoint, result) = h.task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(endpoint.state(), ClientState::Closing);
        assert!(!endpoint.is_running());
        assert!(router.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directed_message_is_answered_in_channel() {
        let router = Arc::new(FakeRouter::default());
        let mut h = start(Arc::clone(&router)).await;

        h.send(":alice!user@host PRIVMSG #room :botnick: hello there\r\n")
            .await;
        assert_eq!(h.next_line().await, "PRIVMSG #room :alice: echo hello there.");
        assert_eq!(
            router.requests.lock().unwrap().as_slice(),
            [ChatRequest::new("hello there", "alice", "#room")]
        );
    }

    #[tokio::test]
    async fn test_message_for_someone_else_is_ignored() {
        let router = Arc::new(FakeRouter::default());
        let mut h = start(Arc::clone(&router)).await;

        h.send(":alice!u@h PRIVMSG #room :otherbot: hello\r\nPING :after\r\n")
            .await;
        assert_eq!(h.next_line().await, "PONG :after");
        assert!(router.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let router = Arc::new(FakeRouter::default());
        let mut h = start(router).await;

        h.send("PI").await;
        tokio::task::yield_now().await;
        h.send("NG :split\r").await;
        h.send("\n").await;
        assert_eq!(h.next_line().await, "PONG :split");
    }

    #[tokio::test]
    async fn test_router_failure_sends_nothing() {
        let router = Arc::new(FakeRouter {
            fail: true,
            ..FakeRouter::default()
        });
        let mut h = start(Arc::clone(&router)).await;

        h.send(":alice!u@h PRIVMSG #room :botnick: hi\r\nPING :next\r\n")
            .await;
        assert_eq!(h.next_line().await, "PONG :next");
        assert_eq!(router.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_is_written_before_rest_of_batch() {
        let router = Arc::new(FakeRouter {
            delay: Some(Duration::from_millis(200)),
            ..FakeRouter::default()
        });
        let mut h = start(router).await;

        h.send(":a!u@h PRIVMSG #x :botnick: hi\r\nPING :t\r\n").await;
        assert_eq!(h.next_line().await, "PRIVMSG #x :a: echo hi.");
        assert_eq!(h.next_line().await, "PONG :t");
    }

    #[tokio::test]
    async fn test_mailbox_commands_are_written() {
        let mut h = start(Arc::new(FakeRouter::default())).await;

        h.handle.join("#new");
        h.handle.say("#new", "hello");
        h.handle.part("#new");
        assert_eq!(h.next_line().await, "JOIN :#new");
        assert_eq!(h.next_line().await, "PRIVMSG #new :hello");
        assert_eq!(h.next_line().await, "PART :#new");
    }

    #[tokio::test]
    async fn test_server_eof_is_closed() {
        let h = start(Arc::new(FakeRouter::default())).await;
        drop(h.server_lines);
        drop(h.server_tx);

        let (_endpoint, result) = h.task.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (ours, _server) = duplex(1024);
        let mut endpoint = ConnectionEndpoint::new(
            ours,
            EndpointSettings {
                read_timeout: Some(Duration::from_millis(20)),
                ..settings()
            },
            LineMatcher::new("botnick").unwrap(),
            Arc::new(FakeRouter::default()),
        );
        let (_tx, mut rx) = mpsc::unbounded_channel();

        let result = endpoint.run(&mut rx).await;
        assert!(matches!(result, Err(ConnectionError::Timeout(_))));
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::default();
        let settings = EndpointSettings::from_config(&config);
        assert_eq!(settings.user, "stirspeare");
        assert_eq!(settings.channels, vec!["#stirspeare"]);
        assert!(settings.read_timeout.is_none());
    }
}
