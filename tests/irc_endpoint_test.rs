//! Integration tests for the IRC connection unit against a loopback server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stirspeare::supervisor::{RestartPolicy, Supervisor};
use stirspeare::{ChatError, ChatReply, ChatRequest, ChatRouter, ClientUnit, Config, UnitHandle};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

/// Replies with the request text reversed and remembers every request.
#[derive(Default)]
struct ReversingRouter {
    seen: Mutex<Vec<ChatRequest>>,
}

#[async_trait]
impl ChatRouter for ReversingRouter {
    async fn answer(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let reversed: String = request.text.chars().rev().collect();
        self.seen.lock().unwrap().push(request);
        Ok(ChatReply(reversed))
    }
}

/// Server side of one accepted connection.
struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(10), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn expect(&mut self, line: &str) {
        let got = tokio::time::timeout(Duration::from_secs(10), self.lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.as_deref(), Some(line));
    }

    async fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
    }
}

fn client_config(port: u16) -> Config {
    let mut config = Config::default();
    config.irc.server = "127.0.0.1".to_string();
    config.irc.port = port;
    config.irc.user = "bot".to_string();
    config.irc.nick = "botnick".to_string();
    config.irc.join = vec!["#a".to_string(), "#b".to_string()];
    config
}

#[tokio::test]
async fn test_register_join_answer_and_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let router = Arc::new(ReversingRouter::default());

    let router_handle: Arc<dyn ChatRouter> = Arc::clone(&router) as Arc<dyn ChatRouter>;
    let (unit, handle) = ClientUnit::new(&client_config(port), router_handle).unwrap();
    let mut supervisor = Supervisor::new(RestartPolicy::unlimited());
    supervisor.supervise(Arc::new(unit), Arc::new(handle.clone()));

    let mut peer = Peer::accept(&listener).await;
    peer.expect("USER bot bot bot : bot").await;
    peer.expect("NICK botnick").await;

    peer.send("PING :keepalive\r\n:irc.test 001 botnick :Welcome to the test net\r\n")
        .await;
    peer.expect("PONG :keepalive").await;
    peer.expect("JOIN :#a").await;
    peer.expect("JOIN :#b").await;

    peer.send(":alice!al@host PRIVMSG #a :botnick: stressed\r\n")
        .await;
    peer.expect("PRIVMSG #a :alice: desserts").await;
    assert_eq!(
        router.seen.lock().unwrap().as_slice(),
        [ChatRequest::new("stressed", "alice", "#a")]
    );

    // Dropping the connection makes the supervisor dial again from scratch.
    drop(peer);
    let mut peer = Peer::accept(&listener).await;
    peer.expect("USER bot bot bot : bot").await;
    peer.expect("NICK botnick").await;

    handle.say("#a", "back");
    peer.expect("PRIVMSG #a :back").await;

    handle.quit();
    peer.expect("QUIT :exited").await;

    let reports = supervisor.wait().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].name, "client");
    assert_eq!(reports[0].restarts, 1);
}

#[tokio::test]
async fn test_unreachable_server_gives_up_under_capped_policy() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let (unit, handle) =
        ClientUnit::new(&client_config(port), Arc::new(ReversingRouter::default())).unwrap();
    let mut supervisor = Supervisor::new(RestartPolicy {
        max_restarts: Some(2),
        backoff_ms: 10,
    });
    supervisor.supervise(Arc::new(unit), Arc::new(handle));

    let reports = supervisor.wait().await;
    assert!(reports[0].gave_up);
    assert_eq!(reports[0].restarts, 2);
}
