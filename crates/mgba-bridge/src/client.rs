//! TCP client for the mGBA Lua bridge script
//!
//! One request is in flight at a time. Every read is bounded by
//! `read_timeout`; recoverable failures come back as error observations and
//! only a lost connection is an `Err`.
//!
//! The script answers every command with exactly one reply. After a timeout
//! that reply is still owed, so it is read and discarded before the next
//! command goes out; otherwise every later reply would pair with the wrong
//! request.

use crate::protocol::{Command, Reply, parse_reply};
use async_trait::async_trait;
use emerald_rl_agent::GameEnvironment;
use emerald_rl_core::{AgentError, Button, Observation, ObservationFault, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Connection settings for the emulator script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MgbaConfig {
    /// Host to connect to (default: 127.0.0.1)
    pub host: String,
    /// Port the Lua script listens on (default: 8888)
    pub port: u16,
    /// Connect bound, milliseconds
    pub connect_timeout_ms: u64,
    /// Per-reply read bound, milliseconds
    pub read_timeout_ms: u64,
    /// Largest reply read in one exchange
    pub read_buffer: usize,
    /// How long to wait for a reply owed from a timed-out command, milliseconds
    pub late_reply_timeout_ms: u64,
}

impl Default for MgbaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8888,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 5_000,
            read_buffer: 1024,
            late_reply_timeout_ms: 10_000,
        }
    }
}

impl MgbaConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn late_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.late_reply_timeout_ms)
    }
}

/// Handshake result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    /// Banner the script sends on accept
    pub greeting: String,
}

/// Outcome of one request/reply exchange
enum Exchange {
    Reply(String),
    TimedOut,
}

/// Client for the emulator's line protocol
pub struct MgbaClient<S = TcpStream> {
    config: MgbaConfig,
    stream: Option<S>,
    /// A timed-out command's reply has not been read yet
    reply_owed: bool,
}

impl MgbaClient<TcpStream> {
    /// Create an unconnected client
    pub fn new(config: MgbaConfig) -> Self {
        Self {
            config,
            stream: None,
            reply_owed: false,
        }
    }

    /// Open the connection and read the greeting banner
    pub async fn connect(&mut self) -> Result<Ready> {
        let addr = self.config.address();
        info!("Connecting to mGBA at {}", addr);

        let mut stream = tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| AgentError::Connection(format!("Connection timeout to {}", addr)))?
            .map_err(|e| AgentError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| AgentError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

        let mut buf = vec![0u8; self.config.read_buffer.max(1)];
        let n = tokio::time::timeout(self.config.read_timeout(), stream.read(&mut buf))
            .await
            .map_err(|_| AgentError::Connection(format!("No greeting from {}", addr)))?
            .map_err(|e| AgentError::Connection(format!("Greeting read failed: {}", e)))?;
        if n == 0 {
            return Err(AgentError::Connection(format!(
                "{} closed the connection before greeting",
                addr
            )));
        }

        let greeting = String::from_utf8_lossy(&buf[..n]).trim().to_string();
        info!("Connected to mGBA: {}", greeting);
        self.stream = Some(stream);
        self.reply_owed = false;
        Ok(Ready { greeting })
    }
}

impl<S> MgbaClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-connected stream; no greeting is read
    pub fn with_stream(config: MgbaConfig, stream: S) -> Self {
        Self {
            config,
            stream: Some(stream),
            reply_owed: false,
        }
    }

    pub fn config(&self) -> &MgbaConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Read and drop the reply owed from a timed-out command.
    ///
    /// Returns false if it still has not arrived; nothing may be sent then.
    async fn discard_late_reply(&mut self) -> Result<bool> {
        let bound = self.config.late_reply_timeout();
        let mut buf = vec![0u8; self.config.read_buffer.max(1)];
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AgentError::Connection("Not connected".into()))?;

        let read = tokio::time::timeout(bound, stream.read(&mut buf)).await;
        match read {
            Err(_) => {
                warn!("Late reply still outstanding after {:?}", bound);
                Ok(false)
            }
            Ok(Err(e)) => {
                self.stream = None;
                Err(AgentError::Connection(format!("Read failed: {}", e)))
            }
            Ok(Ok(0)) => {
                self.stream = None;
                Err(AgentError::Connection("Emulator closed the connection".into()))
            }
            Ok(Ok(n)) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                debug!("Discarded late reply: {}", text.trim());
                self.reply_owed = false;
                Ok(true)
            }
        }
    }

    /// Send one command and wait for one bounded reply
    async fn exchange(&mut self, command: Command) -> Result<Exchange> {
        if self.reply_owed && !self.discard_late_reply().await? {
            warn!("Not sending {} while a reply is owed", command);
            return Ok(Exchange::TimedOut);
        }

        let read_timeout = self.config.read_timeout();
        let mut buf = vec![0u8; self.config.read_buffer.max(1)];
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AgentError::Connection("Not connected".into()))?;

        debug!("[Rust→mGBA] {}", command);
        let write = async {
            stream.write_all(&command.encode()).await?;
            stream.flush().await
        };
        if let Err(e) = write.await {
            self.stream = None;
            return Err(AgentError::Connection(format!("Write failed: {}", e)));
        }

        let read = tokio::time::timeout(read_timeout, stream.read(&mut buf)).await;
        let n = match read {
            Err(_) => {
                warn!("No reply to {} within {:?}", command, read_timeout);
                self.reply_owed = true;
                return Ok(Exchange::TimedOut);
            }
            Ok(Err(e)) => {
                self.stream = None;
                return Err(AgentError::Connection(format!("Read failed: {}", e)));
            }
            Ok(Ok(0)) => {
                self.stream = None;
                return Err(AgentError::Connection("Emulator closed the connection".into()));
            }
            Ok(Ok(n)) => n,
        };

        let text = String::from_utf8_lossy(&buf[..n]).trim().to_string();
        debug!("[mGBA→Rust] {}", text);
        Ok(Exchange::Reply(text))
    }

    /// Exchange a command whose reply should be `STATE:`
    async fn observe(&mut self, command: Command) -> Result<Observation> {
        let text = match self.exchange(command).await? {
            Exchange::TimedOut => return Ok(Observation::error(ObservationFault::Timeout)),
            Exchange::Reply(text) => text,
        };

        match parse_reply(&text) {
            Ok(Reply::State(obs)) => Ok(obs),
            Ok(Reply::Error(reason)) => {
                warn!("Emulator error for {}: {}", command, reason);
                Ok(Observation::error(ObservationFault::ServerError))
            }
            Ok(other) => {
                warn!("Unexpected reply to {}: {:?}", command, other);
                Ok(Observation::error(ObservationFault::Malformed))
            }
            Err(e) => {
                warn!("Malformed reply to {}: {}", command, e);
                Ok(Observation::error(ObservationFault::Malformed))
            }
        }
    }

    /// Press a button (`STEP:<BUTTON>`)
    pub async fn step(&mut self, button: Button) -> Result<Observation> {
        self.observe(Command::Step(button)).await
    }

    /// Press a button by name; unknown names never reach the wire
    pub async fn step_named(&mut self, name: &str) -> Result<Observation> {
        match Button::from_name(name) {
            Some(button) => self.step(button).await,
            None => {
                warn!("Rejected unknown button {:?}", name);
                Ok(Observation::error(ObservationFault::InvalidAction))
            }
        }
    }

    /// Observe without acting (`GETSTATE`)
    pub async fn get_state(&mut self) -> Result<Observation> {
        self.observe(Command::GetState).await
    }

    /// Reload the fixed save state; true only on `RESET_OK`
    pub async fn reset(&mut self) -> Result<bool> {
        self.acknowledge(Command::Reset, Reply::ResetOk).await
    }

    /// Liveness check; true only on `PONG`
    pub async fn ping(&mut self) -> Result<bool> {
        self.acknowledge(Command::Ping, Reply::Pong).await
    }

    async fn acknowledge(&mut self, command: Command, wanted: Reply) -> Result<bool> {
        let text = match self.exchange(command).await? {
            Exchange::TimedOut => return Ok(false),
            Exchange::Reply(text) => text,
        };
        match parse_reply(&text) {
            Ok(reply) if reply == wanted => Ok(true),
            Ok(Reply::Error(reason)) => {
                warn!("Emulator error for {}: {}", command, reason);
                Ok(false)
            }
            Ok(other) => {
                warn!("Unexpected reply to {}: {:?}", command, other);
                Ok(false)
            }
            Err(e) => {
                warn!("Malformed reply to {}: {}", command, e);
                Ok(false)
            }
        }
    }

    /// Shut the socket down; later calls are no-ops
    pub async fn disconnect(&mut self) {
        self.reply_owed = false;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Shutdown error (ignored): {}", e);
            }
            info!("Disconnected from mGBA");
        }
    }
}

#[async_trait]
impl<S> GameEnvironment for MgbaClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn reset(&mut self) -> Result<bool> {
        MgbaClient::reset(self).await
    }

    async fn get_state(&mut self) -> Result<Observation> {
        MgbaClient::get_state(self).await
    }

    async fn step(&mut self, button: Button) -> Result<Observation> {
        MgbaClient::step(self, button).await
    }

    async fn ping(&mut self) -> Result<bool> {
        MgbaClient::ping(self).await
    }

    async fn disconnect(&mut self) {
        MgbaClient::disconnect(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emerald_rl_core::Direction;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn fast_config() -> MgbaConfig {
        MgbaConfig {
            read_timeout_ms: 50,
            late_reply_timeout_ms: 100,
            ..MgbaConfig::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = MgbaConfig::default();
        assert_eq!(config.address(), "127.0.0.1:8888");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_buffer, 1024);
        assert_eq!(config.late_reply_timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_step_parses_state() {
        let mock = Builder::new()
            .write(b"STEP:RIGHT\n")
            .read(b"STATE:5,9,0,16,false,false,RIGHT,12,RIGHT\n")
            .build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        let obs = client.step(Button::Right).await.unwrap();
        assert!(!obs.is_error());
        assert_eq!((obs.x, obs.y), (5, 9));
        assert_eq!(obs.facing, Direction::Right);
        assert_eq!(obs.step_count, 12);
    }

    #[tokio::test]
    async fn test_short_state_is_malformed_observation() {
        let mock = Builder::new()
            .write(b"GETSTATE\n")
            .read(b"STATE:5,9,0,16,false,true,RIGHT,12")
            .build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        let obs = client.get_state().await.unwrap();
        assert_eq!(obs.fault, Some(ObservationFault::Malformed));
        assert!(!obs.done);
        assert_eq!(obs.x, -1);
    }

    #[tokio::test]
    async fn test_server_error_reply() {
        let mock = Builder::new()
            .write(b"STEP:A\n")
            .read(b"ERROR:emulator busy\n")
            .build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        let obs = client.step(Button::A).await.unwrap();
        assert_eq!(obs.fault, Some(ObservationFault::ServerError));
    }

    #[tokio::test]
    async fn test_timeout_yields_timeout_observation() {
        let mock = Builder::new()
            .write(b"GETSTATE\n")
            .wait(Duration::from_secs(2))
            .build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        let obs = client.get_state().await.unwrap();
        assert!(obs.is_timeout());
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_reset_and_ping() {
        let mock = Builder::new()
            .write(b"RESET\n")
            .read(b"RESET_OK\n")
            .write(b"PING\n")
            .read(b"PONG\n")
            .write(b"RESET\n")
            .read(b"ERROR:no save state\n")
            .build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        assert!(client.reset().await.unwrap());
        assert!(client.ping().await.unwrap());
        assert!(!client.reset().await.unwrap());
    }

    #[tokio::test]
    async fn test_ping_timeout_is_false() {
        let mock = Builder::new()
            .write(b"PING\n")
            .wait(Duration::from_secs(2))
            .build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        assert!(!client.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_connection_is_fatal() {
        let mock = Builder::new().write(b"PING\n").build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, AgentError::Connection(_)));
        assert!(err.is_fatal());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_unknown_button_never_sent() {
        let mock = Builder::new().build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        let obs = client.step_named("JUMP").await.unwrap();
        assert_eq!(obs.fault, Some(ObservationFault::InvalidAction));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mock = Builder::new().build();
        let mut client = MgbaClient::with_stream(fast_config(), mock);

        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
        assert!(matches!(
            client.get_state().await,
            Err(AgentError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_reads_greeting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"Welcome to mGBA\n").await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"PING\n");
            socket.write_all(b"PONG\n").await.unwrap();
        });

        let mut client = MgbaClient::new(MgbaConfig {
            port,
            ..fast_config()
        });
        let ready = client.connect().await.unwrap();
        assert_eq!(ready.greeting, "Welcome to mGBA");
        assert!(GameEnvironment::ping(&mut client).await.unwrap());

        GameEnvironment::disconnect(&mut client).await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = MgbaClient::new(MgbaConfig {
            port,
            ..fast_config()
        });
        assert!(matches!(
            client.connect().await,
            Err(AgentError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_late_reply_is_discarded_before_next_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"Welcome to mGBA\n").await.unwrap();
            let mut buf = [0u8; 64];

            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"STEP:UP\n");
            tokio::time::sleep(Duration::from_millis(150)).await;
            socket
                .write_all(b"STATE:1,1,0,9,false,false,UP,1,UP\n")
                .await
                .unwrap();

            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"RESET\n");
            socket.write_all(b"RESET_OK\n").await.unwrap();

            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"GETSTATE\n");
            socket
                .write_all(b"STATE:4,5,0,9,false,false,NONE,0,DOWN\n")
                .await
                .unwrap();
        });

        let mut client = MgbaClient::new(MgbaConfig {
            port,
            late_reply_timeout_ms: 1_000,
            ..fast_config()
        });
        client.connect().await.unwrap();

        let obs = client.step(Button::Up).await.unwrap();
        assert!(obs.is_timeout());

        assert!(client.reset().await.unwrap());
        let obs = client.get_state().await.unwrap();
        assert!(!obs.is_error());
        assert_eq!((obs.x, obs.y), (4, 5));
        assert_eq!(obs.facing, Direction::Down);

        client.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_nothing_sent_while_reply_owed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (late_tx, late_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"Welcome to mGBA\n").await.unwrap();
            let mut buf = [0u8; 64];

            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"GETSTATE\n");
            // Hold the reply until the client has given up twice
            late_rx.await.unwrap();
            socket
                .write_all(b"STATE:1,1,0,9,false,false,NONE,0,UP\n")
                .await
                .unwrap();

            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"PING\n");
            socket.write_all(b"PONG\n").await.unwrap();
        });

        let mut client = MgbaClient::new(MgbaConfig {
            port,
            ..fast_config()
        });
        client.connect().await.unwrap();

        assert!(client.get_state().await.unwrap().is_timeout());
        // Owed reply never arrives within the bound, so PING is not sent
        assert!(!client.ping().await.unwrap());

        late_tx.send(()).unwrap();
        assert!(client.ping().await.unwrap());

        client.disconnect().await;
        server.await.unwrap();
    }
}
