//! [`DecisionLink`] – WebSocket client for the remote decision service.
//!
//! One binary MessagePack frame goes out per control cycle and exactly one
//! reply frame is awaited, bounded by [`LinkConfig::exchange_timeout`].  The
//! outcomes fall into two groups:
//!
//! - **transient** (timeout, `ERROR` reply, unknown reply kind, malformed
//!   payload): `exchange` returns `None` and the session stays open;
//! - **terminal** (peer closed, transport error): `exchange` returns `None`
//!   and the link marks itself disconnected.

use std::time::Duration;

use async_trait::async_trait;
use brainstem_types::{ActuationCommand, BrainstemError, SensorSnapshot};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::protocol::{self, Reply};
use crate::service::{DecisionService, LinkStats};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:9977";
pub const DEFAULT_ROBOT_ID: &str = "brainstem_robot";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_SLOW_RESPONSE_WARN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub endpoint: String,
    pub robot_id: String,
    pub connect_timeout: Duration,
    pub exchange_timeout: Duration,
    /// Successful round trips slower than this are logged as warnings.
    pub slow_response_warn: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            robot_id: DEFAULT_ROBOT_ID.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            slow_response_warn: DEFAULT_SLOW_RESPONSE_WARN,
        }
    }
}

#[derive(Default)]
struct SessionState {
    socket: Option<Socket>,
    connected: bool,
    connection_attempts: u32,
    last_contact: Option<Instant>,
    message_count: u64,
}

/// WebSocket implementation of [`DecisionService`].
pub struct DecisionLink {
    config: LinkConfig,
    session: SessionState,
}

fn transport_error(err: tungstenite::Error) -> BrainstemError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            BrainstemError::LinkClosed(err.to_string())
        }
        other => BrainstemError::Transport(other.to_string()),
    }
}

impl DecisionLink {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            session: SessionState::default(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    async fn open(&self) -> Result<Socket, BrainstemError> {
        let endpoint = self.config.endpoint.as_str();
        match timeout(self.config.connect_timeout, connect_async(endpoint)).await {
            Err(_) => Err(BrainstemError::LinkTimeout(format!(
                "connecting to {endpoint} took longer than {:?}",
                self.config.connect_timeout
            ))),
            Ok(Err(e)) => Err(BrainstemError::Transport(e.to_string())),
            Ok(Ok((socket, _response))) => Ok(socket),
        }
    }

    /// Drop replies that arrived after their exchange already timed out, so
    /// the next reply read belongs to the next request.
    fn discard_late_replies(socket: &mut Socket) -> Result<(), BrainstemError> {
        while let Some(item) = socket.next().now_or_never() {
            match item {
                Some(Ok(Message::Close(_))) | None => {
                    return Err(BrainstemError::LinkClosed("peer closed the session".into()));
                }
                Some(Ok(frame)) => debug!(len = frame.len(), "discarding late frame"),
                Some(Err(e)) => return Err(transport_error(e)),
            }
        }
        Ok(())
    }

    async fn round_trip(&mut self, snapshot: &SensorSnapshot) -> Result<Reply, BrainstemError> {
        let frame = protocol::encode_request(snapshot, &self.config.robot_id)?;
        let limit = self.config.exchange_timeout;
        let socket = self
            .session
            .socket
            .as_mut()
            .ok_or_else(|| BrainstemError::LinkClosed("no open session".into()))?;

        Self::discard_late_replies(socket)?;

        let exchange = async {
            if let Err(e) = socket.send(Message::binary(frame)).await {
                return Err(transport_error(e));
            }
            loop {
                match socket.next().await {
                    Some(Ok(Message::Binary(bytes))) => return protocol::decode_reply(&bytes),
                    Some(Ok(Message::Text(_))) => {
                        return Err(BrainstemError::ProtocolAnomaly(
                            "text frame where a binary reply was expected".into(),
                        ));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(BrainstemError::LinkClosed("peer closed the session".into()));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(transport_error(e)),
                }
            }
        };

        timeout(limit, exchange).await.map_err(|_| {
            BrainstemError::LinkTimeout(format!("no reply within {} ms", limit.as_millis()))
        })?
    }

    fn record_success(&mut self) {
        self.session.message_count += 1;
        self.session.last_contact = Some(Instant::now());
    }
}

#[async_trait]
impl DecisionService for DecisionLink {
    async fn connect(&mut self) -> bool {
        if self.session.socket.is_some() {
            self.disconnect().await;
        }
        info!(endpoint = %self.config.endpoint, "connecting to decision service");

        match self.open().await {
            Ok(socket) => {
                self.session.socket = Some(socket);
                self.session.connected = true;
                self.session.connection_attempts = 0;
                self.session.last_contact = Some(Instant::now());
                info!(endpoint = %self.config.endpoint, "decision service connected");
                true
            }
            Err(e) => {
                self.session.connected = false;
                self.session.connection_attempts += 1;
                warn!(
                    endpoint = %self.config.endpoint,
                    attempt = self.session.connection_attempts,
                    error = %e,
                    "decision service connection failed"
                );
                false
            }
        }
    }

    async fn exchange(&mut self, snapshot: &SensorSnapshot) -> Option<ActuationCommand> {
        if !self.session.connected {
            return None;
        }

        let sent = Instant::now();
        match self.round_trip(snapshot).await {
            Ok(Reply::MotorCommands { data }) => {
                let rtt = sent.elapsed();
                if rtt > self.config.slow_response_warn {
                    warn!(latency_ms = rtt.as_millis() as u64, "slow decision service response");
                }
                self.record_success();
                Some(data.into_command())
            }
            Ok(Reply::Error { error }) => {
                warn!(
                    error = error.as_deref().unwrap_or("unspecified"),
                    "decision service reported an error"
                );
                None
            }
            Ok(Reply::Unknown) => {
                warn!("decision service sent an unknown reply kind");
                None
            }
            Err(e) if e.is_session_fatal() => {
                warn!(error = %e, "decision service session lost");
                self.session.connected = false;
                None
            }
            Err(e) => {
                warn!(error = %e, "no usable reply from decision service");
                None
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut socket) = self.session.socket.take() {
            match timeout(self.config.exchange_timeout, socket.close(None)).await {
                Ok(Ok(())) => debug!("close handshake sent"),
                Ok(Err(e)) => debug!(error = %e, "close handshake failed"),
                Err(_) => debug!("close handshake timed out"),
            }
        }
        if self.session.connected {
            info!(endpoint = %self.config.endpoint, "decision service disconnected");
        }
        self.session.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.session.connected
    }

    fn stats(&self) -> LinkStats {
        LinkStats {
            endpoint: self.config.endpoint.clone(),
            connected: self.session.connected,
            attempts: self.session.connection_attempts,
            successes: self.session.message_count,
            staleness: self.session.last_contact.map(|t| t.elapsed()),
        }
    }
}
