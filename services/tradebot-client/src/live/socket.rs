//! WebSocket client for the live update channel
//!
//! One background task owns the connection. Decoded messages fan out to
//! every subscriber through a broadcast channel; slow subscribers lose
//! messages rather than stalling the socket.

use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::events::{LiveEvent, LiveUpdate};
use crate::api::{Authenticator, RetryPolicy};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("Invalid live channel URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported live channel scheme: {0}")]
    UnsupportedScheme(String),

    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    #[error("Live channel rejected the access token")]
    Unauthorized { token: Option<String> },
}

/// Live channel connection with automatic reconnect
pub struct LiveSocket {
    url: Url,
    auth: Authenticator,
    backoff: RetryPolicy,
    events: broadcast::Sender<LiveUpdate>,
    connected: Arc<RwLock<bool>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveSocket {
    pub fn new(url: &str, auth: Authenticator, backoff: RetryPolicy) -> Result<Self, LiveError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(LiveError::UnsupportedScheme(url.scheme().to_string()));
        }

        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            url,
            auth,
            backoff,
            events,
            connected: Arc::new(RwLock::new(false)),
            shutdown,
            task: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// New receiver for every update published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.events.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Spawn the connection task; false if it is already running
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        self.shutdown.send_replace(false);
        let worker = Worker {
            url: self.url.clone(),
            auth: self.auth.clone(),
            backoff: self.backoff,
            events: self.events.clone(),
            connected: Arc::clone(&self.connected),
            shutdown: self.shutdown.subscribe(),
        };
        *task = Some(tokio::spawn(worker.run()));
        true
    }

    /// Close the connection and stop reconnecting
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let handle = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Live socket task ended abnormally: {}", e);
            }
        }
        info!("Live socket closed");
    }
}

struct Worker {
    url: Url,
    auth: Authenticator,
    backoff: RetryPolicy,
    events: broadcast::Sender<LiveUpdate>,
    connected: Arc<RwLock<bool>>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        while !*self.shutdown.borrow() {
            match self.connect().await {
                Ok(ws) => {
                    info!("Connected to live channel {}", self.url);
                    attempt = 0;
                    refreshed = false;
                    self.set_connected(true).await;
                    self.publish(LiveUpdate::new(LiveEvent::Connected));

                    let reason = self.pump(ws).await;

                    self.set_connected(false).await;
                    self.publish(LiveUpdate::new(LiveEvent::Disconnected { reason }));
                }
                Err(LiveError::Unauthorized { token }) if !refreshed => {
                    warn!("Live channel rejected the access token, refreshing");
                    if self.auth.authenticate(token.as_deref()).await.is_some() {
                        // One immediate retry with the new token
                        refreshed = true;
                        continue;
                    }
                }
                Err(e) => {
                    refreshed = false;
                    warn!("{}", e);
                }
            }

            if *self.shutdown.borrow() {
                break;
            }

            let delay = self.backoff.backoff_delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!("Reconnecting to live channel in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = self.shutdown.changed() => {
                    // Owner dropped
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Live socket worker exited");
    }

    async fn connect(&self) -> Result<WsStream, LiveError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| LiveError::Connect(e.to_string()))?;

        let token = self.auth.access_token();
        if let Some(token) = &token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| LiveError::Connect(e.to_string()))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        match connect_async(request).await {
            Ok((ws, _)) => Ok(ws),
            Err(e) if is_unauthorized(&e) => Err(LiveError::Unauthorized { token }),
            Err(e) => Err(LiveError::Connect(e.to_string())),
        }
    }

    /// Read until the connection ends; returns why it ended
    async fn pump(&mut self, ws: WsStream) -> Option<String> {
        let (mut sink, mut reader) = ws.split();

        loop {
            let msg = tokio::select! {
                msg = reader.next() => msg,
                _ = self.shutdown.changed() => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!("Failed to send close frame: {}", e);
                    }
                    return Some("closed by client".to_string());
                }
            };

            match msg {
                Some(Ok(Message::Text(text))) => self.handle_text(&text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => self.handle_text(&text),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        error!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Live channel closed by server");
                    return frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .or_else(|| Some("closed by server".to_string()));
                }
                Some(Err(e)) => {
                    error!("Live channel error: {}", e);
                    return Some(e.to_string());
                }
                None => {
                    info!("Live channel stream ended");
                    return None;
                }
                _ => {}
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match LiveUpdate::from_json(text) {
            Ok(update) => {
                debug!("Live event {}", update.event.kind());
                self.publish(update);
            }
            Err(e) => warn!("Skipping live message: {}", e),
        }
    }

    fn publish(&self, update: LiveUpdate) {
        // No subscribers is fine
        let _ = self.events.send(update);
    }

    async fn set_connected(&self, value: bool) {
        *self.connected.write().await = value;
    }
}

/// Handshake answered with 401
fn is_unauthorized(err: &tungstenite::Error) -> bool {
    matches!(err, tungstenite::Error::Http(response) if response.status() == StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{RefreshError, RefreshFailurePolicy, TokenRefresher};
    use crate::store::{SecretsManager, TokenPair, TokenStore};

    struct NoRefresh;

    #[async_trait::async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, RefreshError> {
            Err(RefreshError::Transport("unused".to_string()))
        }
    }

    fn authenticator(dir: &std::path::Path) -> Authenticator {
        let tokens = TokenStore::open(dir.join("session.bin"), SecretsManager::generate()).unwrap();
        Authenticator::new(Arc::new(tokens), Arc::new(NoRefresh), RefreshFailurePolicy::default())
    }

    #[test]
    fn test_rejects_non_websocket_urls() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LiveSocket::new("https://example.com/ws", authenticator(dir.path()), RetryPolicy::default()),
            Err(LiveError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            LiveSocket::new("not a url", authenticator(dir.path()), RetryPolicy::default()),
            Err(LiveError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_close_stops_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        // Nothing listens on this port; the worker keeps backing off
        let socket = LiveSocket::new(
            "ws://127.0.0.1:9/live",
            authenticator(dir.path()),
            RetryPolicy::default(),
        )
        .unwrap();

        assert!(socket.start());
        assert!(!socket.start());
        socket.close().await;
        assert!(!socket.is_connected().await);
        assert!(socket.start());
        socket.close().await;
    }

    #[test]
    fn test_handshake_401_is_unauthorized() {
        let rejected = tungstenite::http::Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .body(None)
            .unwrap();
        assert!(is_unauthorized(&tungstenite::Error::Http(rejected.into())));

        let missing = tungstenite::http::Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(None)
            .unwrap();
        assert!(!is_unauthorized(&tungstenite::Error::Http(missing.into())));
        assert!(!is_unauthorized(&tungstenite::Error::ConnectionClosed));
    }
}
