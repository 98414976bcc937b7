//! WebSocket Game Server
//!
//! Async WebSocket server for café players. Each connection gets its own
//! task that handles sign-in, profile and leaderboard requests, and drives
//! at most one [`GameSession`] at a time.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::game::catalog::Catalog;
use crate::game::engine::RulesConfig;
use crate::game::events::GameEvent;
use crate::network::auth::{authenticate, AuthConfig, PlayerId, UserIdentity};
use crate::network::protocol::{
    leaderboard_limit, AuthResult, ClientMessage, ErrorCode, ServerMessage,
};
use crate::network::session::{
    GameSession, SessionContext, SessionError, SessionFeed, SessionId,
};
use crate::store::{ScoreStore, StoreError};

/// Outbound queue size per connection.
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// JSON file backing the score store; in memory when `None`.
    pub store_path: Option<PathBuf>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            store_path: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CAFE_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|_| GameServerError::Config(format!("invalid CAFE_BIND_ADDR: {}", addr)))?;
        }
        if let Ok(max) = std::env::var("CAFE_MAX_CONNECTIONS") {
            config.max_connections = max.parse().map_err(|_| {
                GameServerError::Config(format!("invalid CAFE_MAX_CONNECTIONS: {}", max))
            })?;
        }
        config.store_path = std::env::var("CAFE_STORE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Score store could not be opened.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Connected client state.
struct ConnectedClient {
    /// Player identifier (after auth).
    player_id: Option<PlayerId>,
    /// Current game session, if playing.
    session_id: Option<SessionId>,
    /// Connection time.
    connected_at: Instant,
}

type ClientTable = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// State shared by every connection task.
struct Shared {
    config: ServerConfig,
    auth: AuthConfig,
    store: Arc<ScoreStore>,
    catalog: Arc<Catalog>,
    rules: RulesConfig,
    clients: ClientTable,
}

/// The game server.
pub struct GameServer {
    shared: Arc<Shared>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(
        config: ServerConfig,
        auth: AuthConfig,
        rules: RulesConfig,
        store: Arc<ScoreStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shared: Arc::new(Shared {
                config,
                auth,
                store,
                catalog: Arc::new(Catalog::cafe_menu()),
                rules,
                clients: Arc::new(RwLock::new(BTreeMap::new())),
            }),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.shared.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "Café server v{} listening on {}",
            self.shared.config.version,
            listener.local_addr()?
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.shared.clients.read().await.len();
                            if clients_count >= self.shared.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let shared = self.shared.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CHANNEL_CAPACITY);

            {
                let mut clients = shared.clients.write().await;
                clients.insert(addr, ConnectedClient {
                    player_id: None,
                    session_id: None,
                    connected_at: Instant::now(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut conn = Connection {
                addr,
                shared: shared.clone(),
                out: msg_tx,
                identity: None,
                game: None,
            };

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        conn.reply_error(ErrorCode::InvalidInput, "Invalid message format").await;
                                        continue;
                                    }
                                };

                                if conn.handle_message(client_msg).await.is_break() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                conn.reply_error(ErrorCode::InvalidInput, "Binary frames are not supported").await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            conn.end_game();
            drop(conn);
            let _ = sender_task.await;

            let connected_for = {
                let mut clients = shared.clients.write().await;
                clients.remove(&addr).map(|c| c.connected_at.elapsed())
            };

            info!(
                "Client {} cleaned up after {:?}",
                addr,
                connected_for.unwrap_or_default()
            );
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }

    /// Get the number of connections with a game in progress.
    pub async fn session_count(&self) -> usize {
        self.shared
            .clients
            .read()
            .await
            .values()
            .filter(|c| c.session_id.is_some())
            .count()
    }

    /// Get the number of signed-in connections.
    pub async fn authenticated_count(&self) -> usize {
        self.shared
            .clients
            .read()
            .await
            .values()
            .filter(|c| c.player_id.is_some())
            .count()
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// A running game and the task relaying its feed to the client.
struct ActiveGame {
    session: GameSession,
    forwarder: JoinHandle<()>,
}

/// Per-connection state, owned by the connection task.
struct Connection {
    addr: SocketAddr,
    shared: Arc<Shared>,
    out: mpsc::Sender<ServerMessage>,
    identity: Option<UserIdentity>,
    game: Option<ActiveGame>,
}

impl Connection {
    async fn handle_message(&mut self, msg: ClientMessage) -> ControlFlow<()> {
        match msg {
            ClientMessage::Auth { token } => self.handle_auth(&token).await,
            ClientMessage::Register { username } => self.handle_register(&username).await,
            ClientMessage::Start => self.handle_start().await,
            ClientMessage::Select { item_id } => {
                let result = self.with_game(|s| s.select(item_id));
                self.report_session_result(result).await;
            }
            ClientMessage::ClearSelection => {
                let result = self.with_game(GameSession::clear_selection);
                self.report_session_result(result).await;
            }
            ClientMessage::Serve => {
                let result = self.with_game(GameSession::serve);
                self.report_session_result(result).await;
            }
            ClientMessage::GetCatalog => {
                let items = self.shared.catalog.items().to_vec();
                self.send(ServerMessage::Catalog { items }).await;
            }
            ClientMessage::GetProfile => self.handle_get_profile().await,
            ClientMessage::GetLeaderboard { limit } => {
                let scores = self.shared.store.top_scores(leaderboard_limit(limit)).await;
                self.send(ServerMessage::Leaderboard { scores }).await;
            }
            ClientMessage::Ping { timestamp } => {
                let server_time = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                self.send(ServerMessage::Pong { timestamp, server_time }).await;
            }
            ClientMessage::Leave => {
                debug!("Client {} left", self.addr);
                self.end_game();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn handle_auth(&mut self, token: &str) {
        match authenticate(token, &self.shared.auth) {
            Ok(identity) => {
                debug!(
                    "Client {} authenticated as {}",
                    self.addr,
                    identity.player_id.short()
                );
                {
                    let mut clients = self.shared.clients.write().await;
                    if let Some(client) = clients.get_mut(&self.addr) {
                        client.player_id = Some(identity.player_id);
                    }
                }
                let player_name = identity.player_name().to_string();
                self.identity = Some(identity);
                self.send(ServerMessage::AuthResult(AuthResult {
                    success: true,
                    player_name: Some(player_name),
                    error: None,
                }))
                .await;
            }
            Err(e) => {
                debug!("Client {} failed to authenticate: {}", self.addr, e);
                self.send(ServerMessage::AuthResult(AuthResult {
                    success: false,
                    player_name: None,
                    error: Some(e.to_string()),
                }))
                .await;
            }
        }
    }

    async fn handle_register(&mut self, username: &str) {
        let Some(identity) = self.identity.as_ref() else {
            self.reply_error(ErrorCode::NotAuthenticated, "Sign in before registering").await;
            return;
        };

        let result = self
            .shared
            .store
            .create_profile(&identity.uid, username, identity.email.as_deref())
            .await;
        match result {
            Ok(profile) => {
                info!("Registered {} for player {}", profile.username, identity.player_id.short());
                self.send(ServerMessage::Profile(profile)).await;
            }
            Err(e) => self.reply_store_error(e).await,
        }
    }

    async fn handle_get_profile(&mut self) {
        let Some(identity) = self.identity.as_ref() else {
            self.reply_error(ErrorCode::NotAuthenticated, "Sign in to view your profile").await;
            return;
        };

        match self.shared.store.profile(&identity.uid).await {
            Ok(profile) => self.send(ServerMessage::Profile(profile)).await,
            Err(e) => self.reply_store_error(e).await,
        }
    }

    /// Restart the current game, or begin a new session when there is none
    /// or the signed-in player changed.
    async fn handle_start(&mut self) {
        let uid = self.identity.as_ref().map(|i| i.uid.as_str());
        if let Some(game) = &self.game {
            if game.session.player_uid() == uid && game.session.start().is_ok() {
                return;
            }
        }

        self.end_game();

        let ctx = SessionContext {
            catalog: self.shared.catalog.clone(),
            rules: self.shared.rules,
            store: self.shared.store.clone(),
            identity: self.identity.clone(),
        };
        let (session, feed) = GameSession::spawn(ctx);
        let forwarder = tokio::spawn(forward_session(feed, self.out.clone()));

        {
            let mut clients = self.shared.clients.write().await;
            if let Some(client) = clients.get_mut(&self.addr) {
                client.session_id = Some(session.id());
            }
        }
        self.game = Some(ActiveGame { session, forwarder });
    }

    fn with_game<F>(&self, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&GameSession) -> Result<(), SessionError>,
    {
        match &self.game {
            Some(game) => f(&game.session),
            None => Err(SessionError::Closed),
        }
    }

    /// Stop the current game, if any, and its relay.
    fn end_game(&mut self) {
        if let Some(game) = self.game.take() {
            game.session.shutdown();
            game.forwarder.abort();
        }
    }

    async fn report_session_result(&self, result: Result<(), SessionError>) {
        match result {
            Ok(()) => {}
            Err(SessionError::Closed) => {
                self.reply_error(ErrorCode::InvalidInput, "No game in progress").await;
            }
            Err(e @ SessionError::UnknownItem(_)) => {
                self.reply_error(ErrorCode::InvalidInput, e.to_string()).await;
            }
        }
    }

    async fn reply_store_error(&self, err: StoreError) {
        let code = match &err {
            StoreError::NotFound(_) => ErrorCode::NotFound,
            StoreError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            StoreError::InvalidUsername => ErrorCode::InvalidInput,
            StoreError::Io(_) | StoreError::Format(_) => {
                error!("Store failure for {}: {}", self.addr, err);
                ErrorCode::Internal
            }
        };
        self.reply_error(code, err.to_string()).await;
    }

    async fn reply_error(&self, code: ErrorCode, message: impl Into<String>) {
        self.send(ServerMessage::error(code, message)).await;
    }

    async fn send(&self, msg: ServerMessage) {
        if self.out.send(msg).await.is_err() {
            debug!("Outbound channel for {} closed", self.addr);
        }
    }
}

/// Messages a client receives for one game event.
pub fn event_messages(event: &GameEvent) -> Vec<ServerMessage> {
    let mut messages = vec![ServerMessage::Event(event.clone())];
    if let Some(cue) = event.sound_cue() {
        messages.push(ServerMessage::Sound { cue });
    }
    if let Some(report) = event.score_report() {
        messages.push(ServerMessage::GameOver(report));
    }
    messages
}

/// Relay a session's snapshots and events to the client until either side
/// goes away.
async fn forward_session(mut feed: SessionFeed, out: mpsc::Sender<ServerMessage>) {
    let initial = feed.snapshots.borrow_and_update().clone();
    if out.send(ServerMessage::State(initial)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;

            event = feed.events.recv() => {
                match event {
                    Ok(event) => {
                        for msg in event_messages(&event) {
                            if out.send(msg).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client lagged, skipped {} game events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            changed = feed.snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = feed.snapshots.borrow_and_update().clone();
                if out.send(ServerMessage::State(snapshot)).await.is_err() {
                    return;
                }
            }
        }
    }
}
