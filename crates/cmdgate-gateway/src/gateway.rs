//! Gateway main structure
//!
//! Ties the classifier, session table, dispatch bridge and connection pool
//! together. Transport adapters call into this type and turn the returned
//! `GatewayResult` into wire responses.

use chrono::Duration as ChronoDuration;
use cmdgate_engine::CommandEngine;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::args::{api_argv, decode_body, decode_value};
use crate::bridge::{CommandBridge, DispatchOutput};
use crate::connection::{ConnectionError, ConnectionPool};
use crate::error::{GatewayError, GatewayResult};
use crate::request::{classify, Route};
use crate::session::{Session, SessionManager};

const BROADCAST_FLAG: &str = "broadcast";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Name of the cookie carrying the session id
    pub cookie_name: String,
    /// Idle time after which a session is evicted
    pub session_ttl: Duration,
    /// How often the sweeper checks for idle sessions
    pub sweep_interval: Duration,
    /// Time budget for one engine call
    pub command_timeout: Duration,
    /// Maximum concurrent engine calls
    pub max_workers: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            session_ttl: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(60),
            command_timeout: Duration::from_secs(30),
            max_workers: 16,
        }
    }
}

/// An HTTP request as the gateway sees it
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub cookie: Option<&'a str>,
    pub body: &'a [u8],
}

/// Where a WebSocket reply went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDelivery {
    /// Sent back to the originating connection
    Unicast,
    /// Queued for this many connections
    Broadcast(usize),
}

#[derive(Clone)]
pub struct Gateway {
    config: GatewayConfig,
    sessions: Arc<SessionManager>,
    connections: Arc<ConnectionPool>,
    bridge: CommandBridge,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("sessions", &self.sessions.session_count())
            .field("connections", &self.connections.count())
            .field("bridge", &self.bridge)
            .finish()
    }
}

impl Gateway {
    pub fn new(config: GatewayConfig, engine: Arc<dyn CommandEngine>) -> Self {
        let ttl = ChronoDuration::from_std(config.session_ttl)
            .unwrap_or_else(|_| ChronoDuration::seconds(i64::from(u32::MAX)));
        let sessions = Arc::new(SessionManager::new(config.cookie_name.clone(), ttl));
        let bridge = CommandBridge::new(engine, config.max_workers, config.command_timeout);

        info!(
            "Gateway ready: engine={}, workers={}, timeout={:?}, session ttl={:?}",
            bridge.engine_name(),
            config.max_workers,
            config.command_timeout,
            config.session_ttl
        );

        Self {
            config,
            sessions,
            connections: Arc::new(ConnectionPool::new()),
            bridge,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn connection_pool(&self) -> &Arc<ConnectionPool> {
        &self.connections
    }

    /// Start the periodic session sweep
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.sessions.spawn_sweeper(self.config.sweep_interval, cancel)
    }

    /// Route and dispatch one REST or RPC request
    pub async fn handle_http(&self, req: HttpRequest<'_>) -> GatewayResult<DispatchOutput> {
        let mut classified = classify(req.method, req.path);
        let route = classified.route()?;
        let body = String::from_utf8_lossy(req.body);

        let argv = match route {
            Route::Api { command, extra } => {
                let session = self
                    .sessions
                    .get_session(req.cookie)
                    .ok_or(GatewayError::SessionRequired)?;
                debug!("api/{} for user {} (session {})", command, session.user, session.id);
                api_argv(command, &session.user, extra, decode_body(&body))
            }
            Route::Rpc => decode_body(&body),
        };

        self.bridge.dispatch(argv).await
    }

    /// Dispatch one WebSocket text frame and deliver the reply.
    ///
    /// A JSON object frame with `"broadcast": true` has its result pushed to
    /// every open connection; anything else answers only the sender.
    pub async fn handle_ws_frame(
        &self,
        connection_id: &str,
        frame: &str,
    ) -> Result<FrameDelivery, ConnectionError> {
        let (argv, broadcast) = decode_frame(frame);
        let reply = match self.bridge.dispatch(argv).await {
            Ok(output) => output.body_text(),
            Err(e) => {
                warn!("WebSocket command from {} failed: {}", connection_id, e);
                e.to_wire().body
            }
        };

        if broadcast {
            let delivered = self.connections.broadcast(connection_id, &reply);
            Ok(FrameDelivery::Broadcast(delivered))
        } else {
            self.connections.send_to(connection_id, reply)?;
            Ok(FrameDelivery::Unicast)
        }
    }

    /// Authenticate `user` and open a session for them
    pub fn login(&self, user: &str, password: &str) -> GatewayResult<Arc<Session>> {
        if user.trim().is_empty() {
            return Err(GatewayError::BadRequest("user must not be empty".to_string()));
        }
        if !user_auth(user, password) {
            return Err(GatewayError::Service {
                status: 401,
                reason: "Unauthorized".to_string(),
                message: "invalid credentials".to_string(),
            });
        }

        let session = self.sessions.push_session(user);
        info!("User {} logged in (session {})", session.user, session.id);
        Ok(session)
    }

    /// Close the session named by the cookie header, if any
    pub fn logout(&self, cookie_header: Option<&str>) -> bool {
        let Some(id) = cookie_header.and_then(|h| self.sessions.session_id_from_cookie(h)) else {
            return false;
        };
        match self.sessions.remove_session(id) {
            Some(session) => {
                info!("User {} logged out (session {})", session.user, session.id);
                true
            }
            None => false,
        }
    }

    /// `Set-Cookie` value for a freshly created session
    pub fn session_cookie(&self, session: &Session) -> String {
        format!("{}={}; Path=/; HttpOnly", self.config.cookie_name, session.id)
    }
}

/// Credential check. Every non-empty user is accepted.
pub fn user_auth(_user: &str, _password: &str) -> bool {
    true
}

// A boolean `broadcast` key is a control flag and never reaches the engine.
fn decode_frame(frame: &str) -> (Vec<String>, bool) {
    match serde_json::from_str::<Value>(frame.trim()) {
        Ok(Value::Object(mut map)) => {
            let broadcast = match map.get(BROADCAST_FLAG) {
                Some(Value::Bool(flag)) => {
                    let flag = *flag;
                    map.remove(BROADCAST_FLAG);
                    flag
                }
                _ => false,
            };
            (decode_value(&Value::Object(map)), broadcast)
        }
        _ => (decode_body(frame), false),
    }
}
