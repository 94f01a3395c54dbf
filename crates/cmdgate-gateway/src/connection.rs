//! WebSocket connection pool
//!
//! The pool never owns the sockets. Each connection task registers a handle
//! wrapping the sending half of its outbound queue; the task drains the
//! queue into the socket.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Handle to a WebSocket connection for sending text frames
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection ID
    pub id: String,
    sender: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(id: impl Into<String>, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: id.into(),
            sender,
        }
    }

    /// Queue a text frame for this connection
    pub fn send(&self, payload: String) -> Result<(), ConnectionError> {
        self.sender
            .send(payload)
            .map_err(|_| ConnectionError::Closed(self.id.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Open WebSocket connections keyed by connection id
#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection, returning its handle and the queue to drain
    pub fn open(&self) -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(Uuid::new_v4().to_string(), tx);
        self.add(handle.clone());
        (handle, rx)
    }

    pub fn add(&self, handle: ConnectionHandle) {
        debug!("Connection {} added", handle.id);
        self.connections.insert(handle.id.clone(), handle);
    }

    pub fn remove(&self, connection_id: &str) -> Option<ConnectionHandle> {
        let removed = self.connections.remove(connection_id).map(|(_, handle)| handle);
        if removed.is_some() {
            debug!("Connection {} removed", connection_id);
        }
        removed
    }

    pub fn get(&self, connection_id: &str) -> Option<ConnectionHandle> {
        self.connections.get(connection_id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn list_connections(&self) -> Vec<String> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Send a frame to one connection
    pub fn send_to(&self, connection_id: &str, payload: String) -> Result<(), ConnectionError> {
        let handle = self
            .get(connection_id)
            .ok_or_else(|| ConnectionError::NotFound(connection_id.to_string()))?;
        handle.send(payload)
    }

    /// Send a frame to every open connection, the origin included.
    ///
    /// Works on a snapshot of the pool, so connections opened during the
    /// broadcast are not visited and closed ones are skipped. Returns the
    /// number of connections the frame was queued for.
    pub fn broadcast(&self, origin: &str, payload: &str) -> usize {
        let snapshot: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut delivered = 0;
        for handle in snapshot {
            match handle.send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast from {} skipped: {}", origin, e),
            }
        }
        debug!("Broadcast from {} delivered to {} connection(s)", origin, delivered);
        delivered
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed: {0}")]
    Closed(String),
    #[error("Connection not found: {0}")]
    NotFound(String),
}
