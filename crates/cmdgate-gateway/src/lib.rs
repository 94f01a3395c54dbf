//! cmdgate Gateway - session-aware command routing
//!
//! This crate turns REST, JSON-RPC and WebSocket requests into argument
//! vectors for a command engine, keeps the session table, and maps every
//! failure to a JSON error response. It knows nothing about sockets; the
//! server crate adapts it to HTTP.

mod args;
mod bridge;
mod connection;
mod error;
mod gateway;
mod request;
mod session;

pub use args::{api_argv, decode_body, decode_value};
pub use bridge::{CommandBridge, DispatchOutput};
pub use connection::{ConnectionError, ConnectionHandle, ConnectionPool};
pub use error::{canonical_reason, ErrorBody, GatewayError, GatewayResult, WireResponse};
pub use gateway::{user_auth, FrameDelivery, Gateway, GatewayConfig, HttpRequest};
pub use request::{classify, ClassifiedRequest, MethodSet, Route, RouteState, SegmentStack};
pub use session::{cookie_value, Session, SessionId, SessionManager, SessionState};
