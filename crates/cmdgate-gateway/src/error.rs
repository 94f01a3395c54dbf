//! Gateway errors and their wire representation

use cmdgate_engine::EngineError;
use serde::Serialize;
use thiserror::Error;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

const UNKNOWN_MESSAGE: &str = "unknown error";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Session required")]
    SessionRequired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Command timed out after {0}ms")]
    Timeout(u64),

    /// Error raised with an explicit status, forwarded as-is
    #[error("{message}")]
    Service {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("{}", .0.as_deref().unwrap_or(UNKNOWN_MESSAGE))]
    Uncategorized(Option<String>),
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::SessionRequired => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::NotFound(_) => 404,
            GatewayError::MethodNotAllowed(_) => 405,
            GatewayError::Timeout(_) => 504,
            GatewayError::Service { status, .. } => *status,
            GatewayError::Uncategorized(_) => 500,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            GatewayError::Service { status, reason, .. } if reason.is_empty() => {
                canonical_reason(*status).to_string()
            }
            GatewayError::Service { reason, .. } => reason.clone(),
            other => canonical_reason(other.status()).to_string(),
        }
    }

    /// Human-readable message, never empty
    pub fn message(&self) -> String {
        let message = match self {
            GatewayError::Service { message, .. } => message.clone(),
            GatewayError::Uncategorized(message) => message.clone().unwrap_or_default(),
            other => other.to_string(),
        };
        if message.trim().is_empty() {
            UNKNOWN_MESSAGE.to_string()
        } else {
            message
        }
    }

    /// Render this error as a complete wire response
    pub fn to_wire(&self) -> WireResponse {
        WireResponse::from_error(self)
    }
}

impl From<EngineError> for GatewayError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownCommand(name) => {
                GatewayError::NotFound(format!("unknown command: {}", name))
            }
            EngineError::InvalidArgument(msg) => GatewayError::BadRequest(msg),
            EngineError::CommandNotAllowed(name) => {
                GatewayError::Forbidden(format!("command not allowed: {}", name))
            }
            EngineError::Service {
                status,
                reason,
                message,
            } => GatewayError::Service {
                status,
                reason,
                message,
            },
            EngineError::Timeout(ms) => GatewayError::Timeout(ms),
            other => GatewayError::Uncategorized(Some(other.to_string())),
        }
    }
}

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub status: u16,
    pub reason: String,
    pub message: String,
}

/// A fully buffered error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl WireResponse {
    pub const CONTENT_TYPE: &'static str = "application/json";

    pub fn from_error(err: &GatewayError) -> Self {
        let body = ErrorBody {
            status: err.status(),
            reason: err.reason(),
            message: err.message(),
        };
        // Plain strings only, serialization does not fail in practice.
        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(
                r#"{{"status":500,"reason":"Internal Server Error","message":"{}"}}"#,
                UNKNOWN_MESSAGE
            )
        });
        Self {
            status: body.status,
            reason: body.reason,
            body: json,
        }
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}

pub fn canonical_reason(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        423 => "Locked",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(err: GatewayError) -> serde_json::Value {
        let wire = err.to_wire();
        serde_json::from_str(&wire.body).unwrap()
    }

    #[test]
    fn test_structured_error_passthrough() {
        let err: GatewayError = EngineError::service(402, "Payment Required", "insufficient funds").into();
        let wire = err.to_wire();
        assert_eq!(wire.status, 402);
        assert_eq!(wire.reason, "Payment Required");

        let body: serde_json::Value = serde_json::from_str(&wire.body).unwrap();
        assert_eq!(body["status"], 402);
        assert_eq!(body["reason"], "Payment Required");
        assert_eq!(body["message"], "insufficient funds");
        assert_eq!(wire.content_length(), wire.body.len());
    }

    #[test]
    fn test_uncategorized_is_500_with_message() {
        let body = body_of(GatewayError::Uncategorized(Some("disk on fire".to_string())));
        assert_eq!(body["status"], 500);
        assert_eq!(body["reason"], "Internal Server Error");
        assert_eq!(body["message"], "disk on fire");
    }

    #[test]
    fn test_missing_message_is_unknown_error() {
        assert_eq!(body_of(GatewayError::Uncategorized(None))["message"], "unknown error");
        assert_eq!(
            body_of(GatewayError::Uncategorized(Some(String::new())))["message"],
            "unknown error"
        );
        assert_eq!(
            body_of(GatewayError::Service {
                status: 409,
                reason: String::new(),
                message: "  ".to_string(),
            })["message"],
            "unknown error"
        );
    }

    #[test]
    fn test_empty_service_reason_uses_canonical() {
        let err = GatewayError::Service {
            status: 409,
            reason: String::new(),
            message: "duplicate".to_string(),
        };
        assert_eq!(err.reason(), "Conflict");

        let err = GatewayError::Service {
            status: 413,
            reason: String::new(),
            message: "length limit exceeded".to_string(),
        };
        assert_eq!(err.to_wire().reason, "Payload Too Large");
    }

    #[test]
    fn test_engine_error_mapping() {
        let cases: Vec<(EngineError, u16)> = vec![
            (EngineError::UnknownCommand("x".to_string()), 404),
            (EngineError::InvalidArgument("empty".to_string()), 400),
            (EngineError::CommandNotAllowed("rm".to_string()), 403),
            (EngineError::Timeout(100), 504),
            (EngineError::ExecutionFailed("boom".to_string()), 500),
            (EngineError::Other("misc".to_string()), 500),
        ];
        for (engine_err, status) in cases {
            assert_eq!(GatewayError::from(engine_err).status(), status);
        }
    }

    #[test]
    fn test_routing_error_statuses() {
        assert_eq!(GatewayError::Forbidden("x".into()).to_wire().status, 403);
        assert_eq!(GatewayError::NotFound("x".into()).to_wire().status, 404);
        assert_eq!(GatewayError::MethodNotAllowed("x".into()).to_wire().status, 405);
        assert_eq!(GatewayError::SessionRequired.to_wire().status, 401);
        assert_eq!(GatewayError::Timeout(5).to_wire().reason, "Gateway Timeout");
    }
}
