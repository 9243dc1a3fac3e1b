//! Per-connection handshake state machine and wire frames.

use serde::{Deserialize, Serialize};
use tracing::debug;

use hearth_core::{Error, Result, SessionId, UserId};

use crate::auth::{AuthenticatedUser, ConnectionAuthenticator};

/// Lifecycle of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// Frames a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientFrame {
    /// Handshake. `authorization` carries `Bearer <token>`.
    Connect {
        #[serde(default)]
        authorization: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Control frames the server sends. Fan-out payloads go out as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Connected { session_id: SessionId, user_id: UserId },
    Error { reason: String },
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What the transport should do with a frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Handshake succeeded; register the session.
    Authenticated(AuthenticatedUser),
    /// Post-handshake traffic, not inspected.
    PassThrough,
}

/// Stable reason code sent in an `ERROR` frame.
pub fn rejection_reason(error: &Error) -> &'static str {
    match error {
        Error::Auth(rejection) => rejection.code(),
        Error::Validation(_) | Error::Serialization(_) => "PROTOCOL_ERROR",
        _ => "INTERNAL_ERROR",
    }
}

/// Handshake state of a single connection.
///
/// Only the first frame is inspected, and it must be `CONNECT`. Everything
/// after a successful handshake passes through.
pub struct Connection {
    authenticator: ConnectionAuthenticator,
    header_authorization: Option<String>,
    state: ConnectionState,
}

impl Connection {
    /// `header_authorization` is the upgrade request's `Authorization`
    /// header, used when the CONNECT frame carries none.
    pub fn new(authenticator: ConnectionAuthenticator, header_authorization: Option<String>) -> Self {
        Self {
            authenticator,
            header_authorization,
            state: ConnectionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub async fn on_frame(&mut self, text: &str) -> Result<FrameOutcome> {
        match self.state {
            ConnectionState::Authenticated => Ok(FrameOutcome::PassThrough),
            ConnectionState::Closed => Err(Error::Validation("connection is closed".to_string())),
            ConnectionState::Unauthenticated => match self.handshake(text).await {
                Ok(user) => {
                    self.state = ConnectionState::Authenticated;
                    Ok(FrameOutcome::Authenticated(user))
                }
                Err(e) => {
                    self.state = ConnectionState::Closed;
                    Err(e)
                }
            },
        }
    }

    async fn handshake(&self, text: &str) -> Result<AuthenticatedUser> {
        let frame: ClientFrame = serde_json::from_str(text)
            .map_err(|e| Error::Validation(format!("malformed handshake frame: {e}")))?;
        let ClientFrame::Connect { authorization } = frame else {
            debug!(subsystem = "gateway", component = "connection", "First frame was not CONNECT");
            return Err(Error::Validation("first frame must be CONNECT".to_string()));
        };

        let authorization = authorization.or_else(|| self.header_authorization.clone());
        self.authenticator.authenticate(authorization.as_deref()).await
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}
