use shared::domain::SessionId;
use thiserror::Error;

use crate::policy::FlowStep;

/// Failures of the HTTP collaborator surface.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server_url must start with http:// or https://, got '{0}'")]
    InvalidServerUrl(String),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionStartFault {
    #[error("backend failed to start a session: {0}")]
    Backend(String),
    #[error("backend reissued the previous session id {0}")]
    DuplicateSessionId(SessionId),
}

/// Every fault the orchestrator can surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("request failed during {step:?}: {message}")]
    TransientNetwork { step: FlowStep, message: String },
    #[error("capture device reported an error: {message}")]
    DeviceReported { message: String },
    #[error("print failed: {message}")]
    PrintFailure { message: String },
    #[error(transparent)]
    SessionStart(#[from] SessionStartFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("kiosk command queue is full; retry")]
    QueueFull,
    #[error("kiosk orchestrator is not running")]
    Disconnected,
}
