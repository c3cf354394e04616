use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{CaptureStatus, Mode, SessionId},
    protocol::BackendConfig,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub id: SessionId,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOutcome {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn start_session(&self) -> Result<StartedSession>;
}

#[async_trait]
pub trait CaptureDeviceClient: Send + Sync {
    async fn arm(&self, session_id: &SessionId) -> Result<()>;
    async fn status(&self, session_id: &SessionId) -> Result<CaptureStatus>;
}

#[async_trait]
pub trait RenderClient: Send + Sync {
    /// Idempotent. Every call returns a freshly cache-busted URL.
    async fn render_final(&self, session_id: &SessionId) -> Result<String>;
}

#[async_trait]
pub trait PrintClient: Send + Sync {
    async fn print(&self, session_id: &SessionId) -> Result<PrintOutcome>;
}

#[async_trait]
pub trait QrClient: Send + Sync {
    async fn qr_reference(&self, session_id: &SessionId) -> Result<String>;
}

#[async_trait]
pub trait OperatorClient: Send + Sync {
    async fn utility_action(&self) -> Result<String>;
    async fn fetch_config(&self) -> Result<BackendConfig>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionBackend>,
    pub capture: Arc<dyn CaptureDeviceClient>,
    pub render: Arc<dyn RenderClient>,
    pub print: Arc<dyn PrintClient>,
    pub qr: Arc<dyn QrClient>,
    pub operator: Arc<dyn OperatorClient>,
}

impl Collaborators {
    /// Uses one backend for every collaborator.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: SessionBackend
            + CaptureDeviceClient
            + RenderClient
            + PrintClient
            + QrClient
            + OperatorClient
            + 'static,
    {
        Self {
            sessions: backend.clone(),
            capture: backend.clone(),
            render: backend.clone(),
            print: backend.clone(),
            qr: backend.clone(),
            operator: backend,
        }
    }
}

/// Appends a `t=<unix millis>` query parameter. Stamps are strictly
/// increasing within one buster even when the clock does not move.
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: AtomicI64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    pub fn apply(&self, url: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}t={}", self.stamp())
    }
}
