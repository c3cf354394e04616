use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{CaptureStatus, SessionId},
    error::describe_error_body,
    protocol::{
        ArmCaptureResponse, BackendConfig, HealthResponse, OperatorUtilityResponse, PrintResponse,
        RenderFinalResponse, SessionRequest, StartSessionResponse,
    },
};
use tracing::{debug, info};
use url::Url;

use crate::{
    clients::{
        CacheBuster, CaptureDeviceClient, OperatorClient, PrintClient, PrintOutcome, QrClient,
        RenderClient, SessionBackend, StartedSession,
    },
    error::ClientError,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpBackend {
    http: Client,
    base_url: Url,
    cache_buster: CacheBuster,
}

impl HttpBackend {
    pub fn new(server_url: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let base_url = parse_base_url(server_url)?;
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            http,
            base_url,
            cache_buster: CacheBuster::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = self.endpoint("health")?;
        let res = self.send(url.clone(), self.http.get(url.as_str())).await?;
        decode(url.as_str(), res).await
    }

    /// Absolute form of a URL the backend returned, which may be relative.
    pub fn resolve(&self, url: &str) -> Result<String, ClientError> {
        Ok(self.base_url.join(url.trim_start_matches('/'))?.to_string())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    async fn send(&self, url: Url, request: reqwest::RequestBuilder) -> Result<Response, ClientError> {
        debug!(endpoint = %url, "backend request");
        request.send().await.map_err(|source| ClientError::Transport {
            endpoint: url.to_string(),
            source,
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let res = self
            .send(url.clone(), self.http.post(url.as_str()).json(body))
            .await?;
        decode(url.as_str(), res).await
    }

    async fn get_json<R>(&self, path: &str, query: &[(&str, &str)]) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let res = self
            .send(url.clone(), self.http.get(url.as_str()).query(query))
            .await?;
        decode(url.as_str(), res).await
    }

    fn qr_url(&self, session_id: &SessionId) -> Result<Url, ClientError> {
        let mut url = self.endpoint("api/qr")?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidServerUrl(self.base_url.to_string()))?
            .push(session_id.as_str());
        Ok(url)
    }
}

fn parse_base_url(server_url: &str) -> Result<Url, ClientError> {
    let trimmed = server_url.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ClientError::InvalidServerUrl(server_url.to_string()));
    }
    // A trailing slash keeps any path prefix when joining endpoint paths.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Ok(Url::parse(&normalized)?)
}

async fn check_status(endpoint: &str, res: Response) -> Result<Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(ClientError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message: describe_error_body(&body),
    })
}

async fn decode<R: DeserializeOwned>(endpoint: &str, res: Response) -> Result<R, ClientError> {
    let res = check_status(endpoint, res).await?;
    res.json::<R>().await.map_err(|source| ClientError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn start_session(&self) -> Result<StartedSession> {
        let body: StartSessionResponse = self
            .post_json("api/session/start", &serde_json::json!({}))
            .await?;
        Ok(StartedSession {
            id: body.session_id,
            mode: body.mode,
        })
    }
}

#[async_trait]
impl CaptureDeviceClient for HttpBackend {
    async fn arm(&self, session_id: &SessionId) -> Result<()> {
        let body: ArmCaptureResponse = self
            .post_json(
                "api/capture/arm",
                &SessionRequest {
                    session_id: session_id.clone(),
                },
            )
            .await?;
        debug!(session_id = %session_id, armed = body.armed, state = ?body.state, "capture armed");
        Ok(())
    }

    async fn status(&self, session_id: &SessionId) -> Result<CaptureStatus> {
        let status = self
            .get_json("api/capture/status", &[("session_id", session_id.as_str())])
            .await?;
        Ok(status)
    }
}

#[async_trait]
impl RenderClient for HttpBackend {
    async fn render_final(&self, session_id: &SessionId) -> Result<String> {
        let body: RenderFinalResponse = self
            .post_json(
                "api/render/final",
                &SessionRequest {
                    session_id: session_id.clone(),
                },
            )
            .await?;
        let absolute = self.resolve(&body.final_url)?;
        Ok(self.cache_buster.apply(&absolute))
    }
}

#[async_trait]
impl PrintClient for HttpBackend {
    async fn print(&self, session_id: &SessionId) -> Result<PrintOutcome> {
        let body: PrintResponse = self
            .post_json(
                "api/print",
                &SessionRequest {
                    session_id: session_id.clone(),
                },
            )
            .await?;
        info!(session_id = %session_id, success = body.success, message = %body.message, "print result");
        Ok(PrintOutcome {
            success: body.success,
            message: body.message,
        })
    }
}

#[async_trait]
impl QrClient for HttpBackend {
    /// Fetches the QR image once so the backend has generated it, then
    /// hands back a cache-busted reference for the renderer.
    async fn qr_reference(&self, session_id: &SessionId) -> Result<String> {
        let url = self.qr_url(session_id)?;
        let res = self.send(url.clone(), self.http.get(url.as_str())).await?;
        let res = check_status(url.as_str(), res).await?;
        let image = res.bytes().await.map_err(|source| ClientError::Decode {
            endpoint: url.to_string(),
            source,
        })?;
        debug!(session_id = %session_id, bytes = image.len(), "qr image ready");
        Ok(self.cache_buster.apply(url.as_str()))
    }
}

#[async_trait]
impl OperatorClient for HttpBackend {
    async fn utility_action(&self) -> Result<String> {
        let body: OperatorUtilityResponse = self
            .post_json("api/operator/open-sessions", &serde_json::json!({}))
            .await?;
        Ok(body.status)
    }

    async fn fetch_config(&self) -> Result<BackendConfig> {
        Ok(self.get_json("api/config", &[]).await?)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
