use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use kiosk_core::{CapturePollPolicy, FlowTimings, DEFAULT_REQUEST_TIMEOUT};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_CONFIG_FILE: &str = "kiosk.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: Option<u32>,
    pub poll_max_seconds: Option<u64>,
    pub qr_timeout_ms: u64,
    pub spin_pool: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let timings = FlowTimings::default();
        let poll = CapturePollPolicy::default();
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            poll_interval_ms: poll.interval.as_millis() as u64,
            poll_max_attempts: None,
            poll_max_seconds: None,
            qr_timeout_ms: timings.qr_timeout.as_millis() as u64,
            spin_pool: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let url = self.server_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("server_url must start with http:// or https://, got '{}'", self.server_url);
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn timings(&self) -> FlowTimings {
        FlowTimings {
            qr_timeout: Duration::from_millis(self.qr_timeout_ms),
            ..FlowTimings::default()
        }
    }

    pub fn poll_policy(&self) -> CapturePollPolicy {
        CapturePollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.poll_max_attempts,
            max_duration: self.poll_max_seconds.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    server_url: Option<String>,
    request_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    poll_max_attempts: Option<u32>,
    poll_max_seconds: Option<u64>,
    qr_timeout_ms: Option<u64>,
    spin_pool: Option<Vec<String>>,
}

/// Defaults, then the config file, then the environment.
///
/// An explicit `path` must exist. Without one, `kiosk.toml` in the working
/// directory is read when present.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let raw = match path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?,
        ),
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).ok(),
    };
    if let Some(raw) = raw {
        apply_file(&mut settings, &raw).context("invalid kiosk config file")?;
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> Result<()> {
    let file: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file.request_timeout_ms {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = file.poll_interval_ms {
        settings.poll_interval_ms = v;
    }
    if file.poll_max_attempts.is_some() {
        settings.poll_max_attempts = file.poll_max_attempts;
    }
    if file.poll_max_seconds.is_some() {
        settings.poll_max_seconds = file.poll_max_seconds;
    }
    if let Some(v) = file.qr_timeout_ms {
        settings.qr_timeout_ms = v;
    }
    if let Some(v) = file.spin_pool {
        settings.spin_pool = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("KIOSK_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = parsed(&var, "APP__REQUEST_TIMEOUT_MS") {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = parsed(&var, "APP__POLL_INTERVAL_MS") {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = parsed(&var, "APP__POLL_MAX_ATTEMPTS") {
        settings.poll_max_attempts = Some(v);
    }
    if let Some(v) = parsed(&var, "APP__POLL_MAX_SECONDS") {
        settings.poll_max_seconds = Some(v);
    }
    if let Some(v) = parsed(&var, "APP__QR_TIMEOUT_MS") {
        settings.qr_timeout_ms = v;
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_flow_timings() {
        let settings = Settings::default();
        settings.validate().expect("valid defaults");
        assert_eq!(settings.poll_policy(), CapturePollPolicy::default());
        assert_eq!(settings.timings(), FlowTimings::default());
        assert_eq!(settings.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn file_then_env_overrides() {
        let mut settings = Settings::default();
        apply_file(
            &mut settings,
            r#"
                server_url = "http://booth.local:8000"
                poll_interval_ms = 250
                poll_max_seconds = 90
                spin_pool = ["A", "B"]
            "#,
        )
        .expect("file");
        apply_env(
            &mut settings,
            env(&[
                ("KIOSK_SERVER_URL", "http://ignored.local"),
                ("APP__SERVER_URL", "https://kiosk.example"),
                ("APP__POLL_MAX_ATTEMPTS", "40"),
                ("APP__QR_TIMEOUT_MS", "not-a-number"),
            ]),
        );

        assert_eq!(settings.server_url, "https://kiosk.example");
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.spin_pool, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(settings.qr_timeout_ms, Settings::default().qr_timeout_ms);

        let policy = settings.poll_policy();
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, Some(40));
        assert_eq!(policy.max_duration, Some(Duration::from_secs(90)));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let mut settings = Settings::default();
        assert!(apply_file(&mut settings, "server_ulr = \"http://x\"").is_err());
    }

    #[test]
    fn rejects_non_http_server_url_and_zero_interval() {
        let settings = Settings {
            server_url: "booth.local:8000".into(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            poll_interval_ms: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let missing = std::env::temp_dir().join("kiosk_config_test_missing.toml");
        assert!(load_settings(Some(&missing)).is_err());
    }
}
