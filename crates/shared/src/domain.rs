use std::fmt;

use serde::{Deserialize, Serialize};

/// Prompt shown on the reveal screen when the backend mode carries none.
pub const DEFAULT_MODE_PROMPT: &str = "POSE WITH POWER!";

/// Server-issued session identifier. Opaque to the kiosk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Standard,
    Legendary,
}

impl Tier {
    /// The backend labels tiers freely (`Common`, `Spicy`, ...); only
    /// `Legendary` changes kiosk behavior.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("legendary") {
            Self::Legendary
        } else {
            Self::Standard
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    pub name: String,
    #[serde(default = "default_tier_label")]
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

fn default_tier_label() -> String {
    "Standard".to_string()
}

impl Mode {
    pub fn new(name: impl Into<String>, tier: impl Into<String>, prompt: Option<String>) -> Self {
        Self {
            name: name.into(),
            tier: tier.into(),
            prompt,
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::from_label(&self.tier)
    }

    pub fn is_legendary(&self) -> bool {
        self.tier() == Tier::Legendary
    }

    pub fn display_prompt(&self) -> &str {
        match self.prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => prompt,
            _ => DEFAULT_MODE_PROMPT,
        }
    }
}

/// The kiosk screens. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Idle,
    Spin,
    Reveal,
    Countdown,
    Capturing,
    Preview,
    Printing,
    Qr,
}

impl Screen {
    pub const ALL: [Screen; 8] = [
        Screen::Idle,
        Screen::Spin,
        Screen::Reveal,
        Screen::Countdown,
        Screen::Capturing,
        Screen::Preview,
        Screen::Printing,
        Screen::Qr,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Screen::Idle => "IDLE",
            Screen::Spin => "SPIN",
            Screen::Reveal => "REVEAL",
            Screen::Countdown => "COUNTDOWN",
            Screen::Capturing => "CAPTURING",
            Screen::Preview => "PREVIEW",
            Screen::Printing => "PRINTING",
            Screen::Qr => "QR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Reported by the device for a session that has not been armed yet.
    Idle,
    Arming,
    Waiting,
    Captured,
    Error,
}

impl CaptureState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CaptureState::Captured | CaptureState::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub state: CaptureState,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_path: Option<String>,
    #[serde(default)]
    pub retries: u32,
}

impl CaptureStatus {
    pub fn new(state: CaptureState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            raw_path: None,
            retries: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_legendary_label_maps_to_legendary_tier() {
        assert_eq!(Tier::from_label("Legendary"), Tier::Legendary);
        assert_eq!(Tier::from_label(" legendary "), Tier::Legendary);
        assert_eq!(Tier::from_label("Common"), Tier::Standard);
        assert_eq!(Tier::from_label("Spicy"), Tier::Standard);
        assert_eq!(Tier::from_label(""), Tier::Standard);
    }

    #[test]
    fn mode_without_prompt_falls_back_to_default_prompt() {
        let mode: Mode = serde_json::from_str(r#"{"name":"ROCKSTAR"}"#).expect("mode");
        assert_eq!(mode.tier(), Tier::Standard);
        assert_eq!(mode.display_prompt(), DEFAULT_MODE_PROMPT);

        let blank = Mode::new("ROCKSTAR", "Spicy", Some("   ".to_string()));
        assert_eq!(blank.display_prompt(), DEFAULT_MODE_PROMPT);
    }

    #[test]
    fn capture_status_parses_device_payload() {
        let status: CaptureStatus = serde_json::from_str(
            r#"{"state":"waiting","raw_path":null,"message":"RETRYING...","retries":2}"#,
        )
        .expect("status");
        assert_eq!(status.state, CaptureState::Waiting);
        assert_eq!(status.retries, 2);
        assert!(!status.is_terminal());

        let unknown = serde_json::from_str::<CaptureStatus>(r#"{"state":"exploded"}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn only_captured_and_error_are_terminal() {
        let terminal: Vec<_> = [
            CaptureState::Idle,
            CaptureState::Arming,
            CaptureState::Waiting,
            CaptureState::Captured,
            CaptureState::Error,
        ]
        .into_iter()
        .filter(|state| state.is_terminal())
        .collect();
        assert_eq!(terminal, vec![CaptureState::Captured, CaptureState::Error]);
    }
}
