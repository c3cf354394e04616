//! Commands queued into the orchestrator by the screen renderer and operator hotkeys.

use shared::domain::SessionId;

/// Customer-facing intents emitted by the screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Start,
    Print,
    CloseUpsell,
    TryAnother,
    Retake,
}

impl Intent {
    pub fn name(self) -> &'static str {
        match self {
            Intent::Start => "start",
            Intent::Print => "print",
            Intent::CloseUpsell => "close-upsell",
            Intent::TryAnother => "try-another",
            Intent::Retake => "retake",
        }
    }
}

/// Operator overrides. Each one is a no-op unless its precondition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorCommand {
    /// Print the most recent session again, even after it was discarded.
    ReprintLast,
    /// Re-run capture for the live session and return to preview.
    ForceCapture,
    /// Render whatever the device has and jump to preview.
    ForceContinue,
    JumpToQr,
    HardReset,
    UtilityAction,
}

impl OperatorCommand {
    pub fn name(self) -> &'static str {
        match self {
            OperatorCommand::ReprintLast => "reprint-last",
            OperatorCommand::ForceCapture => "force-capture",
            OperatorCommand::ForceContinue => "force-continue",
            OperatorCommand::JumpToQr => "jump-to-qr",
            OperatorCommand::HardReset => "hard-reset",
            OperatorCommand::UtilityAction => "utility-action",
        }
    }

    pub fn hotkey(self) -> Option<&'static str> {
        match self {
            OperatorCommand::ReprintLast => Some("F1"),
            OperatorCommand::ForceCapture => Some("F2"),
            OperatorCommand::JumpToQr => Some("F3"),
            OperatorCommand::HardReset => Some("F4"),
            OperatorCommand::UtilityAction => Some("F5"),
            OperatorCommand::ForceContinue => None,
        }
    }

    pub fn from_hotkey(key: &str) -> Option<Self> {
        [
            OperatorCommand::ReprintLast,
            OperatorCommand::ForceCapture,
            OperatorCommand::JumpToQr,
            OperatorCommand::HardReset,
            OperatorCommand::UtilityAction,
        ]
        .into_iter()
        .find(|command| {
            command
                .hotkey()
                .is_some_and(|hotkey| hotkey.eq_ignore_ascii_case(key.trim()))
        })
    }
}

/// `target` is the session the issuer was looking at when it sent the
/// command; the orchestrator rejects the command if that is no longer the
/// current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskCommand {
    Intent {
        intent: Intent,
        target: Option<SessionId>,
    },
    Operator {
        command: OperatorCommand,
        target: Option<SessionId>,
    },
    Shutdown,
}

impl KioskCommand {
    pub fn name(&self) -> &'static str {
        match self {
            KioskCommand::Intent { intent, .. } => intent.name(),
            KioskCommand::Operator { command, .. } => command.name(),
            KioskCommand::Shutdown => "shutdown",
        }
    }
}
