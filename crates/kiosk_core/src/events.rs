//! Snapshots and events published by the orchestrator.

use shared::domain::{CaptureStatus, Mode, Screen, SessionId};

use crate::{
    commands::OperatorCommand,
    error::Fault,
    mode_selector::SpinReel,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub assigned_mode: Mode,
    pub final_url: Option<String>,
    pub operator_mode: bool,
    pub capture_status: Option<CaptureStatus>,
}

impl Session {
    pub fn new(id: SessionId, assigned_mode: Mode) -> Self {
        Self {
            id,
            assigned_mode,
            final_url: None,
            operator_mode: false,
            capture_status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub screen: Screen,
    pub session: Option<Session>,
    pub last_session_id: Option<SessionId>,
    pub reel: Option<SpinReel>,
    pub countdown: Option<u8>,
    pub flash: bool,
    pub capture_message: Option<String>,
    pub capture_suspended: bool,
    pub print_error: Option<String>,
    pub upsell_visible: bool,
    pub qr_url: Option<String>,
    pub notice: Option<String>,
    pub setup_warning: Option<String>,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            screen: Screen::Idle,
            session: None,
            last_session_id: None,
            reel: None,
            countdown: None,
            flash: false,
            capture_message: None,
            capture_suspended: false,
            print_error: None,
            upsell_visible: false,
            qr_url: None,
            notice: None,
            setup_warning: None,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|session| &session.id)
    }

    pub fn mode(&self) -> Option<&Mode> {
        self.session.as_ref().map(|session| &session.assigned_mode)
    }

    /// Legendary highlight, only ever on while spinning.
    pub fn highlight(&self) -> bool {
        self.screen == Screen::Spin && self.reel.as_ref().is_some_and(SpinReel::highlight)
    }

    pub fn retake_available(&self) -> bool {
        self.screen == Screen::Preview
            && self.session.as_ref().is_some_and(|session| session.operator_mode)
    }

    pub fn reveal_text(&self) -> Option<String> {
        self.mode().map(|mode| format!("YOU'RE A {}!", mode.name))
    }

    pub fn preview_caption(&self) -> String {
        let name = self.mode().map_or("SUPERHEROES", |mode| mode.name.as_str());
        format!("{name}! POWER POSE!")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The command targeted a session that is no longer current.
    StaleSession,
    NoSession,
    WrongScreen,
    /// The affordance only exists in operator mode.
    OperatorOnly,
    /// A session start is already in flight.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskEvent {
    ScreenChanged {
        from: Screen,
        to: Screen,
        session_id: Option<SessionId>,
    },
    SessionStarted {
        session_id: SessionId,
        mode: Mode,
    },
    CaptureSuspended {
        session_id: SessionId,
        message: String,
    },
    Rendered {
        session_id: SessionId,
        final_url: String,
    },
    PrintCompleted {
        session_id: SessionId,
        success: bool,
        message: String,
    },
    Reprinted {
        session_id: SessionId,
        success: bool,
        message: String,
    },
    UtilityCompleted {
        status: String,
    },
    Fault(Fault),
    OperatorApplied(OperatorCommand),
    CommandRejected {
        command: &'static str,
        reason: RejectReason,
    },
}
