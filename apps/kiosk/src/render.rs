use kiosk_core::{
    mode_selector::CENTER_CELL, KioskEvent, RejectReason, SessionSnapshot,
};
use shared::domain::Screen;
use tokio::sync::{broadcast, watch};

/// One frame of the current screen. Pure, so the same snapshot always
/// renders the same text.
pub fn describe(snapshot: &SessionSnapshot) -> String {
    let mut lines = Vec::new();
    let header = match snapshot.session_id() {
        Some(id) => format!("[{}] session {id}", snapshot.screen.label()),
        None => format!("[{}]", snapshot.screen.label()),
    };
    lines.push(header);

    match snapshot.screen {
        Screen::Idle => {
            lines.push("Tap to start! (start)".to_string());
            if let Some(notice) = &snapshot.notice {
                lines.push(notice.clone());
            }
        }
        Screen::Spin => {
            if let Some(reel) = &snapshot.reel {
                let cells = reel.cells();
                let window = &cells[CENTER_CELL - 1..=CENTER_CELL + 1];
                lines.push(format!("[ {} | {} | {} ]", window[0], window[1], window[2]));
            }
            if snapshot.highlight() {
                lines.push("*** LEGENDARY ***".to_string());
            }
        }
        Screen::Reveal => {
            if let Some(text) = snapshot.reveal_text() {
                lines.push(text);
            }
            if let Some(mode) = snapshot.mode() {
                lines.push(mode.display_prompt().to_string());
            }
        }
        Screen::Countdown => {
            if let Some(value) = snapshot.countdown {
                lines.push(value.to_string());
            }
        }
        Screen::Capturing => {
            if snapshot.flash {
                lines.push("** FLASH **".to_string());
            }
            if let Some(message) = &snapshot.capture_message {
                lines.push(message.clone());
            }
            if snapshot.capture_suspended {
                lines.push("Operator: continue, f2 to recapture, f4 to reset".to_string());
            }
        }
        Screen::Preview => {
            lines.push(snapshot.preview_caption());
            if let Some(url) = snapshot.session.as_ref().and_then(|s| s.final_url.as_ref()) {
                lines.push(url.clone());
            }
            if let Some(error) = &snapshot.print_error {
                lines.push(error.clone());
            }
            let mut actions = vec!["print"];
            if snapshot.retake_available() {
                actions.push("retake");
            }
            lines.push(format!("Actions: {}", actions.join(", ")));
            if snapshot.upsell_visible {
                lines.push("Want another? (try / close)".to_string());
            }
        }
        Screen::Printing => lines.push("Printing...".to_string()),
        Screen::Qr => match &snapshot.qr_url {
            Some(url) => lines.push(format!("Scan to download: {url}")),
            None => lines.push("Preparing your download...".to_string()),
        },
    }

    if let Some(warning) = &snapshot.setup_warning {
        lines.push(warning.clone());
    }
    lines.join("\n")
}

/// Operator-facing line for events worth surfacing outside the frame.
pub fn describe_event(event: &KioskEvent) -> Option<String> {
    match event {
        KioskEvent::Fault(fault) => Some(format!("! {fault}")),
        KioskEvent::Reprinted {
            session_id,
            success,
            message,
        } => Some(format!(
            "reprint {session_id}: {} {message}",
            if *success { "ok" } else { "failed" }
        )),
        KioskEvent::UtilityCompleted { status } => Some(format!("utility: {status}")),
        KioskEvent::CommandRejected { command, reason } => {
            let reason = match reason {
                RejectReason::StaleSession => "session changed",
                RejectReason::NoSession => "no session",
                RejectReason::WrongScreen => "not available on this screen",
                RejectReason::OperatorOnly => "operator mode only",
                RejectReason::Busy => "already starting",
            };
            Some(format!("{command} ignored: {reason}"))
        }
        _ => None,
    }
}

/// Prints a frame whenever the rendered text changes, plus notable events,
/// until the orchestrator goes away.
pub async fn run(
    mut snapshots: watch::Receiver<SessionSnapshot>,
    mut events: broadcast::Receiver<KioskEvent>,
) {
    let mut last = describe(&snapshots.borrow_and_update());
    println!("{last}");
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = describe(&snapshots.borrow_and_update());
                if frame != last {
                    println!("\n{frame}");
                    last = frame;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = describe_event(&event) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "renderer lagged behind kiosk events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use kiosk_core::{Fault, Session};
    use shared::domain::{Mode, SessionId};

    use super::*;

    fn with_session(screen: Screen, mode: Mode) -> SessionSnapshot {
        SessionSnapshot {
            screen,
            session: Some(Session::new(SessionId::new("booth-1"), mode)),
            ..SessionSnapshot::idle()
        }
    }

    #[test]
    fn idle_shows_notice_and_setup_warning() {
        let snapshot = SessionSnapshot {
            notice: Some("Something went wrong. Returning to idle.".into()),
            setup_warning: Some("Setup needed: incoming folder not found at C:/in".into()),
            ..SessionSnapshot::idle()
        };
        assert_eq!(
            describe(&snapshot),
            "[IDLE]\nTap to start! (start)\nSomething went wrong. Returning to idle.\nSetup needed: incoming folder not found at C:/in"
        );
    }

    #[test]
    fn reveal_falls_back_to_default_prompt() {
        let frame = describe(&with_session(Screen::Reveal, Mode::new("ROCKSTAR", "Common", None)));
        assert!(frame.contains("YOU'RE A ROCKSTAR!"), "{frame}");
        assert!(frame.contains("POSE WITH POWER!"), "{frame}");
    }

    #[test]
    fn preview_lists_retake_only_in_operator_mode() {
        let mut snapshot = with_session(Screen::Preview, Mode::new("ROCKSTAR", "Common", None));
        snapshot.print_error = Some("Printing failed — tap to retry".into());
        let frame = describe(&snapshot);
        assert!(frame.contains("ROCKSTAR! POWER POSE!"));
        assert!(frame.contains("Printing failed — tap to retry"));
        assert!(frame.ends_with("Actions: print"), "{frame}");

        if let Some(session) = snapshot.session.as_mut() {
            session.operator_mode = true;
        }
        assert!(describe(&snapshot).contains("Actions: print, retake"));
    }

    #[test]
    fn suspended_capture_prompts_the_operator() {
        let mut snapshot = with_session(Screen::Capturing, Mode::new("ROCKSTAR", "Common", None));
        snapshot.capture_message = Some("Camera offline".into());
        snapshot.capture_suspended = true;
        let frame = describe(&snapshot);
        assert!(frame.contains("Camera offline"));
        assert!(frame.contains("f4 to reset"));
    }

    #[test]
    fn only_notable_events_are_described() {
        assert_eq!(
            describe_event(&KioskEvent::Fault(Fault::PrintFailure {
                message: "paper jam".into()
            })),
            Some("! print failed: paper jam".to_string())
        );
        assert_eq!(
            describe_event(&KioskEvent::CommandRejected {
                command: "print",
                reason: RejectReason::StaleSession,
            }),
            Some("print ignored: session changed".to_string())
        );
        assert_eq!(
            describe_event(&KioskEvent::UtilityCompleted {
                status: "opened".into()
            }),
            Some("utility: opened".to_string())
        );
        assert_eq!(
            describe_event(&KioskEvent::ScreenChanged {
                from: Screen::Idle,
                to: Screen::Spin,
                session_id: None,
            }),
            None
        );
    }
}
