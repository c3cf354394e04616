use anyhow::Result;
use kiosk_core::{DispatchError, Intent, KioskHandle, OperatorCommand};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

pub const HELP: &str = "start | print | close | try | retake | continue | f1..f5 | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLine {
    Intent(Intent),
    Operator(OperatorCommand),
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> Option<InputLine> {
    let word = line.trim().to_ascii_lowercase();
    let parsed = match word.as_str() {
        "start" => InputLine::Intent(Intent::Start),
        "print" => InputLine::Intent(Intent::Print),
        "close" => InputLine::Intent(Intent::CloseUpsell),
        "try" => InputLine::Intent(Intent::TryAnother),
        "retake" => InputLine::Intent(Intent::Retake),
        "continue" => InputLine::Operator(OperatorCommand::ForceContinue),
        "help" | "?" => InputLine::Help,
        "quit" | "exit" => InputLine::Quit,
        other => InputLine::Operator(OperatorCommand::from_hotkey(other)?),
    };
    Some(parsed)
}

/// Feeds lines from `reader` into the orchestrator until `quit` or end of
/// input.
pub async fn run<R>(handle: KioskHandle, reader: R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let dispatched = match parse_line(&line) {
            Some(InputLine::Quit) => break,
            Some(InputLine::Help) => {
                println!("{HELP}");
                Ok(())
            }
            Some(InputLine::Intent(intent)) => handle.intent(intent),
            Some(InputLine::Operator(command)) => handle.operator(command),
            None => {
                println!("unknown command '{}'; {HELP}", line.trim());
                Ok(())
            }
        };
        match dispatched {
            Ok(()) => {}
            Err(DispatchError::QueueFull) => warn!(input = %line.trim(), "kiosk busy; input dropped"),
            Err(err @ DispatchError::Disconnected) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kiosk_core::{Collaborators, Orchestrator, OrchestratorConfig};
    use shared::domain::Screen;

    use super::*;
    use crate::simulated::SimulatedBackend;

    #[test]
    fn maps_words_and_function_keys() {
        assert_eq!(parse_line(" Start "), Some(InputLine::Intent(Intent::Start)));
        assert_eq!(parse_line("close"), Some(InputLine::Intent(Intent::CloseUpsell)));
        assert_eq!(
            parse_line("F2"),
            Some(InputLine::Operator(OperatorCommand::ForceCapture))
        );
        assert_eq!(
            parse_line("f5"),
            Some(InputLine::Operator(OperatorCommand::UtilityAction))
        );
        assert_eq!(
            parse_line("continue"),
            Some(InputLine::Operator(OperatorCommand::ForceContinue))
        );
        assert_eq!(parse_line("quit"), Some(InputLine::Quit));
        assert_eq!(parse_line("f9"), None);
        assert_eq!(parse_line("dance"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn start_line_begins_a_session() {
        let backend = Arc::new(SimulatedBackend::with_seed(1, 7));
        let (handle, task) = Orchestrator::spawn(
            Collaborators::from_backend(backend),
            OrchestratorConfig::default(),
        );

        run(handle.clone(), &b"\nstart\nquit\nprint\n"[..])
            .await
            .expect("input loop");

        let mut snapshots = handle.watch();
        let spin = snapshots
            .wait_for(|snapshot| snapshot.screen == Screen::Spin)
            .await
            .expect("spin")
            .clone();
        assert!(spin.session.is_some());

        handle.shutdown().await.expect("shutdown");
        task.await.expect("orchestrator");
    }
}
