use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowTimings {
    pub spin_tick: Duration,
    pub spin_duration: Duration,
    pub reveal: Duration,
    pub countdown_tick: Duration,
    pub countdown_from: u8,
    pub flash_on: Duration,
    pub flash_off: Duration,
    pub upsell_delay: Duration,
    pub qr_timeout: Duration,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            spin_tick: Duration::from_millis(90),
            spin_duration: Duration::from_millis(2500),
            reveal: Duration::from_millis(2000),
            countdown_tick: Duration::from_millis(1000),
            countdown_from: 3,
            flash_on: Duration::from_millis(500),
            flash_off: Duration::from_millis(650),
            upsell_delay: Duration::from_millis(2000),
            qr_timeout: Duration::from_millis(15_000),
        }
    }
}

/// How the capture status poll loop paces itself and when it gives up.
///
/// Both bounds default to `None`: the loop runs until the device reports a
/// terminal state or an operator intervenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePollPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub max_duration: Option<Duration>,
}

impl Default for CapturePollPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_millis(500))
    }
}

impl CapturePollPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            max_duration: None,
        }
    }

    pub fn exceeded(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.max_duration.is_some_and(|max| elapsed >= max)
    }
}

/// The collaborator calls made by the primary flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStep {
    ArmCapture,
    PollStatus,
    RenderFinal,
    Print,
    FetchQr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Discard the session and return to idle.
    AbortSession,
    /// Issue the same call again after the delay, keeping the session.
    RetryAfter(Duration),
}

/// Decides what a failed collaborator call does to the session.
pub trait FaultPolicy: Send + Sync {
    fn decide(&self, step: FlowStep, error: &anyhow::Error) -> FaultAction;
}

/// Any failed request aborts the whole session.
pub struct AbortSessionPolicy;

impl FaultPolicy for AbortSessionPolicy {
    fn decide(&self, step: FlowStep, error: &anyhow::Error) -> FaultAction {
        debug!(?step, %error, "fault policy: abort session");
        FaultAction::AbortSession
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_policy_never_gives_up() {
        let policy = CapturePollPolicy::default();
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert!(!policy.exceeded(u32::MAX, Duration::from_secs(86_400)));
    }

    #[test]
    fn attempt_bound_counts_issued_polls() {
        let policy = CapturePollPolicy {
            max_attempts: Some(3),
            ..CapturePollPolicy::default()
        };
        assert!(!policy.exceeded(2, Duration::ZERO));
        assert!(policy.exceeded(3, Duration::ZERO));
    }

    #[test]
    fn duration_bound_applies_independently() {
        let policy = CapturePollPolicy {
            max_duration: Some(Duration::from_secs(30)),
            ..CapturePollPolicy::default()
        };
        assert!(!policy.exceeded(1_000, Duration::from_secs(29)));
        assert!(policy.exceeded(0, Duration::from_secs(30)));
    }

    #[test]
    fn abort_policy_aborts_every_step() {
        let err = anyhow::anyhow!("connection refused");
        for step in [
            FlowStep::ArmCapture,
            FlowStep::PollStatus,
            FlowStep::RenderFinal,
            FlowStep::Print,
            FlowStep::FetchQr,
        ] {
            assert_eq!(AbortSessionPolicy.decide(step, &err), FaultAction::AbortSession);
        }
    }
}
