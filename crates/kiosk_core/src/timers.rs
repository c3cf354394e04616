use std::time::Duration;

use shared::domain::Screen;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::trace;

use crate::policy::FlowStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    SpinTick,
    SpinSettle,
    RevealDone,
    CountdownTick,
    FlashOn,
    FlashOff,
    PollDue,
    UpsellDue,
    QrExpired,
    Retry(FlowStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    After(Duration, TimerKind),
    Every(Duration, TimerKind),
}

impl Timer {
    pub fn kind(&self) -> TimerKind {
        match self {
            Timer::After(_, kind) | Timer::Every(_, kind) => *kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub epoch: u64,
    pub kind: TimerKind,
}

struct ScheduledTimer {
    screen: Screen,
    kind: TimerKind,
    handle: JoinHandle<()>,
}

/// Timers owned by the current screen. Replacing the screen aborts the set and bumps the epoch.
pub struct TimerScheduler<E> {
    sink: mpsc::UnboundedSender<E>,
    screen: Screen,
    epoch: u64,
    timers: Vec<ScheduledTimer>,
}

impl<E> TimerScheduler<E>
where
    E: From<TimerFired> + Send + 'static,
{
    pub fn new(sink: mpsc::UnboundedSender<E>) -> Self {
        Self {
            sink,
            screen: Screen::Idle,
            epoch: 0,
            timers: Vec::new(),
        }
    }

    /// Replaces the active set. All previously scheduled handles are aborted
    /// before any of `timers` is spawned. Returns the new epoch.
    pub fn schedule_for_screen(
        &mut self,
        screen: Screen,
        timers: impl IntoIterator<Item = Timer>,
    ) -> u64 {
        self.abort_all();
        self.epoch += 1;
        self.screen = screen;
        for timer in timers {
            self.spawn(timer);
        }
        self.epoch
    }

    /// Adds a timer to the current screen's set.
    pub fn schedule(&mut self, timer: Timer) {
        self.spawn(timer);
    }

    /// Drops every pending timer and hands ownership back to the idle screen.
    pub fn cancel_all(&mut self) {
        self.abort_all();
        self.epoch += 1;
        self.screen = Screen::Idle;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Timers of the current set that have not fired (or, for intervals,
    /// are still ticking).
    pub fn pending(&self) -> usize {
        self.timers
            .iter()
            .filter(|timer| !timer.handle.is_finished())
            .count()
    }

    #[cfg(test)]
    pub(crate) fn pending_kinds(&self) -> Vec<TimerKind> {
        self.timers
            .iter()
            .filter(|timer| !timer.handle.is_finished())
            .map(|timer| timer.kind)
            .collect()
    }

    /// Handles owned by a screen other than the current one. Always zero
    /// after a transition.
    pub fn foreign_handles(&self) -> usize {
        self.timers
            .iter()
            .filter(|timer| timer.screen != self.screen)
            .count()
    }

    fn abort_all(&mut self) {
        for timer in self.timers.drain(..) {
            timer.handle.abort();
        }
    }

    fn spawn(&mut self, timer: Timer) {
        self.timers.retain(|scheduled| !scheduled.handle.is_finished());

        let sink = self.sink.clone();
        let epoch = self.epoch;
        let kind = timer.kind();
        trace!(?kind, epoch, screen = ?self.screen, "scheduling timer");

        let handle = match timer {
            Timer::After(delay, kind) => tokio::spawn(async move {
                time::sleep(delay).await;
                let _ = sink.send(E::from(TimerFired { epoch, kind }));
            }),
            Timer::Every(period, kind) => tokio::spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if sink.send(E::from(TimerFired { epoch, kind })).is_err() {
                        break;
                    }
                }
            }),
        };

        self.timers.push(ScheduledTimer {
            screen: self.screen,
            kind,
            handle,
        });
    }
}

impl<E> Drop for TimerScheduler<E> {
    fn drop(&mut self) {
        for timer in self.timers.drain(..) {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (TimerScheduler<TimerFired>, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TimerScheduler::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_with_its_epoch() {
        let (mut timers, mut rx) = scheduler();
        let epoch = timers.schedule_for_screen(
            Screen::Reveal,
            [Timer::After(Duration::from_millis(2000), TimerKind::RevealDone)],
        );

        let started = Instant::now();
        let fired = rx.recv().await.expect("fire");
        assert_eq!(fired, TimerFired { epoch, kind: TimerKind::RevealDone });
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert!(timers.is_current(fired.epoch));
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_the_screen_cancels_the_previous_set() {
        let (mut timers, mut rx) = scheduler();
        let spin_epoch = timers.schedule_for_screen(
            Screen::Spin,
            [
                Timer::Every(Duration::from_millis(90), TimerKind::SpinTick),
                Timer::After(Duration::from_millis(2500), TimerKind::SpinSettle),
            ],
        );
        assert_eq!(timers.pending(), 2);

        let tick = rx.recv().await.expect("tick");
        assert_eq!(tick.kind, TimerKind::SpinTick);
        assert_eq!(tick.epoch, spin_epoch);

        let reveal_epoch = timers.schedule_for_screen(
            Screen::Reveal,
            [Timer::After(Duration::from_millis(2000), TimerKind::RevealDone)],
        );
        assert_ne!(spin_epoch, reveal_epoch);
        assert_eq!(timers.foreign_handles(), 0);
        assert_eq!(timers.pending_kinds(), vec![TimerKind::RevealDone]);

        // Anything still delivered from the spin set is stale.
        loop {
            let fired = rx.recv().await.expect("fire");
            if fired.kind == TimerKind::RevealDone {
                assert!(timers.is_current(fired.epoch));
                break;
            }
            assert!(!timers.is_current(fired.epoch), "spin timer outlived its screen");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_silences_everything() {
        let (mut timers, mut rx) = scheduler();
        timers.schedule_for_screen(
            Screen::Qr,
            [Timer::After(Duration::from_millis(15_000), TimerKind::QrExpired)],
        );
        timers.cancel_all();
        assert_eq!(timers.screen(), Screen::Idle);
        assert_eq!(timers.pending(), 0);

        time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn added_timers_join_the_current_set() {
        let (mut timers, mut rx) = scheduler();
        let epoch = timers.schedule_for_screen(Screen::Capturing, []);
        timers.schedule(Timer::After(Duration::from_millis(500), TimerKind::PollDue));

        let fired = rx.recv().await.expect("poll");
        assert_eq!(fired, TimerFired { epoch, kind: TimerKind::PollDue });
        assert_eq!(timers.epoch(), epoch);
    }

    #[tokio::test(start_paused = true)]
    async fn no_foreign_handles_after_many_transitions() {
        let (mut timers, _rx) = scheduler();
        for (index, screen) in Screen::ALL.iter().cycle().take(40).enumerate() {
            timers.schedule_for_screen(
                *screen,
                [
                    Timer::After(Duration::from_millis(10 + index as u64), TimerKind::FlashOn),
                    Timer::Every(Duration::from_millis(90), TimerKind::SpinTick),
                ],
            );
            timers.schedule(Timer::After(Duration::from_millis(5), TimerKind::PollDue));
            assert_eq!(timers.foreign_handles(), 0);
            assert_eq!(timers.screen(), *screen);
        }
    }
}
