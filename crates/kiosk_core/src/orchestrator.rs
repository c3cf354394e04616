//! Session actor: owns kiosk state and serializes commands, timer fires and collaborator results.

use std::{future::Future, sync::Arc, time::Duration};

use shared::{
    domain::{CaptureState, CaptureStatus, Screen, SessionId},
    protocol::BackendConfig,
};
use tokio::{
    sync::{
        broadcast,
        mpsc::{self, error::TrySendError},
        watch,
    },
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    clients::{Collaborators, PrintOutcome, StartedSession},
    commands::{Intent, KioskCommand, OperatorCommand},
    error::{DispatchError, Fault, SessionStartFault},
    events::{KioskEvent, RejectReason, Session, SessionSnapshot},
    mode_selector::{ModeSelector, SpinReel, DEFAULT_SPIN_POOL},
    policy::{AbortSessionPolicy, CapturePollPolicy, FaultAction, FaultPolicy, FlowStep, FlowTimings},
    timers::{Timer, TimerFired, TimerKind, TimerScheduler},
};

pub const COMMAND_QUEUE_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub const FAULT_NOTICE: &str = "Something went wrong. Returning to idle.";
pub const PRINT_FAILED_NOTICE: &str = "Printing failed — tap to retry";
pub const CAPTURE_WAITING_MESSAGE: &str = "Waiting for camera...";
pub const CAPTURE_TIMED_OUT_MESSAGE: &str = "Capture timed out; operator action required.";
pub const DEVICE_ERROR_MESSAGE: &str = "Capture device reported an error.";

#[derive(Clone)]
pub struct OrchestratorConfig {
    pub timings: FlowTimings,
    pub poll_policy: CapturePollPolicy,
    /// Decorative labels for the spin reel. Empty means the built-in pool.
    pub spin_pool: Vec<String>,
    /// Fixed seed for the reel shuffle; random when unset.
    pub spin_seed: Option<u64>,
    pub fault_policy: Arc<dyn FaultPolicy>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timings: FlowTimings::default(),
            poll_policy: CapturePollPolicy::default(),
            spin_pool: DEFAULT_SPIN_POOL.iter().map(|label| label.to_string()).collect(),
            spin_seed: None,
            fault_policy: Arc::new(AbortSessionPolicy),
        }
    }
}

enum Internal {
    Timer(TimerFired),
    Completed {
        epoch: u64,
        session_id: Option<SessionId>,
        completion: Completion,
    },
}

impl From<TimerFired> for Internal {
    fn from(fired: TimerFired) -> Self {
        Internal::Timer(fired)
    }
}

enum Completion {
    SessionStarted(anyhow::Result<StartedSession>),
    Armed(anyhow::Result<()>),
    Status(anyhow::Result<CaptureStatus>),
    Rendered(anyhow::Result<String>),
    Printed(anyhow::Result<PrintOutcome>),
    QrReady(anyhow::Result<String>),
    Reprinted(anyhow::Result<PrintOutcome>),
    Utility(anyhow::Result<String>),
    Config(anyhow::Result<BackendConfig>),
}

impl Completion {
    fn name(&self) -> &'static str {
        match self {
            Completion::SessionStarted(_) => "start-session",
            Completion::Armed(_) => "arm-capture",
            Completion::Status(_) => "capture-status",
            Completion::Rendered(_) => "render-final",
            Completion::Printed(_) => "print",
            Completion::QrReady(_) => "qr",
            Completion::Reprinted(_) => "reprint",
            Completion::Utility(_) => "utility",
            Completion::Config(_) => "config",
        }
    }

    /// Results that only make sense for the screen and session that asked.
    /// Reprints, utility actions and the config probe outlive both.
    fn is_session_scoped(&self) -> bool {
        !matches!(
            self,
            Completion::Reprinted(_) | Completion::Utility(_) | Completion::Config(_)
        )
    }
}

#[derive(Debug, Default)]
struct CaptureProgress {
    attempts: u32,
    armed_at: Option<Instant>,
    suspended: bool,
    /// Operator forced a render past a suspended capture.
    continuing: bool,
    message: Option<String>,
}

struct Channels {
    commands: mpsc::Receiver<KioskCommand>,
    internal: mpsc::UnboundedReceiver<Internal>,
}

/// Cloneable front door to a running orchestrator.
#[derive(Clone)]
pub struct KioskHandle {
    commands: mpsc::Sender<KioskCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<KioskEvent>,
}

impl KioskHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<KioskEvent> {
        self.events.subscribe()
    }

    pub fn dispatch(&self, command: KioskCommand) -> Result<(), DispatchError> {
        let name = command.name();
        match self.commands.try_send(command) {
            Ok(()) => {
                debug!(command = name, "queued kiosk command");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(command = name, "kiosk command queue is full");
                Err(DispatchError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(DispatchError::Disconnected),
        }
    }

    /// Queues a customer intent aimed at the session currently on screen.
    pub fn intent(&self, intent: Intent) -> Result<(), DispatchError> {
        let target = self.snapshot().session_id().cloned();
        self.dispatch(KioskCommand::Intent { intent, target })
    }

    /// Queues an operator command. Reprints aim at the last started session,
    /// everything else at the live one.
    pub fn operator(&self, command: OperatorCommand) -> Result<(), DispatchError> {
        let snapshot = self.snapshot();
        let target = match command {
            OperatorCommand::ReprintLast => snapshot.last_session_id.clone(),
            _ => snapshot.session_id().cloned(),
        };
        self.dispatch(KioskCommand::Operator { command, target })
    }

    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        self.commands
            .send(KioskCommand::Shutdown)
            .await
            .map_err(|_| DispatchError::Disconnected)
    }
}

pub struct Orchestrator {
    clients: Collaborators,
    timings: FlowTimings,
    poll_policy: CapturePollPolicy,
    fault_policy: Arc<dyn FaultPolicy>,
    timers: TimerScheduler<Internal>,
    selector: ModeSelector,
    internal_tx: mpsc::UnboundedSender<Internal>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<KioskEvent>,

    screen: Screen,
    session: Option<Session>,
    last_session_id: Option<SessionId>,
    starting: bool,
    reel: Option<SpinReel>,
    countdown: Option<u8>,
    flash: bool,
    capture: CaptureProgress,
    print_error: Option<String>,
    upsell_visible: bool,
    qr_url: Option<String>,
    notice: Option<String>,
    setup_warning: Option<String>,
}

impl Orchestrator {
    /// Starts the orchestrator task on the current runtime.
    pub fn spawn(clients: Collaborators, config: OrchestratorConfig) -> (KioskHandle, JoinHandle<()>) {
        let (orchestrator, handle, channels) = Self::new(clients, config);
        let task = tokio::spawn(orchestrator.run(channels));
        (handle, task)
    }

    fn new(clients: Collaborators, config: OrchestratorConfig) -> (Self, KioskHandle, Channels) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::idle());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let selector = match config.spin_seed {
            Some(seed) => ModeSelector::with_seed(config.spin_pool, seed),
            None => ModeSelector::new(config.spin_pool),
        };

        let orchestrator = Self {
            clients,
            timings: config.timings,
            poll_policy: config.poll_policy,
            fault_policy: config.fault_policy,
            timers: TimerScheduler::new(internal_tx.clone()),
            selector,
            internal_tx,
            snapshots: snapshot_tx,
            events: events.clone(),
            screen: Screen::Idle,
            session: None,
            last_session_id: None,
            starting: false,
            reel: None,
            countdown: None,
            flash: false,
            capture: CaptureProgress::default(),
            print_error: None,
            upsell_visible: false,
            qr_url: None,
            notice: None,
            setup_warning: None,
        };
        let handle = KioskHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            events,
        };
        let channels = Channels {
            commands: command_rx,
            internal: internal_rx,
        };
        (orchestrator, handle, channels)
    }

    async fn run(mut self, mut channels: Channels) {
        info!("kiosk orchestrator running");
        self.fetch_config();
        self.publish();

        loop {
            tokio::select! {
                biased;
                Some(event) = channels.internal.recv() => self.handle_internal(event),
                command = channels.commands.recv() => match command {
                    Some(KioskCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
            self.publish();
        }

        self.timers.cancel_all();
        info!("kiosk orchestrator stopped");
    }

    fn handle_command(&mut self, command: KioskCommand) {
        match command {
            KioskCommand::Intent { intent, target } => self.handle_intent(intent, target),
            KioskCommand::Operator { command, target } => self.handle_operator(command, target),
            KioskCommand::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Timer(fired) => {
                if self.timers.is_current(fired.epoch) {
                    self.on_timer(fired.kind);
                } else {
                    debug!(kind = ?fired.kind, epoch = fired.epoch, "dropping stale timer");
                }
            }
            Internal::Completed {
                epoch,
                session_id,
                completion,
            } => {
                if completion.is_session_scoped() && !self.is_current_call(epoch, session_id.as_ref()) {
                    debug!(
                        call = completion.name(),
                        session_id = ?session_id,
                        "dropping stale result"
                    );
                    return;
                }
                self.on_completion(session_id, completion);
            }
        }
    }

    fn current_session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|session| &session.id)
    }

    fn is_current_call(&self, epoch: u64, session_id: Option<&SessionId>) -> bool {
        self.timers.is_current(epoch) && self.current_session_id() == session_id
    }

    /// The live session id, if `target` still names it.
    fn live_target(&self, target: Option<&SessionId>) -> Result<SessionId, RejectReason> {
        match (&self.session, target) {
            (None, _) => Err(RejectReason::NoSession),
            (Some(session), Some(target)) if &session.id == target => Ok(session.id.clone()),
            (Some(_), _) => Err(RejectReason::StaleSession),
        }
    }

    fn handle_intent(&mut self, intent: Intent, target: Option<SessionId>) {
        if intent == Intent::Start {
            self.start_session();
            return;
        }
        if let Err(reason) = self.live_target(target.as_ref()) {
            self.reject(intent.name(), reason);
            return;
        }
        if self.screen != Screen::Preview {
            self.reject(intent.name(), RejectReason::WrongScreen);
            return;
        }

        match intent {
            Intent::Print => self.do_print(),
            Intent::CloseUpsell => self.upsell_visible = false,
            Intent::TryAnother => {
                self.reset_idle();
                self.start_session();
            }
            Intent::Retake => {
                if self.session.as_ref().is_some_and(|session| session.operator_mode) {
                    self.run_capture();
                } else {
                    self.reject(intent.name(), RejectReason::OperatorOnly);
                }
            }
            Intent::Start => {}
        }
    }

    fn handle_operator(&mut self, command: OperatorCommand, target: Option<SessionId>) {
        match self.apply_operator(command, target) {
            Ok(()) => {
                info!(command = command.name(), hotkey = ?command.hotkey(), "operator command applied");
                self.emit(KioskEvent::OperatorApplied(command));
            }
            Err(reason) => self.reject(command.name(), reason),
        }
    }

    fn apply_operator(
        &mut self,
        command: OperatorCommand,
        target: Option<SessionId>,
    ) -> Result<(), RejectReason> {
        match command {
            OperatorCommand::UtilityAction => {
                let operator = Arc::clone(&self.clients.operator);
                self.spawn_call(None, async move {
                    Completion::Utility(operator.utility_action().await)
                });
            }
            OperatorCommand::ReprintLast => {
                let last = self.last_session_id.clone().ok_or(RejectReason::NoSession)?;
                if target.as_ref() != Some(&last) {
                    return Err(RejectReason::StaleSession);
                }
                let print = Arc::clone(&self.clients.print);
                let id = last.clone();
                self.spawn_call(Some(last), async move {
                    Completion::Reprinted(print.print(&id).await)
                });
            }
            OperatorCommand::HardReset => {
                if self.session.is_none() && self.screen == Screen::Idle && !self.starting {
                    return Err(RejectReason::NoSession);
                }
                if target.as_ref() != self.current_session_id() {
                    return Err(RejectReason::StaleSession);
                }
                self.reset_idle();
            }
            OperatorCommand::ForceCapture => {
                self.live_target(target.as_ref())?;
                if let Some(session) = self.session.as_mut() {
                    session.operator_mode = true;
                }
                self.run_capture();
            }
            OperatorCommand::ForceContinue => {
                self.live_target(target.as_ref())?;
                if self.screen != Screen::Capturing {
                    return Err(RejectReason::WrongScreen);
                }
                self.force_continue();
            }
            OperatorCommand::JumpToQr => {
                self.live_target(target.as_ref())?;
                self.show_qr();
            }
        }
        Ok(())
    }

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::SpinTick => {
                if let Some(reel) = self.reel.as_mut() {
                    self.selector.shuffle(reel);
                }
            }
            TimerKind::SpinSettle => self.settle_spin(),
            TimerKind::RevealDone => self.run_countdown(),
            TimerKind::CountdownTick => self.countdown_tick(),
            TimerKind::FlashOn => self.flash = true,
            TimerKind::FlashOff => self.flash = false,
            TimerKind::PollDue => self.issue_poll(),
            TimerKind::UpsellDue => self.upsell_visible = true,
            TimerKind::QrExpired => {
                info!(session_id = ?self.current_session_id(), "qr screen timed out");
                self.reset_idle();
            }
            TimerKind::Retry(step) => self.retry(step),
        }
    }

    fn on_completion(&mut self, session_id: Option<SessionId>, completion: Completion) {
        match completion {
            Completion::SessionStarted(result) => self.on_session_started(result),
            Completion::Armed(result) => self.on_armed(result),
            Completion::Status(result) => self.on_status(result),
            Completion::Rendered(result) => self.on_rendered(result),
            Completion::Printed(result) => self.on_printed(result),
            Completion::QrReady(result) => self.on_qr_ready(result),
            Completion::Reprinted(result) => self.on_reprinted(session_id, result),
            Completion::Utility(result) => self.on_utility(result),
            Completion::Config(result) => self.on_config(result),
        }
    }

    fn start_session(&mut self) {
        if self.session.is_some() || self.screen != Screen::Idle {
            self.reject(Intent::Start.name(), RejectReason::WrongScreen);
            return;
        }
        if self.starting {
            self.reject(Intent::Start.name(), RejectReason::Busy);
            return;
        }
        self.starting = true;
        self.notice = None;
        let sessions = Arc::clone(&self.clients.sessions);
        self.spawn_call(None, async move {
            Completion::SessionStarted(sessions.start_session().await)
        });
    }

    fn on_session_started(&mut self, result: anyhow::Result<StartedSession>) {
        if !self.starting {
            return;
        }
        self.starting = false;

        let started = match result {
            Ok(started) => started,
            Err(err) => {
                self.session_start_failed(SessionStartFault::Backend(format!("{err:#}")));
                return;
            }
        };
        if self.last_session_id.as_ref() == Some(&started.id) {
            self.session_start_failed(SessionStartFault::DuplicateSessionId(started.id));
            return;
        }

        info!(
            session_id = %started.id,
            mode = %started.mode.name,
            tier = %started.mode.tier,
            "session started"
        );
        self.last_session_id = Some(started.id.clone());
        self.session = Some(Session::new(started.id.clone(), started.mode.clone()));
        self.emit(KioskEvent::SessionStarted {
            session_id: started.id,
            mode: started.mode,
        });
        self.run_spin();
    }

    fn session_start_failed(&mut self, fault: SessionStartFault) {
        warn!(%fault, "session start failed; staying idle");
        self.notice = Some(FAULT_NOTICE.to_string());
        self.emit(KioskEvent::Fault(Fault::SessionStart(fault)));
    }

    fn run_spin(&mut self) {
        let Some(mode) = self.session.as_ref().map(|session| session.assigned_mode.clone()) else {
            return;
        };
        self.reel = Some(self.selector.begin(&mode));
        self.enter(
            Screen::Spin,
            [
                Timer::Every(self.timings.spin_tick, TimerKind::SpinTick),
                Timer::After(self.timings.spin_duration, TimerKind::SpinSettle),
            ],
        );
    }

    fn settle_spin(&mut self) {
        if let (Some(reel), Some(session)) = (self.reel.as_mut(), self.session.as_ref()) {
            self.selector.settle(reel, &session.assigned_mode);
        }
        self.run_reveal();
    }

    fn run_reveal(&mut self) {
        self.enter(
            Screen::Reveal,
            [Timer::After(self.timings.reveal, TimerKind::RevealDone)],
        );
    }

    fn run_countdown(&mut self) {
        self.countdown = Some(self.timings.countdown_from.max(1));
        self.enter(
            Screen::Countdown,
            [Timer::Every(self.timings.countdown_tick, TimerKind::CountdownTick)],
        );
    }

    fn countdown_tick(&mut self) {
        match self.countdown {
            Some(value) if value > 1 => self.countdown = Some(value - 1),
            _ => self.run_capture(),
        }
    }

    fn run_capture(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.capture_status = None;
        self.countdown = None;
        self.flash = false;
        self.print_error = None;
        self.upsell_visible = false;
        self.capture = CaptureProgress {
            message: Some(CAPTURE_WAITING_MESSAGE.to_string()),
            ..CaptureProgress::default()
        };
        self.enter(
            Screen::Capturing,
            [
                Timer::After(self.timings.flash_on, TimerKind::FlashOn),
                Timer::After(self.timings.flash_off, TimerKind::FlashOff),
            ],
        );
        self.issue_arm();
    }

    fn issue_arm(&mut self) {
        let Some(session_id) = self.current_session_id().cloned() else {
            return;
        };
        let capture = Arc::clone(&self.clients.capture);
        let id = session_id.clone();
        self.spawn_call(Some(session_id), async move {
            Completion::Armed(capture.arm(&id).await)
        });
    }

    fn on_armed(&mut self, result: anyhow::Result<()>) {
        match result {
            Ok(()) => {
                debug!(session_id = ?self.current_session_id(), "capture armed; polling");
                self.capture.armed_at = Some(Instant::now());
                self.schedule_poll();
            }
            Err(err) => self.transient_fault(FlowStep::ArmCapture, err),
        }
    }

    fn schedule_poll(&mut self) {
        self.timers
            .schedule(Timer::After(self.poll_policy.interval, TimerKind::PollDue));
    }

    fn issue_poll(&mut self) {
        if self.capture.suspended || self.capture.continuing {
            return;
        }
        let elapsed = self
            .capture
            .armed_at
            .map_or(Duration::ZERO, |armed_at| armed_at.elapsed());
        if self.poll_policy.exceeded(self.capture.attempts, elapsed) {
            warn!(
                attempts = self.capture.attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "capture poll bound reached"
            );
            self.suspend_capture(CAPTURE_TIMED_OUT_MESSAGE.to_string());
            return;
        }
        let Some(session_id) = self.current_session_id().cloned() else {
            return;
        };
        self.capture.attempts += 1;
        let capture = Arc::clone(&self.clients.capture);
        let id = session_id.clone();
        self.spawn_call(Some(session_id), async move {
            Completion::Status(capture.status(&id).await)
        });
    }

    fn on_status(&mut self, result: anyhow::Result<CaptureStatus>) {
        let status = match result {
            Ok(status) => status,
            Err(err) => {
                self.transient_fault(FlowStep::PollStatus, err);
                return;
            }
        };
        let state = status.state;
        let terminal = status.is_terminal();
        let message = status.message.clone();
        if !message.is_empty() {
            self.capture.message = Some(message.clone());
        }
        if let Some(session) = self.session.as_mut() {
            session.capture_status = Some(status);
        }

        if !terminal {
            self.schedule_poll();
        } else if state == CaptureState::Captured {
            info!(attempts = self.capture.attempts, "photo captured; rendering");
            self.issue_render();
        } else {
            let message = if message.is_empty() {
                DEVICE_ERROR_MESSAGE.to_string()
            } else {
                message
            };
            self.suspend_capture(message);
        }
    }

    /// Stops polling and leaves the session on the capturing screen until an
    /// operator continues, recaptures or resets.
    fn suspend_capture(&mut self, message: String) {
        self.capture.suspended = true;
        self.capture.message = Some(message.clone());
        let Some(session_id) = self.current_session_id().cloned() else {
            return;
        };
        warn!(session_id = %session_id, %message, "capture suspended; operator action required");
        self.emit(KioskEvent::Fault(Fault::DeviceReported {
            message: message.clone(),
        }));
        self.emit(KioskEvent::CaptureSuspended { session_id, message });
    }

    fn force_continue(&mut self) {
        // New epoch for the same screen: polls and renders already in flight
        // come back stale.
        self.timers.schedule_for_screen(Screen::Capturing, []);
        self.flash = false;
        self.capture.suspended = false;
        self.capture.continuing = true;
        self.issue_render();
    }

    fn issue_render(&mut self) {
        let Some(session_id) = self.current_session_id().cloned() else {
            return;
        };
        let render = Arc::clone(&self.clients.render);
        let id = session_id.clone();
        self.spawn_call(Some(session_id), async move {
            Completion::Rendered(render.render_final(&id).await)
        });
    }

    fn on_rendered(&mut self, result: anyhow::Result<String>) {
        let final_url = match result {
            Ok(final_url) => final_url,
            Err(err) => {
                self.transient_fault(FlowStep::RenderFinal, err);
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.final_url = Some(final_url.clone());
        let session_id = session.id.clone();
        info!(session_id = %session_id, %final_url, "final image rendered");
        self.emit(KioskEvent::Rendered {
            session_id,
            final_url,
        });
        self.run_preview(None);
    }

    fn run_preview(&mut self, print_error: Option<String>) {
        self.flash = false;
        self.capture.suspended = false;
        self.capture.continuing = false;
        self.print_error = print_error;
        self.upsell_visible = false;
        self.enter(
            Screen::Preview,
            [Timer::After(self.timings.upsell_delay, TimerKind::UpsellDue)],
        );
    }

    fn do_print(&mut self) {
        self.print_error = None;
        self.upsell_visible = false;
        self.enter(Screen::Printing, []);
        self.issue_print();
    }

    fn issue_print(&mut self) {
        let Some(session_id) = self.current_session_id().cloned() else {
            return;
        };
        let print = Arc::clone(&self.clients.print);
        let id = session_id.clone();
        self.spawn_call(Some(session_id), async move {
            Completion::Printed(print.print(&id).await)
        });
    }

    fn on_printed(&mut self, result: anyhow::Result<PrintOutcome>) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.transient_fault(FlowStep::Print, err);
                return;
            }
        };
        let Some(session_id) = self.current_session_id().cloned() else {
            return;
        };
        self.emit(KioskEvent::PrintCompleted {
            session_id: session_id.clone(),
            success: outcome.success,
            message: outcome.message.clone(),
        });

        if outcome.success {
            info!(session_id = %session_id, "print finished");
            self.show_qr();
        } else {
            warn!(session_id = %session_id, message = %outcome.message, "print failed; back to preview");
            let text = print_error_text(&outcome.message);
            self.emit(KioskEvent::Fault(Fault::PrintFailure {
                message: outcome.message,
            }));
            self.run_preview(Some(text));
        }
    }

    fn show_qr(&mut self) {
        self.qr_url = None;
        self.print_error = None;
        self.upsell_visible = false;
        self.flash = false;
        self.enter(
            Screen::Qr,
            [Timer::After(self.timings.qr_timeout, TimerKind::QrExpired)],
        );
        self.issue_qr();
    }

    fn issue_qr(&mut self) {
        let Some(session_id) = self.current_session_id().cloned() else {
            return;
        };
        let qr = Arc::clone(&self.clients.qr);
        let id = session_id.clone();
        self.spawn_call(Some(session_id), async move {
            Completion::QrReady(qr.qr_reference(&id).await)
        });
    }

    fn on_qr_ready(&mut self, result: anyhow::Result<String>) {
        match result {
            Ok(url) => self.qr_url = Some(url),
            Err(err) => self.transient_fault(FlowStep::FetchQr, err),
        }
    }

    fn on_reprinted(&mut self, session_id: Option<SessionId>, result: anyhow::Result<PrintOutcome>) {
        let Some(session_id) = session_id else {
            return;
        };
        let (success, message) = match result {
            Ok(outcome) => (outcome.success, outcome.message),
            Err(err) => (false, format!("{err:#}")),
        };
        if success {
            info!(session_id = %session_id, "reprint finished");
        } else {
            warn!(session_id = %session_id, %message, "reprint failed");
        }
        self.emit(KioskEvent::Reprinted {
            session_id,
            success,
            message,
        });
    }

    fn on_utility(&mut self, result: anyhow::Result<String>) {
        let status = match result {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "operator utility action failed");
                format!("failed: {err:#}")
            }
        };
        info!(%status, "operator utility action finished");
        self.emit(KioskEvent::UtilityCompleted { status });
    }

    fn fetch_config(&mut self) {
        let operator = Arc::clone(&self.clients.operator);
        self.spawn_call(None, async move {
            Completion::Config(operator.fetch_config().await)
        });
    }

    fn on_config(&mut self, result: anyhow::Result<BackendConfig>) {
        match result {
            Ok(config) if !config.incoming_exists => {
                warn!(folder = %config.incoming_folder, "incoming folder is missing");
                self.setup_warning = Some(format!(
                    "Setup needed: incoming folder not found at {}",
                    config.incoming_folder
                ));
            }
            Ok(_) => self.setup_warning = None,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "backend config unavailable; skipping setup check");
            }
        }
    }

    fn transient_fault(&mut self, step: FlowStep, err: anyhow::Error) {
        let message = format!("{err:#}");
        match self.fault_policy.decide(step, &err) {
            FaultAction::RetryAfter(delay) => {
                warn!(?step, %message, retry_in_ms = delay.as_millis() as u64, "request failed; retrying");
                self.timers.schedule(Timer::After(delay, TimerKind::Retry(step)));
            }
            FaultAction::AbortSession => {
                error!(
                    ?step,
                    %message,
                    session_id = ?self.current_session_id(),
                    "request failed; aborting session"
                );
                self.emit(KioskEvent::Fault(Fault::TransientNetwork { step, message }));
                self.reset_idle();
                self.notice = Some(FAULT_NOTICE.to_string());
            }
        }
    }

    fn retry(&mut self, step: FlowStep) {
        match step {
            FlowStep::ArmCapture => self.issue_arm(),
            FlowStep::PollStatus => self.issue_poll(),
            FlowStep::RenderFinal => self.issue_render(),
            FlowStep::Print => self.issue_print(),
            FlowStep::FetchQr => self.issue_qr(),
        }
    }

    /// Discards the live session and every pending timer. `last_session_id`
    /// survives so the operator can still reprint.
    fn reset_idle(&mut self) {
        self.timers.cancel_all();
        let from = self.screen;
        let discarded = self.session.take().map(|session| session.id);
        self.screen = Screen::Idle;
        self.starting = false;
        self.reel = None;
        self.countdown = None;
        self.flash = false;
        self.capture = CaptureProgress::default();
        self.print_error = None;
        self.upsell_visible = false;
        self.qr_url = None;
        info!(session_id = ?discarded, from = from.label(), "back to idle");
        self.emit(KioskEvent::ScreenChanged {
            from,
            to: Screen::Idle,
            session_id: None,
        });
    }

    /// Makes `screen` current. Its timers replace whatever the previous
    /// screen still had pending.
    fn enter(&mut self, screen: Screen, timers: impl IntoIterator<Item = Timer>) {
        let from = self.screen;
        self.timers.schedule_for_screen(screen, timers);
        self.screen = screen;
        let session_id = self.current_session_id().cloned();
        info!(
            from = from.label(),
            to = screen.label(),
            session_id = ?session_id,
            "screen transition"
        );
        self.emit(KioskEvent::ScreenChanged {
            from,
            to: screen,
            session_id,
        });
    }

    fn spawn_call<F>(&self, session_id: Option<SessionId>, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let internal = self.internal_tx.clone();
        let epoch = self.timers.epoch();
        tokio::spawn(async move {
            let completion = call.await;
            let _ = internal.send(Internal::Completed {
                epoch,
                session_id,
                completion,
            });
        });
    }

    fn reject(&self, command: &'static str, reason: RejectReason) {
        debug!(command, ?reason, screen = self.screen.label(), "kiosk command rejected");
        self.emit(KioskEvent::CommandRejected { command, reason });
    }

    fn emit(&self, event: KioskEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        let capturing = self.screen == Screen::Capturing;
        SessionSnapshot {
            screen: self.screen,
            session: self.session.clone(),
            last_session_id: self.last_session_id.clone(),
            reel: self.reel.clone(),
            countdown: self.countdown,
            flash: self.flash,
            capture_message: self.capture.message.clone().filter(|_| capturing),
            capture_suspended: capturing && self.capture.suspended,
            print_error: self.print_error.clone(),
            upsell_visible: self.upsell_visible,
            qr_url: self.qr_url.clone(),
            notice: self.notice.clone(),
            setup_warning: self.setup_warning.clone(),
        }
    }
}

fn print_error_text(message: &str) -> String {
    if message.trim().is_empty() {
        PRINT_FAILED_NOTICE.to_string()
    } else {
        format!("{PRINT_FAILED_NOTICE} ({})", message.trim())
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
