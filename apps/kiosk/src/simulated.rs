use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use kiosk_core::{
    CacheBuster, CaptureDeviceClient, OperatorClient, PrintClient, PrintOutcome, QrClient,
    RenderClient, SessionBackend, StartedSession,
};
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    SeedableRng,
};
use shared::{
    domain::{CaptureState, CaptureStatus, Mode, SessionId},
    protocol::BackendConfig,
};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Tier draw weights: common, spicy, legendary.
const TIER_WEIGHTS: [(&str, f64); 3] = [("Common", 0.70), ("Spicy", 0.25), ("Legendary", 0.05)];

struct CatalogMode {
    name: &'static str,
    tier: &'static str,
    weight: u32,
    prompt: Option<&'static str>,
}

const CATALOG: &[CatalogMode] = &[
    CatalogMode { name: "ROCKSTAR", tier: "Common", weight: 3, prompt: Some("SHRED THAT AIR GUITAR!") },
    CatalogMode { name: "SPACE PILOT", tier: "Common", weight: 2, prompt: None },
    CatalogMode { name: "MOVIE STAR", tier: "Common", weight: 2, prompt: Some("RED CARPET READY!") },
    CatalogMode { name: "VILLAIN ERA", tier: "Spicy", weight: 1, prompt: Some("EVIL GRIN, PLEASE.") },
    CatalogMode { name: "MAIN CHARACTER", tier: "Spicy", weight: 1, prompt: None },
    CatalogMode { name: "DISCO QUEEN", tier: "Legendary", weight: 1, prompt: Some("OWN THE DANCE FLOOR!") },
];

#[derive(Debug, Default)]
struct CaptureProgress {
    armed: bool,
    waiting_left: u32,
}

pub struct SimulatedBackend {
    waiting_polls: u32,
    rng: Mutex<StdRng>,
    /// Only the latest session. Starting a new one forgets the previous.
    captures: Mutex<HashMap<SessionId, CaptureProgress>>,
    started: AtomicU64,
    cache_buster: CacheBuster,
}

impl SimulatedBackend {
    pub fn new(waiting_polls: u32) -> Self {
        Self::with_rng(waiting_polls, StdRng::from_entropy())
    }

    pub fn with_seed(waiting_polls: u32, seed: u64) -> Self {
        Self::with_rng(waiting_polls, StdRng::seed_from_u64(seed))
    }

    fn with_rng(waiting_polls: u32, rng: StdRng) -> Self {
        Self {
            waiting_polls,
            rng: Mutex::new(rng),
            captures: Mutex::new(HashMap::new()),
            started: AtomicU64::new(0),
            cache_buster: CacheBuster::new(),
        }
    }

    async fn pick_mode(&self) -> Result<Mode> {
        let mut rng = self.rng.lock().await;
        let tiers = WeightedIndex::new(TIER_WEIGHTS.iter().map(|(_, weight)| *weight))?;
        let tier = TIER_WEIGHTS[tiers.sample(&mut *rng)].0;

        let mut candidates: Vec<&CatalogMode> =
            CATALOG.iter().filter(|mode| mode.tier == tier).collect();
        if candidates.is_empty() {
            candidates = CATALOG.iter().collect();
        }
        let modes = WeightedIndex::new(candidates.iter().map(|mode| mode.weight.max(1)))?;
        let picked = candidates[modes.sample(&mut *rng)];
        Ok(Mode::new(
            picked.name,
            picked.tier,
            picked.prompt.map(str::to_string),
        ))
    }
}

#[async_trait]
impl SessionBackend for SimulatedBackend {
    async fn start_session(&self) -> Result<StartedSession> {
        let id = SessionId::new(Uuid::new_v4().simple().to_string());
        let mode = self.pick_mode().await?;
        {
            let mut captures = self.captures.lock().await;
            captures.clear();
            captures.insert(id.clone(), CaptureProgress::default());
        }
        self.started.fetch_add(1, Ordering::Relaxed);
        info!(session_id = %id, mode = %mode.name, tier = %mode.tier, "simulated session started");
        Ok(StartedSession { id, mode })
    }
}

#[async_trait]
impl CaptureDeviceClient for SimulatedBackend {
    async fn arm(&self, session_id: &SessionId) -> Result<()> {
        let mut captures = self.captures.lock().await;
        let Some(progress) = captures.get_mut(session_id) else {
            bail!("unknown session {session_id}");
        };
        progress.armed = true;
        progress.waiting_left = self.waiting_polls;
        Ok(())
    }

    async fn status(&self, session_id: &SessionId) -> Result<CaptureStatus> {
        let mut captures = self.captures.lock().await;
        let Some(progress) = captures.get_mut(session_id) else {
            bail!("unknown session {session_id}");
        };
        if !progress.armed {
            return Ok(CaptureStatus::new(CaptureState::Idle, ""));
        }
        if progress.waiting_left > 0 {
            progress.waiting_left -= 1;
            return Ok(CaptureStatus::new(CaptureState::Waiting, "Waiting for camera..."));
        }
        progress.armed = false;
        let mut status = CaptureStatus::new(CaptureState::Captured, "Captured");
        status.raw_path = Some(format!("sim/sessions/{session_id}/raw.jpg"));
        Ok(status)
    }
}

#[async_trait]
impl RenderClient for SimulatedBackend {
    async fn render_final(&self, session_id: &SessionId) -> Result<String> {
        Ok(self
            .cache_buster
            .apply(&format!("sim://sessions/{session_id}/final.jpg")))
    }
}

#[async_trait]
impl PrintClient for SimulatedBackend {
    async fn print(&self, session_id: &SessionId) -> Result<PrintOutcome> {
        info!(session_id = %session_id, "simulated print");
        Ok(PrintOutcome {
            success: true,
            message: "Printed".to_string(),
        })
    }
}

#[async_trait]
impl QrClient for SimulatedBackend {
    async fn qr_reference(&self, session_id: &SessionId) -> Result<String> {
        Ok(self.cache_buster.apply(&format!("sim://qr/{session_id}")))
    }
}

#[async_trait]
impl OperatorClient for SimulatedBackend {
    async fn utility_action(&self) -> Result<String> {
        let started = self.started.load(Ordering::Relaxed);
        Ok(format!("{started} simulated sessions"))
    }

    async fn fetch_config(&self) -> Result<BackendConfig> {
        Ok(BackendConfig {
            incoming_exists: true,
            incoming_folder: "sim/incoming".to_string(),
            canvas: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_waiting_then_captured_after_arming() {
        let backend = SimulatedBackend::with_seed(2, 11);
        let started = backend.start_session().await.expect("start");

        let before = backend.status(&started.id).await.expect("status");
        assert_eq!(before.state, CaptureState::Idle);

        backend.arm(&started.id).await.expect("arm");
        let states: Vec<CaptureState> = [
            backend.status(&started.id).await.expect("status").state,
            backend.status(&started.id).await.expect("status").state,
            backend.status(&started.id).await.expect("status").state,
        ]
        .to_vec();
        assert_eq!(
            states,
            vec![CaptureState::Waiting, CaptureState::Waiting, CaptureState::Captured]
        );
    }

    #[tokio::test]
    async fn session_ids_are_unique() {
        let backend = SimulatedBackend::with_seed(0, 3);
        let first = backend.start_session().await.expect("first");
        let second = backend.start_session().await.expect("second");
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn tier_draw_favors_common_modes() {
        let backend = SimulatedBackend::with_seed(0, 99);
        let mut common = 0;
        let mut legendary = 0;
        for _ in 0..1_000 {
            let mode = backend.pick_mode().await.expect("mode");
            assert!(CATALOG.iter().any(|entry| entry.name == mode.name));
            match mode.tier.as_str() {
                "Common" => common += 1,
                "Legendary" => legendary += 1,
                _ => {}
            }
        }
        assert!(common > 600, "common draws: {common}");
        assert!(legendary < 120, "legendary draws: {legendary}");
    }

    #[tokio::test]
    async fn starting_a_session_forgets_the_previous_one() {
        let backend = SimulatedBackend::with_seed(0, 5);
        let first = backend.start_session().await.expect("first");
        let second = backend.start_session().await.expect("second");

        assert_eq!(backend.captures.lock().await.len(), 1);
        assert!(backend.arm(&first.id).await.is_err());
        backend.arm(&second.id).await.expect("arm latest");
        assert_eq!(
            backend.utility_action().await.expect("utility"),
            "2 simulated sessions"
        );
    }

    #[tokio::test]
    async fn recapture_rearms_the_same_session() {
        let backend = SimulatedBackend::with_seed(0, 8);
        let started = backend.start_session().await.expect("start");
        backend.arm(&started.id).await.expect("arm");
        assert_eq!(
            backend.status(&started.id).await.expect("status").state,
            CaptureState::Captured
        );
        backend.arm(&started.id).await.expect("rearm");
        assert_eq!(
            backend.status(&started.id).await.expect("status").state,
            CaptureState::Captured
        );
    }

    #[tokio::test]
    async fn unknown_sessions_are_errors() {
        let backend = SimulatedBackend::new(0);
        assert!(backend.arm(&SessionId::new("nope")).await.is_err());
    }
}
