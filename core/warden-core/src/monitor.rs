//! The recurring auth status check and the side effects of its results.
//!
//! ```text
//! AuthCheck ──▶ SessionMonitor::check_now ──▶ AuthStatusStore (phase)
//!                        │
//!                        ├──▶ SessionCaches::invalidate_all   (session ended)
//!                        ├──▶ SurfaceActivator::apply          (surfaces follow phase)
//!                        └──▶ subscribers: PhaseTransition     (phase changed)
//! ```
//!
//! Every check runs behind `check_gate`, so checks never overlap and phase
//! transitions never race, whether they come from the loop, bootstrap or an
//! IPC request. The gate is private to the monitor: cache readers and status
//! readers never wait on a slow check.
//!
//! The loop schedules its next run only after the current check finishes.
//! Cancellation is observed between runs; a check already in flight is
//! allowed to complete and its result is recorded.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::SessionCaches;
use crate::config::{SurfaceConfig, WardenConfig};
use crate::error::TransportError;
use crate::phase::{plan_transition, PhaseTransition, SessionPhase};
use crate::status::{AuthStatusRecord, AuthStatusStore};
use crate::surface::SurfaceActivator;

const TRANSITION_CHANNEL_CAPACITY: usize = 32;

/// Answers "does the current user hold a valid session?".
///
/// `Ok(false)` is an authoritative no. `Err` means no answer could be
/// obtained; timeouts are the implementation's responsibility.
#[async_trait]
pub trait AuthCheck: Send + Sync {
    async fn check_authenticated(&self) -> Result<bool, TransportError>;
}

struct LoopHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct SessionMonitor {
    check: Arc<dyn AuthCheck>,
    store: Arc<AuthStatusStore>,
    caches: SessionCaches,
    activator: Arc<SurfaceActivator>,
    surfaces: SurfaceConfig,
    interval: Duration,
    check_gate: Mutex<()>,
    transitions: broadcast::Sender<PhaseTransition>,
    loop_handle: StdMutex<Option<LoopHandle>>,
}

impl SessionMonitor {
    pub fn new(
        check: Arc<dyn AuthCheck>,
        store: Arc<AuthStatusStore>,
        caches: SessionCaches,
        activator: Arc<SurfaceActivator>,
        config: &WardenConfig,
    ) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            check,
            store,
            caches,
            activator,
            surfaces: config.surfaces.clone(),
            interval: config.monitor.check_interval(),
            check_gate: Mutex::new(()),
            transitions,
            loop_handle: StdMutex::new(None),
        }
    }

    pub fn status(&self) -> AuthStatusRecord {
        self.store.read()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Receives `(previous, current)` for every phase change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseTransition> {
        self.transitions.subscribe()
    }

    /// First check of the process. Starts the loop if the session is live.
    pub async fn bootstrap(self: &Arc<Self>) -> AuthStatusRecord {
        let persisted = self.store.read();
        info!(
            persisted_phase = %persisted.phase,
            consecutive_failures = persisted.consecutive_failures,
            "Bootstrapping session monitor"
        );
        self.check_then_start().await
    }

    /// Runs one check and (re)starts the loop if the session is signed in.
    /// Used at bootstrap and whenever a collaborator reports a fresh login.
    pub async fn check_then_start(self: &Arc<Self>) -> AuthStatusRecord {
        let record = self.check_now().await;
        if record.phase.is_signed_in() {
            self.start();
        }
        record
    }

    /// Performs one serialized check and carries out its side effects.
    pub async fn check_now(&self) -> AuthStatusRecord {
        let _gate = self.check_gate.lock().await;
        let previous = self.store.read().phase;

        let result = self.check.check_authenticated().await;
        let at = Utc::now();
        let record = match &result {
            Ok(authenticated) => self.store.record_success(*authenticated, at),
            Err(err) => {
                let record = self.store.record_failure(at);
                warn!(
                    error = %err,
                    consecutive_failures = record.consecutive_failures,
                    grace_failures = self.store.grace_failures(),
                    "Auth status check failed"
                );
                record
            }
        };
        debug!(
            previous = %previous,
            current = %record.phase,
            authenticated = ?result.as_ref().ok(),
            "Auth status check completed"
        );

        self.apply_effects(previous, record.phase).await;

        if previous != record.phase {
            info!(previous = %previous, current = %record.phase, "Session phase changed");
            // No receivers is fine; transitions are fire-and-forget.
            let _ = self.transitions.send(PhaseTransition {
                previous,
                current: record.phase,
                at,
            });
        }

        record
    }

    async fn apply_effects(&self, previous: SessionPhase, current: SessionPhase) {
        let plan = plan_transition(previous, current);
        if plan.is_empty() {
            return;
        }

        if plan.invalidate_caches {
            let cleared = self.caches.invalidate_all();
            info!(cleared, phase = %current, "Session caches invalidated");
        }

        let deactivate: Vec<&str> = plan
            .deactivate
            .iter()
            .map(|role| self.surfaces.name_for(*role))
            .collect();
        let activate: Vec<&str> = plan
            .activate
            .iter()
            .map(|role| self.surfaces.name_for(*role))
            .collect();
        self.activator.apply(&deactivate, &activate).await;
    }

    /// Starts the recurring check. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = self
            .loop_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.as_ref() {
            if !handle.task.is_finished() {
                return false;
            }
        }

        let (cancel, cancelled) = watch::channel(false);
        let monitor = Arc::clone(self);
        let task = tokio::spawn(async move { monitor.run_loop(cancelled).await });
        *slot = Some(LoopHandle { cancel, task });

        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Session monitor loop started"
        );
        true
    }

    /// Cancels the loop and waits for it to wind down. An in-flight check
    /// completes first.
    pub async fn stop(&self) {
        let handle = {
            let mut slot = self
                .loop_handle
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };

        if let Some(handle) = handle {
            let _ = handle.cancel.send(true);
            if let Err(err) = handle.task.await {
                warn!(error = %err, "Session monitor loop ended abnormally");
            }
            info!("Session monitor loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle
            .lock()
            .map(|slot| {
                slot.as_ref()
                    .map(|handle| !handle.task.is_finished())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    async fn run_loop(self: Arc<Self>, mut cancelled: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                // Fires on cancel, or when the handle was dropped.
                _ = cancelled.changed() => break,
            }
            if *cancelled.borrow() {
                break;
            }

            self.check_now().await;

            if *cancelled.borrow() {
                break;
            }
        }
        debug!("Session monitor loop exiting");
    }
}
