//! Turns named UI surfaces on and off in response to session transitions.
//!
//! The activator remembers which surfaces it has enabled, so repeated
//! requests are no-ops rather than second injections. All toggling goes
//! through one async lock held for a whole transition: the next transition's
//! effects start only after the previous one's finished.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Whatever actually attaches or detaches a surface (page mod, overlay, ...).
#[async_trait]
pub trait SurfaceControl: Send + Sync {
    async fn enable(&self, name: &str) -> Result<()>;
    async fn disable(&self, name: &str) -> Result<()>;
}

pub struct SurfaceActivator {
    control: Arc<dyn SurfaceControl>,
    active: Mutex<BTreeSet<String>>,
}

impl SurfaceActivator {
    pub fn new(control: Arc<dyn SurfaceControl>) -> Self {
        Self {
            control,
            active: Mutex::new(BTreeSet::new()),
        }
    }

    /// Enables `name` unless it is already active. Returns whether the
    /// surface control was actually invoked and succeeded.
    pub async fn activate(&self, name: &str) -> bool {
        let mut active = self.active.lock().await;
        self.enable_locked(&mut active, name).await
    }

    /// Disables `name` if it is active. Returns whether anything changed.
    pub async fn deactivate(&self, name: &str) -> bool {
        let mut active = self.active.lock().await;
        self.disable_locked(&mut active, name).await
    }

    /// Applies one transition's surface changes as a unit: deactivations
    /// first, then activations.
    pub async fn apply(&self, deactivate: &[&str], activate: &[&str]) {
        let mut active = self.active.lock().await;
        for name in deactivate {
            self.disable_locked(&mut active, name).await;
        }
        for name in activate {
            self.enable_locked(&mut active, name).await;
        }
    }

    pub async fn active_surfaces(&self) -> Vec<String> {
        self.active.lock().await.iter().cloned().collect()
    }

    pub async fn is_active(&self, name: &str) -> bool {
        self.active.lock().await.contains(name)
    }

    // A failed toggle leaves the bookkeeping untouched, so the next
    // transition that wants the surface tries again.
    async fn enable_locked(&self, active: &mut BTreeSet<String>, name: &str) -> bool {
        if active.contains(name) {
            debug!(surface = name, "Surface already active");
            return false;
        }
        match self.control.enable(name).await {
            Ok(()) => {
                info!(surface = name, "Surface activated");
                active.insert(name.to_string());
                true
            }
            Err(err) => {
                warn!(surface = name, error = %err, "Failed to activate surface");
                false
            }
        }
    }

    async fn disable_locked(&self, active: &mut BTreeSet<String>, name: &str) -> bool {
        if !active.contains(name) {
            return false;
        }
        match self.control.disable(name).await {
            Ok(()) => {
                info!(surface = name, "Surface deactivated");
                active.remove(name);
                true
            }
            Err(err) => {
                warn!(surface = name, error = %err, "Failed to deactivate surface");
                false
            }
        }
    }
}
