//! Fake collaborators shared by unit tests.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, TransportError, WardenError};
use crate::monitor::AuthCheck;
use crate::surface::SurfaceControl;

/// Auth check that replays a fixed script, then repeats `fallback`.
pub struct ScriptedAuthCheck {
    script: Mutex<VecDeque<std::result::Result<bool, TransportError>>>,
    fallback: std::result::Result<bool, TransportError>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAuthCheck {
    pub fn new(script: Vec<std::result::Result<bool, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Ok(true),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: std::result::Result<bool, TransportError>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub fn unreachable() -> std::result::Result<bool, TransportError> {
    Err(TransportError::Request("connection refused".to_string()))
}

#[async_trait]
impl AuthCheck for ScriptedAuthCheck {
    async fn check_authenticated(&self) -> std::result::Result<bool, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Enable(String),
    Disable(String),
}

/// Surface control that records every call and tracks how many surfaces
/// were enabled at the same time.
pub struct RecordingSurfaceControl {
    calls: Mutex<Vec<SurfaceCall>>,
    enabled: Mutex<BTreeSet<String>>,
    fail_enable: Mutex<HashSet<String>>,
    max_enabled: AtomicUsize,
    delay: Duration,
}

impl RecordingSurfaceControl {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            enabled: Mutex::new(BTreeSet::new()),
            fail_enable: Mutex::new(HashSet::new()),
            max_enabled: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn fail_next_enable(&self, name: &str) {
        self.fail_enable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn enable_count(&self, name: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == SurfaceCall::Enable(name.to_string()))
            .count()
    }

    pub fn max_enabled(&self) -> usize {
        self.max_enabled.load(Ordering::SeqCst)
    }

    fn record(&self, call: SurfaceCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }
}

#[async_trait]
impl SurfaceControl for RecordingSurfaceControl {
    async fn enable(&self, name: &str) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let should_fail = self
            .fail_enable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name);
        if should_fail {
            return Err(WardenError::Surface {
                name: name.to_string(),
                details: "injected failure".to_string(),
            });
        }

        self.record(SurfaceCall::Enable(name.to_string()));
        let count = {
            let mut enabled = self
                .enabled
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            enabled.insert(name.to_string());
            enabled.len()
        };
        self.max_enabled.fetch_max(count, Ordering::SeqCst);
        Ok(())
    }

    async fn disable(&self, name: &str) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.record(SurfaceCall::Disable(name.to_string()));
        self.enabled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name);
        Ok(())
    }
}
