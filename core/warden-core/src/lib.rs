//! # warden-core
//!
//! Core library for the Warden background process: the single owner of the
//! session status, the local entity caches derived from it, and the UI
//! surfaces that follow it.
//!
//! ## Design Principles
//!
//! - **Single writer**: Only [`SessionMonitor`] drives phase changes; every
//!   check, store update and side effect runs behind one async gate.
//! - **Graceful degradation**: Transport failures become phase transitions,
//!   persistence failures become log lines. Nothing here panics the daemon.
//! - **Pure decisions**: [`phase`] decides what a check result means; the
//!   monitor and activator only carry those decisions out.
//! - **Collaborators at the seams**: the auth check, surface control and
//!   status persistence are traits so the daemon (and tests) plug in their own.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use warden_core::{AuthStatusStore, SessionMonitor, SurfaceActivator};
//!
//! let store = Arc::new(AuthStatusStore::open(persistence, config.monitor.grace_failures));
//! let monitor = Arc::new(SessionMonitor::new(check, store, caches, activator, &config));
//! let record = monitor.bootstrap().await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod monitor;
pub mod phase;
pub mod status;
pub mod storage;
pub mod surface;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{
    CacheEntry, EntityCache, Folder, FolderCache, PutOutcome, Resource, ResourceCache,
    SessionCaches,
};
pub use config::{load_config, MonitorConfig, SurfaceConfig, WardenConfig};
pub use error::{Result, TransportError, WardenError};
pub use monitor::{AuthCheck, SessionMonitor};
pub use phase::{
    next_phase, plan_transition, CheckOutcome, PhaseTransition, SessionPhase, SurfaceRole,
    TransitionPlan,
};
pub use status::{
    AuthStatusRecord, AuthStatusStore, JsonFileStatusPersistence, MemoryStatusPersistence,
    StatusPersistence,
};
pub use storage::StorageConfig;
pub use surface::{SurfaceActivator, SurfaceControl};
