//! Warden daemon entrypoint.
//!
//! A small, single-writer service that owns the session status: it runs the
//! recurring auth check, keeps the entity caches, toggles UI surfaces, and
//! answers clients over a local socket.

use std::process::ExitCode;
use std::sync::Arc;

use fs_err as fs;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use warden_core::{
    load_config, AuthCheck, AuthStatusStore, JsonFileStatusPersistence, SessionCaches,
    SessionMonitor, StorageConfig, SurfaceActivator, WardenConfig,
};

mod auth_check;
mod logging;
mod server;
mod state;
mod surface_file;

use auth_check::{HttpAuthCheck, UnconfiguredAuthCheck};
use state::SharedState;
use surface_file::FileSurfaceControl;

#[tokio::main]
async fn main() -> ExitCode {
    let storage = StorageConfig::resolve();
    let logs_dir = storage.as_ref().ok().map(|storage| storage.logs_dir());
    let _log_guard = logging::init(logs_dir.as_deref());

    let storage = match storage {
        Ok(storage) => storage,
        Err(err) => {
            error!(error = %err, "Failed to resolve warden storage root");
            return ExitCode::FAILURE;
        }
    };

    match run(storage).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Warden daemon failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(storage: StorageConfig) -> Result<(), String> {
    fs::create_dir_all(storage.root())
        .map_err(|err| format!("Failed to create storage root: {}", err))?;

    let config = match load_config(&storage.config_file()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load warden config; using defaults");
            WardenConfig::default()
        }
    };

    let store = Arc::new(AuthStatusStore::open(
        Box::new(JsonFileStatusPersistence::new(storage.auth_status_file())),
        config.monitor.grace_failures,
    ));
    let caches = SessionCaches::new();

    let surface_file = Arc::new(FileSurfaceControl::new(storage.surfaces_file()));
    if let Err(err) = surface_file.reset(store.read().phase) {
        warn!(
            error = %err,
            path = %surface_file.path().display(),
            "Failed to reset surfaces file"
        );
    }
    let activator = Arc::new(SurfaceActivator::new(surface_file.clone()));

    let (check, auth_configured): (Arc<dyn AuthCheck>, bool) = match config.server_base() {
        Some(base) => {
            let check = HttpAuthCheck::new(
                base,
                config.session_cookie.clone(),
                config.monitor.request_timeout(),
            )?;
            info!(url = %check.url(), "Auth check endpoint configured");
            let check: Arc<dyn AuthCheck> = Arc::new(check);
            (check, true)
        }
        None => {
            let check: Arc<dyn AuthCheck> = Arc::new(UnconfiguredAuthCheck);
            (check, false)
        }
    };

    let monitor = Arc::new(SessionMonitor::new(
        check,
        store,
        caches.clone(),
        Arc::clone(&activator),
        &config,
    ));
    spawn_phase_publisher(Arc::clone(&monitor), Arc::clone(&surface_file));

    if auth_configured {
        let record = monitor.bootstrap().await;
        info!(
            phase = %record.phase,
            monitor_running = monitor.is_running(),
            "Session bootstrap complete"
        );
    } else {
        info!("No server_url configured; session monitor idle");
    }

    let socket_path = storage.socket_file();
    let listener = server::bind(&socket_path)?;
    info!(path = %socket_path.display(), "Warden daemon started");

    let state = Arc::new(SharedState::new(
        Arc::clone(&monitor),
        caches,
        activator,
        auth_configured,
    ));

    tokio::select! {
        _ = server::serve(listener, state) => {}
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    monitor.stop().await;
    if let Err(err) = server::remove_existing_socket(&socket_path) {
        warn!(error = %err, "Failed to remove daemon socket on shutdown");
    }
    info!("Warden daemon stopped");
    Ok(())
}

/// Mirrors every phase change into `surfaces.json` for toolbar-style readers.
fn spawn_phase_publisher(monitor: Arc<SessionMonitor>, surfaces: Arc<FileSurfaceControl>) {
    let mut transitions = monitor.subscribe();
    tokio::spawn(async move {
        loop {
            let phase = match transitions.recv().await {
                Ok(transition) => transition.current,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Phase publisher lagged; publishing current phase");
                    monitor.status().phase
                }
                Err(RecvError::Closed) => break,
            };
            if let Err(err) = surfaces.publish_phase(phase) {
                warn!(error = %err, phase = %phase, "Failed to publish session phase");
            }
        }
    });
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
            }
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
