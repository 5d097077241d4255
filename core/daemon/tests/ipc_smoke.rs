mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use warden_daemon_protocol::Method;

use common::*;

fn read_surfaces_file(home: &std::path::Path) -> Value {
    let content = std::fs::read_to_string(warden_dir(home).join("surfaces.json"))
        .expect("read surfaces.json");
    serde_json::from_str(&content).expect("parse surfaces.json")
}

#[test]
fn daemon_without_server_serves_status_and_caches() {
    let home = temp_home("warden-daemon-smoke");
    if !can_bind_socket(home.path()) {
        eprintln!("Skipping smoke test: unix socket binding not permitted in this environment.");
        return;
    }

    let socket = socket_path(home.path());
    let _guard = spawn_daemon(home.path());
    wait_for_socket(&socket, Duration::from_secs(5));

    let health = send_request(&socket, request(Method::GetHealth, None));
    assert_eq!(data(&health)["status"], "ok");
    assert_eq!(data(&health)["auth_configured"], false);

    let status = send_request(&socket, request(Method::GetStatus, None));
    assert_eq!(data(&status)["phase"], "unknown");
    assert_eq!(data(&status)["monitor_running"], false);

    let check = send_request(&socket, request(Method::CheckNow, None));
    assert!(!check.ok);
    assert_eq!(error_code(&check), Some("not_configured"));

    let surfaces = send_request(&socket, request(Method::GetSurfaces, None));
    assert_eq!(data(&surfaces)["active"], json!([]));

    let put = send_request(
        &socket,
        request(
            Method::CachePut,
            Some(json!({
                "cache": "resources",
                "key": "r1",
                "version": 5,
                "value": {"id": "r1", "name": "mail", "username": "ada"}
            })),
        ),
    );
    assert_eq!(data(&put)["stored"], true);

    let stale = send_request(
        &socket,
        request(
            Method::CachePut,
            Some(json!({
                "cache": "resources",
                "key": "r1",
                "version": 4,
                "value": {"id": "r1", "name": "mail (old)"}
            })),
        ),
    );
    assert_eq!(data(&stale)["stored"], false);
    assert_eq!(data(&stale)["stored_version"], 5);

    let get = send_request(
        &socket,
        request(Method::CacheGet, Some(json!({"cache": "resources", "key": "r1"}))),
    );
    assert_eq!(data(&get)["found"], true);
    assert_eq!(data(&get)["entry"]["value"]["name"], "mail");
    assert_eq!(data(&get)["entry"]["version"], 5);

    let invalidate = send_request(
        &socket,
        request(
            Method::CacheInvalidate,
            Some(json!({"cache": "resources", "key": "r1"})),
        ),
    );
    assert_eq!(data(&invalidate)["removed"], 1);

    let missing = send_request(
        &socket,
        request(Method::CacheGet, Some(json!({"cache": "resources", "key": "r1"}))),
    );
    assert_eq!(data(&missing)["found"], false);
}

#[test]
fn daemon_tracks_session_against_auth_server() {
    let home = temp_home("warden-daemon-session");
    if !can_bind_socket(home.path()) {
        eprintln!("Skipping session test: unix socket binding not permitted in this environment.");
        return;
    }

    let authenticated = Arc::new(AtomicBool::new(true));
    let server_url = spawn_auth_server(Arc::clone(&authenticated));
    write_config(
        home.path(),
        &format!(
            "server_url = \"{}\"\n\n[monitor]\ncheck_interval_ms = 60000\n",
            server_url
        ),
    );

    let socket = socket_path(home.path());
    let _guard = spawn_daemon(home.path());
    wait_for_socket(&socket, Duration::from_secs(5));

    let status = send_request(&socket, request(Method::GetStatus, None));
    assert_eq!(data(&status)["phase"], "authenticated");
    assert_eq!(data(&status)["monitor_running"], true);
    assert_eq!(data(&status)["consecutive_failures"], 0);

    let surfaces = send_request(&socket, request(Method::GetSurfaces, None));
    assert_eq!(data(&surfaces)["active"], json!(["app"]));
    assert_eq!(read_surfaces_file(home.path())["active"], json!(["app"]));

    let put = send_request(
        &socket,
        request(
            Method::CachePut,
            Some(json!({
                "cache": "folders",
                "key": "f1",
                "version": 1,
                "value": {"id": "f1", "name": "Shared"}
            })),
        ),
    );
    assert_eq!(data(&put)["stored"], true);

    authenticated.store(false, Ordering::SeqCst);
    let check = send_request(&socket, request(Method::CheckNow, None));
    assert_eq!(data(&check)["phase"], "expired");

    let get = send_request(
        &socket,
        request(Method::CacheGet, Some(json!({"cache": "folders", "key": "f1"}))),
    );
    assert_eq!(data(&get)["found"], false);

    let surfaces = send_request(&socket, request(Method::GetSurfaces, None));
    assert_eq!(data(&surfaces)["active"], json!(["login"]));

    let published = wait_until(Duration::from_secs(2), || {
        read_surfaces_file(home.path())["phase"] == "expired"
    });
    assert!(published, "surfaces.json should carry the expired phase");

    let persisted = std::fs::read_to_string(warden_dir(home.path()).join("auth-status.json"))
        .expect("read auth-status.json");
    assert!(persisted.contains("\"expired\""));
}
