//! Socket listener and request dispatch.
//!
//! One request per connection: the client writes a single JSON line, the
//! daemon answers with a single JSON line and closes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fs_err as fs;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};
use warden_core::PutOutcome;
use warden_daemon_protocol::{
    parse_cache_get, parse_cache_invalidate, parse_cache_put, ErrorInfo, Method, Request,
    Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

use crate::state::SharedState;

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

pub fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

pub fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

pub fn bind(socket_path: &Path) -> Result<UnixListener, String> {
    prepare_socket_dir(socket_path)?;
    remove_existing_socket(socket_path)?;
    UnixListener::bind(socket_path).map_err(|err| format!("Failed to bind daemon socket: {}", err))
}

/// Accepts connections until the task is dropped.
pub async fn serve(listener: UnixListener, state: Arc<SharedState>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, state: Arc<SharedState>) {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response).await;
            return;
        }
    };

    debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state).await;
    let _ = write_response(&mut stream, response).await;
}

async fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let buffer = tokio::time::timeout(
        Duration::from_secs(READ_TIMEOUT_SECS),
        read_request_bytes(stream),
    )
    .await
    .map_err(|_| ErrorInfo::new("read_timeout", "request timed out"))??;

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => {
            if buffer.len() > index + 1 {
                let trailing = &buffer[index + 1..];
                if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!("Extra bytes detected after newline; ignoring trailing data");
                }
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

async fn read_request_bytes(stream: &mut UnixStream) -> Result<Vec<u8>, ErrorInfo> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    Ok(buffer)
}

pub async fn handle_request(request: Request, state: &SharedState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => {
            let status = state.status_snapshot();
            let data = json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "started_at": state.started_at(),
                "phase": status.record.phase,
                "monitor_running": status.monitor_running,
                "auth_configured": status.auth_configured,
                "caches": state.cache_stats(),
            });
            Response::ok(request.id, data)
        }
        Method::GetStatus => match serde_json::to_value(state.status_snapshot()) {
            Ok(value) => Response::ok(request.id, value),
            Err(err) => Response::error(
                request.id,
                "serialization_error",
                format!("Failed to serialize status: {}", err),
            ),
        },
        Method::GetSurfaces => {
            let active = state.active_surfaces().await;
            Response::ok(request.id, json!({ "active": active }))
        }
        Method::CheckNow => match state.check_now().await {
            Some(record) => {
                info!(phase = %record.phase, "Manual auth check completed");
                match serde_json::to_value(record) {
                    Ok(value) => Response::ok(request.id, value),
                    Err(err) => Response::error(
                        request.id,
                        "serialization_error",
                        format!("Failed to serialize status: {}", err),
                    ),
                }
            }
            None => Response::error(
                request.id,
                "not_configured",
                "server_url is not configured",
            ),
        },
        Method::CacheGet => {
            let lookup = match request.params.map(parse_cache_get) {
                Some(Ok(lookup)) => lookup,
                Some(Err(err)) => return Response::error_with_info(request.id, err),
                None => return missing_params(request.id),
            };
            match state.cache_get(&lookup) {
                Ok(Some(entry)) => {
                    Response::ok(request.id, json!({ "found": true, "entry": entry }))
                }
                Ok(None) => Response::ok(request.id, json!({ "found": false })),
                Err(err) => Response::error_with_info(request.id, err),
            }
        }
        Method::CachePut => {
            let write = match request.params.map(parse_cache_put) {
                Some(Ok(write)) => write,
                Some(Err(err)) => return Response::error_with_info(request.id, err),
                None => return missing_params(request.id),
            };
            let cache = write.cache;
            let key = write.key.clone();
            match state.cache_put(write) {
                Ok(PutOutcome::Stored) => Response::ok(request.id, json!({ "stored": true })),
                Ok(PutOutcome::Stale { stored_version }) => {
                    debug!(
                        cache = cache.as_str(),
                        key = %key,
                        stored_version,
                        "Stale cache write dropped"
                    );
                    Response::ok(
                        request.id,
                        json!({ "stored": false, "stored_version": stored_version }),
                    )
                }
                Err(err) => Response::error_with_info(request.id, err),
            }
        }
        Method::CacheInvalidate => {
            let invalidation = match request.params.map(parse_cache_invalidate) {
                Some(Ok(invalidation)) => invalidation,
                Some(Err(err)) => return Response::error_with_info(request.id, err),
                None => return missing_params(request.id),
            };
            let removed = state.cache_invalidate(&invalidation);
            debug!(
                cache = invalidation.cache.as_str(),
                key = %invalidation.key,
                removed,
                "Cache entry invalidated"
            );
            Response::ok(request.id, json!({ "removed": usize::from(removed) }))
        }
    }
}

fn missing_params(id: Option<String>) -> Response {
    Response::error(id, "invalid_params", "params are required")
}

async fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(&response)?;
    payload.push(b'\n');
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}
