//! IPC protocol types and validation for warden-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_CACHE_KEY_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    GetStatus,
    GetSurfaces,
    CheckNow,
    CacheGet,
    CachePut,
    CacheInvalidate,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, id: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: Some(id.into()),
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Which entity cache a cache request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Resources,
    Folders,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Resources => "resources",
            CacheKind::Folders => "folders",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "resources" => Some(CacheKind::Resources),
            "folders" => Some(CacheKind::Folders),
            _ => None,
        }
    }
}

/// Params shared by the cache methods. Which fields are required depends on
/// the method; see the `parse_cache_*` helpers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheParams {
    pub cache: CacheKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A validated `cache_get` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    pub cache: CacheKind,
    pub key: String,
}

/// A validated `cache_put` request. `value` is still raw JSON; the daemon
/// decodes it into the cache's entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub cache: CacheKind,
    pub key: String,
    pub version: u64,
    pub value: Value,
}

/// A validated `cache_invalidate` request. Always names a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInvalidation {
    pub cache: CacheKind,
    pub key: String,
}

pub fn parse_cache_get(params: Value) -> Result<CacheLookup, ErrorInfo> {
    let params = parse_cache_params(params)?;
    let key = require_key(params.key)?;
    Ok(CacheLookup {
        cache: params.cache,
        key,
    })
}

pub fn parse_cache_put(params: Value) -> Result<CacheWrite, ErrorInfo> {
    let params = parse_cache_params(params)?;
    let key = require_key(params.key)?;
    let version = params
        .version
        .ok_or_else(|| ErrorInfo::new("missing_field", "version is required"))?;
    let value = match params.value {
        Some(value) if value.is_object() => value,
        Some(_) => {
            return Err(ErrorInfo::new(
                "invalid_params",
                "value must be a JSON object",
            ))
        }
        None => return Err(ErrorInfo::new("missing_field", "value is required")),
    };
    Ok(CacheWrite {
        cache: params.cache,
        key,
        version,
        value,
    })
}

pub fn parse_cache_invalidate(params: Value) -> Result<CacheInvalidation, ErrorInfo> {
    let params = parse_cache_params(params)?;
    let key = require_key(params.key)?;
    Ok(CacheInvalidation {
        cache: params.cache,
        key,
    })
}

fn parse_cache_params(params: Value) -> Result<CacheParams, ErrorInfo> {
    if !params.is_object() {
        return Err(ErrorInfo::new("invalid_params", "params must be an object"));
    }
    serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("cache params are invalid: {}", err),
        )
    })
}

fn require_key(key: Option<String>) -> Result<String, ErrorInfo> {
    let key = match key {
        Some(key) if !key.trim().is_empty() => key,
        _ => return Err(ErrorInfo::new("missing_field", "key is required")),
    };
    if key.len() > MAX_CACHE_KEY_LEN {
        return Err(ErrorInfo::new(
            "invalid_key",
            format!("key must be {} characters or fewer", MAX_CACHE_KEY_LEN),
        ));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_cache_get() {
        let lookup = parse_cache_get(json!({"cache": "folders", "key": "f1"})).expect("valid");
        assert_eq!(
            lookup,
            CacheLookup {
                cache: CacheKind::Folders,
                key: "f1".to_string()
            }
        );
    }

    #[test]
    fn cache_get_requires_key() {
        let err = parse_cache_get(json!({"cache": "folders"})).expect_err("missing key");
        assert_eq!(err.code, "missing_field");

        let err = parse_cache_get(json!({"cache": "folders", "key": "  "})).expect_err("blank");
        assert_eq!(err.code, "missing_field");
    }

    #[test]
    fn rejects_unknown_cache() {
        let err = parse_cache_get(json!({"cache": "users", "key": "u1"})).expect_err("bad cache");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = parse_cache_get(json!({"cache": "folders", "key": "f1", "ttl": 5}))
            .expect_err("unknown field");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn rejects_non_object_params() {
        let err = parse_cache_invalidate(json!("folders")).expect_err("not an object");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn cache_put_requires_version_and_object_value() {
        let err = parse_cache_put(json!({"cache": "resources", "key": "r1", "value": {}}))
            .expect_err("missing version");
        assert_eq!(err.code, "missing_field");

        let err = parse_cache_put(json!({
            "cache": "resources", "key": "r1", "version": 2, "value": "secret"
        }))
        .expect_err("scalar value");
        assert_eq!(err.code, "invalid_params");

        let write = parse_cache_put(json!({
            "cache": "resources", "key": "r1", "version": 2, "value": {"id": "r1"}
        }))
        .expect("valid put");
        assert_eq!(write.version, 2);
        assert_eq!(write.cache, CacheKind::Resources);
    }

    #[test]
    fn cache_invalidate_requires_key() {
        let err = parse_cache_invalidate(json!({"cache": "resources"})).expect_err("no key");
        assert_eq!(err.code, "missing_field");

        let err = parse_cache_invalidate(json!({"cache": "resources", "key": "  "}))
            .expect_err("blank key");
        assert_eq!(err.code, "missing_field");

        let single =
            parse_cache_invalidate(json!({"cache": "resources", "key": "r1"})).expect("valid");
        assert_eq!(single.key, "r1");
    }

    #[test]
    fn rejects_long_key() {
        let err = parse_cache_get(json!({"cache": "folders", "key": "k".repeat(300)}))
            .expect_err("long key");
        assert_eq!(err.code, "invalid_key");
    }

    #[test]
    fn request_round_trips_with_snake_case_method() {
        let request = Request::new(Method::CheckNow, "req-1", None);
        let encoded = serde_json::to_string(&request).expect("encode");
        assert!(encoded.contains("\"check_now\""));
        let decoded: Request = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.method, Method::CheckNow);
    }
}
