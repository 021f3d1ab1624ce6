//! Shared CLI helpers: environment bootstrap, param parsing, and the
//! `{ success, ... }` JSON envelope every command prints (spec §7).

use komposer_config::Config;
use komposer_core::Error;
use std::collections::HashMap;
use std::path::Path;

/// Builds the active configuration from the environment, layering an
/// optional `komposer.toml` overlay on top.
pub fn load_config(overlay_path: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::from_env()?;
    match overlay_path {
        Some(path) => Ok(config.with_overlay_file(path)?),
        None => Ok(config),
    }
}

/// Parses `process_file`'s whitespace-separated `k=v` params string (spec
/// §6 `process_file`).
pub fn parse_params(raw: &str) -> Result<HashMap<String, String>, Error> {
    let mut map = HashMap::new();
    for token in raw.split_whitespace() {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| Error::validation(format!("malformed param token '{token}' (expected k=v)")))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

/// Prints a successful result: `body` must be a JSON object, which gets
/// `"success": true` merged in and is written to stdout as one line.
pub fn emit_ok(mut body: serde_json::Value) {
    if let serde_json::Value::Object(map) = &mut body {
        map.insert("success".to_string(), serde_json::Value::Bool(true));
    }
    println!("{body}");
}

/// Prints a failure envelope for `error` (spec §7: `{success: false,
/// error_kind, message}`).
pub fn emit_err(error: &Error) {
    let body = serde_json::json!({
        "success": false,
        "error_kind": error.kind(),
        "message": error.to_string(),
    });
    println!("{body}");
}

/// Runs `f`, printing either the success or failure envelope.
pub fn respond(result: Result<serde_json::Value, Error>) {
    match result {
        Ok(body) => emit_ok(body),
        Err(error) => emit_err(&error),
    }
}
