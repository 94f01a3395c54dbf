//! Request body to argument-vector decoding

use serde_json::{Map, Value};

/// Decode a raw request body into command arguments.
///
/// JSON bodies are interpreted structurally; anything that does not parse
/// as JSON is split on whitespace.
pub fn decode_body(body: &str) -> Vec<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => decode_value(&value),
        Err(_) => trimmed.split_whitespace().map(str::to_string).collect(),
    }
}

/// Decode an already-parsed JSON document
pub fn decode_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(render).collect(),
        Value::Object(map) => match map.get("method") {
            Some(method) => {
                let mut argv = vec![render(method)];
                match map.get("params") {
                    Some(Value::Array(params)) => argv.extend(params.iter().map(render)),
                    Some(Value::Object(params)) => argv.extend(keyword_args(params)),
                    Some(Value::Null) | None => {}
                    Some(scalar) => argv.push(render(scalar)),
                }
                argv
            }
            None => keyword_args(map),
        },
        scalar => vec![render(scalar)],
    }
}

/// Build the argument vector for a resource-style call
pub fn api_argv(command: String, user: &str, extra: Vec<String>, body_args: Vec<String>) -> Vec<String> {
    let mut argv = Vec::with_capacity(2 + extra.len() + body_args.len());
    argv.push(command);
    argv.push(user.to_string());
    argv.extend(extra);
    argv.extend(body_args);
    argv
}

fn keyword_args(map: &Map<String, Value>) -> Vec<String> {
    let mut argv = Vec::new();
    for (key, value) in map {
        match value {
            Value::Bool(true) => argv.push(format!("--{}", key)),
            Value::Bool(false) | Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    argv.push(format!("--{}", key));
                    argv.push(render(item));
                }
            }
            other => {
                argv.push(format!("--{}", key));
                argv.push(render(other));
            }
        }
    }
    argv
}

// Strings unquoted, nested values as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
