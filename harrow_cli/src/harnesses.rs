//! Built-in in-process harnesses, selectable with `harness-key`.

use harrow_core::Input;
use rand::Rng;
use serde_json::Value as JsonValue;
use std::thread;
use std::time::Duration;

pub type Harness = fn(&Input) -> anyhow::Result<String>;

pub const HARNESS_KEYS: &[&str] = &["processor", "greeter", "slow"];

pub fn lookup(key: &str) -> Option<Harness> {
    match key {
        "processor" => Some(processor as Harness),
        "greeter" => Some(greeter as Harness),
        "slow" => Some(slow as Harness),
        _ => None,
    }
}

/// Echoes non-empty text, rejecting anything that contains "fail".
pub fn processor(input: &Input) -> anyhow::Result<String> {
    match input.as_text() {
        Some(text) if text.contains("fail") => {
            anyhow::bail!("Intentional failure for fuzz testing")
        }
        Some(text) if !text.is_empty() => Ok(format!("Processed: {text}")),
        _ => anyhow::bail!("Invalid input"),
    }
}

/// Greets a record by its `name` field, which must be a non-empty string.
pub fn greeter(input: &Input) -> anyhow::Result<String> {
    let Some(record) = input.as_record() else {
        anyhow::bail!("Invalid JSON structure");
    };
    match record.get("name") {
        Some(JsonValue::String(name)) if !name.is_empty() => Ok(format!("Hello, {name}!")),
        Some(JsonValue::String(_)) => anyhow::bail!("Invalid name: empty string"),
        Some(JsonValue::Null) | None => anyhow::bail!("Missing name"),
        Some(other) => anyhow::bail!("Invalid name: expected a string, got {other}"),
    }
}

/// Sleeps between 100ms and 1s before answering; pair it with a timeout.
pub fn slow(input: &Input) -> anyhow::Result<String> {
    let delay = rand::rng().random_range(100..=1000);
    thread::sleep(Duration::from_millis(delay));
    Ok(format!("Slow Processed Info: {input}"))
}
