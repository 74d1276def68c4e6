//! Logging setup and run lifecycle telemetry.

mod sink;

pub use sink::{CollectingEventSink, LoggingEventSink, NoOpEventSink, RunEventSink};

use crate::utils::iso_timestamp;
use serde_json::{json, Value};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Installs a global `tracing` subscriber.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. With `json`, records
/// are written as JSON lines.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Builds the payload of a lifecycle event: `fields` stamped with the run id
/// and the current time.
#[must_use]
pub fn run_event_payload(run_id: Uuid, fields: Value) -> Value {
    let mut payload = json!({
        "run_id": run_id.to_string(),
        "timestamp": iso_timestamp(),
    });
    if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), fields) {
        target.extend(extra);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_event_payload_merges_fields() {
        let run_id = Uuid::new_v4();
        let payload = run_event_payload(run_id, json!({"step": "collect", "duration_ms": 3}));

        assert_eq!(payload["run_id"], run_id.to_string());
        assert_eq!(payload["step"], "collect");
        assert_eq!(payload["duration_ms"], 3);
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn test_init_tracing_twice_fails() {
        let _ = init_tracing(false);
        assert!(init_tracing(true).is_err());
    }
}
