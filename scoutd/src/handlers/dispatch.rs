use std::panic::{catch_unwind, AssertUnwindSafe};
use serde::Serialize;
use shared::names::short_service_name;
use shared::types::Device;
use crate::handlers::HandlerRegistry;

/// Result of an interaction request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NoHandler { short_type: String },
    Completed { key: String, output: String },
    Failed { key: String, message: String },
}

/// Run the matching handler's session on the blocking pool.
/// Handler errors and panics are reported as `Failed`.
pub async fn interact(registry: &HandlerRegistry, device: Device) -> Outcome {
    let Some((key, entry)) = registry.find(&device) else {
        let short_type = short_service_name(&device.service_type);
        tracing::info!("No handler for {} ({})", device.instance_name, short_type);
        return Outcome::NoHandler { short_type };
    };

    tracing::info!("Interacting with {} via {}", device.instance_name, key);
    let handler = entry.interact.clone();
    let session = tokio::task::spawn_blocking(move || {
        let mut output = Vec::new();
        let result = catch_unwind(AssertUnwindSafe(|| handler.interact(&device, &mut output)));
        (result, output)
    })
    .await;

    match session {
        Ok((Ok(Ok(())), output)) => Outcome::Completed {
            key,
            output: String::from_utf8_lossy(&output).into_owned(),
        },
        Ok((Ok(Err(e)), _)) => {
            tracing::warn!("Handler {} failed: {}", key, e);
            Outcome::Failed { key, message: e.to_string() }
        }
        Ok((Err(panic), _)) => {
            let message = panic_message(panic.as_ref());
            tracing::error!("Handler {} panicked: {}", key, message);
            Outcome::Failed { key, message }
        }
        Err(e) => {
            tracing::error!("Handler {} task failed: {}", key, e);
            Outcome::Failed { key, message: e.to_string() }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
