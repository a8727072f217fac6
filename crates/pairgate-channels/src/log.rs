//! `tracing`-backed logging capability for adapters.

use pairgate_core::traits::{LogLevel, PairingLog};

/// Forwards adapter log lines to `tracing`, tagged with the adapter name.
#[derive(Debug, Clone)]
pub struct TracingLog {
    component: String,
}

impl TracingLog {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

/// Render structured fields as `key=value` pairs.
fn render_fields(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl PairingLog for TracingLog {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, &str)]) {
        let fields = render_fields(fields);
        let component = self.component.as_str();
        match level {
            LogLevel::Debug => tracing::debug!(component, %fields, "{message}"),
            LogLevel::Info => tracing::info!(component, %fields, "{message}"),
            LogLevel::Warn => tracing::warn!(component, %fields, "{message}"),
            LogLevel::Error => tracing::error!(component, %fields, "{message}"),
        }
    }
}
