//! Observability for formguard
//!
//! Lifecycle events of a validation pass, emitted through `tracing`.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on validation outcomes
//! 3. Events are typed; their names are stable
//!
//! Subscribers are installed by the host application.

mod events;

pub use events::Event;

use tracing::Level;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Fields are rendered in the order given as `key=value` pairs.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let rendered = render_fields(fields);
    let name = event.as_str();
    match event.level() {
        Level::ERROR => tracing::error!(event = name, fields = %rendered),
        Level::WARN => tracing::warn!(event = name, fields = %rendered),
        Level::INFO => tracing::info!(event = name, fields = %rendered),
        Level::DEBUG => tracing::debug!(event = name, fields = %rendered),
        _ => tracing::trace!(event = name, fields = %rendered),
    }
}

fn render_fields(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fields() {
        assert_eq!(render_fields(&[]), "");
        assert_eq!(render_fields(&[("form", "f1"), ("key", "ssn")]), "form=f1 key=ssn");
    }

    #[test]
    fn test_log_event() {
        // This just verifies no panic
        log_event(Event::ValidationBegin);
        log_event_with_fields(Event::UniqueConflict, &[("key", "ssn")]);
    }
}
