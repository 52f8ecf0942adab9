//! Built-in reminder listeners.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use waymark_scheduler::{ListenerRegistry, ReminderEvent, ReminderListener, ReminderTrigger};

/// Emits a tracing event per fired reminder.
pub struct LogListener;

#[async_trait]
impl ReminderListener for LogListener {
    async fn on_reminder(&self, event: &ReminderEvent) {
        info!(
            id = %event.id,
            when = %describe(&event.trigger),
            params = %event.params,
            "reminder fired"
        );
    }
}

/// Prints one line per fired reminder to stdout.
pub struct PrintListener;

#[async_trait]
impl ReminderListener for PrintListener {
    async fn on_reminder(&self, event: &ReminderEvent) {
        println!("{}", format_event(event));
    }
}

/// Registry with the built-in `log` and `print` listeners.
pub fn builtin() -> ListenerRegistry {
    ListenerRegistry::new()
        .with("log", Arc::new(LogListener))
        .with("print", Arc::new(PrintListener))
}

fn describe(trigger: &ReminderTrigger) -> String {
    match trigger {
        ReminderTrigger::Time { day, time } => format!("{day} {time}"),
        ReminderTrigger::Location { day, place } => {
            format!("{day} at {} ({})", place.address, place.coordinates)
        }
        ReminderTrigger::TimeLocation { day, time, place } => {
            format!("{day} {time} at {} ({})", place.address, place.coordinates)
        }
    }
}

fn format_event(event: &ReminderEvent) -> String {
    let mut line = format!("[{}] {}", event.id, describe(&event.trigger));
    if let Some(note) = event.params.get("note").and_then(|v| v.as_str()) {
        line.push_str(": ");
        line.push_str(note);
    }
    line
}
