//! User-facing notifications
//!
//! Fire-and-forget messages shown to the user. Nothing is queued or retried.

use std::sync::Mutex;

/// Localized string ids used by notifications
pub const STR_VERSION_TITLE: u32 = 30050;
pub const STR_VERSION_TEXT: u32 = 30051;

/// Severity of a queued notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLevel {
    Info,
    Warning,
    Error,
}

/// Notification channel to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, level: QueueLevel, title: &str, text: &str);
}

/// Look up a localized string by id
pub fn localized(id: u32) -> &'static str {
    match id {
        STR_VERSION_TITLE => "NextPVR version",
        STR_VERSION_TEXT => "Requires NextPVR version %s or higher",
        _ => "",
    }
}

/// Fill `%s` placeholders in order
pub fn format_localized(id: u32, args: &[&str]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut parts = localized(id).split("%s").peekable();
    while let Some(part) = parts.next() {
        out.push_str(part);
        if parts.peek().is_some() {
            out.push_str(args.next().copied().unwrap_or(""));
        }
    }
    out
}

/// Send the "backend too old" notification naming `required`
pub fn notify_version_required(notifier: &dyn Notifier, required: &str) {
    notifier.notify(
        QueueLevel::Error,
        localized(STR_VERSION_TITLE),
        &format_localized(STR_VERSION_TEXT, &[required]),
    );
}

/// Notifier that routes messages to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: QueueLevel, title: &str, text: &str) {
        match level {
            QueueLevel::Info => log::info!("[{}] {}", title, text),
            QueueLevel::Warning => log::warn!("[{}] {}", title, text),
            QueueLevel::Error => log::error!("[{}] {}", title, text),
        }
    }
}

/// Notifier that keeps every message, for inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(QueueLevel, String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(QueueLevel, String, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: QueueLevel, title: &str, text: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, title.to_string(), text.to_string()));
        }
    }
}
