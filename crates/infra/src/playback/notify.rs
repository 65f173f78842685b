//! User-visible notifications

use tracing::warn;

/// Sink for messages the user should see, such as failed synthesis
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(target: "parley::notice", "{}", message);
    }
}
