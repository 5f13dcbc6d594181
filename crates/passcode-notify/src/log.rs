use passcode_core::notify::{Delivery, Notifier};

/// Logs the message instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  async fn send(&self, phone_number: &str, message: &str) -> Delivery {
    tracing::info!(phone_number, body = message, "otp message (not sent)");
    Delivery::sent(None)
  }
}
