//! [`Notifier`](passcode_core::notify::Notifier) implementations.
//!
//! - [`LogNotifier`] writes the rendered message to the log; for development.
//! - [`TwilioNotifier`] sends an SMS through the Twilio Messages API.

pub mod error;
mod log;
mod twilio;

pub use error::{Error, Result};
pub use log::LogNotifier;
pub use twilio::{TwilioConfig, TwilioNotifier};
