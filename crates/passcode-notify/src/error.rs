use thiserror::Error;

/// Failures while constructing a notifier. Send failures are reported as a
/// [`Delivery`](passcode_core::notify::Delivery), not as errors.
#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid notifier configuration: {0}")]
  InvalidConfig(String),

  #[error("http client error: {0}")]
  Http(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
