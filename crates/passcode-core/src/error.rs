//! Error types for `passcode-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Issuance was requested without a phone number.
  #[error("phone number is missing")]
  InvalidPhoneNumber,

  /// Every code allowed for this principal and phone number inside the
  /// validity window has already been issued. Recoverable once the oldest
  /// code falls out of the window.
  #[error("otp limit exceeded: {limit} codes per {window_secs}s window")]
  GenerationLimitReached { limit: u32, window_secs: u64 },

  #[error("invalid otp configuration: {0}")]
  InvalidConfig(String),

  #[error("invalid message template: {0}")]
  InvalidTemplate(String),

  #[error("invalid principal {0:?}: expected `kind:id`")]
  InvalidPrincipal(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
