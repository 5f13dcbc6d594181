//! Error type for `passcode-store-sqlite`.

use passcode_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("otp code not found: {0}")]
  CodeNotFound(i64),
}

impl StoreError for Error {
  fn is_conflict(&self) -> bool {
    matches!(
      self,
      Self::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _)
      )) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
