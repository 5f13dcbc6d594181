//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with exactly six fractional
//! digits and a `Z` suffix, so string comparison in SQL matches time order.
//! Code status is a nullable boolean: NULL pending, 0 rejected, 1 verified.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use passcode_core::{
  code::{CodeStatus, OtpAttempt, OtpCode},
  principal::Principal,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Drop precision the column cannot hold, so values read back compare equal
/// to the ones handed out at insert time.
pub fn to_column_precision(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── CodeStatus ──────────────────────────────────────────────────────────────

pub fn encode_status(status: CodeStatus) -> Option<bool> {
  match status {
    CodeStatus::Pending => None,
    CodeStatus::Verified => Some(true),
    CodeStatus::Rejected => Some(false),
  }
}

pub fn decode_status(verified: Option<bool>) -> CodeStatus {
  verified.map_or(CodeStatus::Pending, CodeStatus::from_result)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawCode::from_row`].
pub const CODE_COLUMNS: &str =
  "id, principal_kind, principal_id, phone_number, code, verified, created_at";

/// Column list matching [`RawAttempt::from_row`].
pub const ATTEMPT_COLUMNS: &str =
  "id, principal_kind, principal_id, phone_number, submitted_code, created_at";

/// Raw values read directly from an `otp_codes` row.
pub struct RawCode {
  pub id:             i64,
  pub principal_kind: String,
  pub principal_id:   String,
  pub phone_number:   String,
  pub code:           String,
  pub verified:       Option<bool>,
  pub created_at:     String,
}

impl RawCode {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      principal_kind: row.get(1)?,
      principal_id:   row.get(2)?,
      phone_number:   row.get(3)?,
      code:           row.get(4)?,
      verified:       row.get(5)?,
      created_at:     row.get(6)?,
    })
  }

  pub fn into_code(self) -> Result<OtpCode> {
    Ok(OtpCode {
      id:           self.id,
      principal:    Principal::new(self.principal_kind, self.principal_id),
      phone_number: self.phone_number,
      code:         self.code,
      status:       decode_status(self.verified),
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `otp_attempts` row.
pub struct RawAttempt {
  pub id:             i64,
  pub principal_kind: String,
  pub principal_id:   String,
  pub phone_number:   String,
  pub submitted_code: String,
  pub created_at:     String,
}

impl RawAttempt {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      principal_kind: row.get(1)?,
      principal_id:   row.get(2)?,
      phone_number:   row.get(3)?,
      submitted_code: row.get(4)?,
      created_at:     row.get(5)?,
    })
  }

  pub fn into_attempt(self) -> Result<OtpAttempt> {
    Ok(OtpAttempt {
      id:             self.id,
      principal:      Principal::new(self.principal_kind, self.principal_id),
      phone_number:   self.phone_number,
      submitted_code: self.submitted_code,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}
