//! Issued codes and the append-only attempt log.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::principal::Principal;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Verification state of an issued code.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
  /// Issued, not yet judged.
  #[default]
  Pending,
  Verified,
  /// The most recent submission against this code did not match.
  Rejected,
}

impl CodeStatus {
  pub fn from_result(verified: bool) -> Self {
    if verified { Self::Verified } else { Self::Rejected }
  }

  /// Whether a code in this state can still be matched against.
  ///
  /// `Rejected` codes only qualify when `include_failed` is set.
  pub fn is_open(self, include_failed: bool) -> bool {
    match self {
      Self::Pending => true,
      Self::Rejected => include_failed,
      Self::Verified => false,
    }
  }
}

// ─── OtpCode ─────────────────────────────────────────────────────────────────

/// A generated one-time password bound to a principal and phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpCode {
  /// Store-assigned, increasing in insertion order.
  pub id:           i64,
  pub principal:    Principal,
  pub phone_number: String,
  pub code:         String,
  pub status:       CodeStatus,
  /// Store-assigned from the store's clock.
  pub created_at:   DateTime<Utc>,
}

impl OtpCode {
  /// `true` when `created_at` falls inside `[now - window, now]`.
  pub fn in_window(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
    self.created_at >= now - window && self.created_at <= now
  }

  pub fn is_active(
    &self,
    now: DateTime<Utc>,
    window: TimeDelta,
    include_failed: bool,
  ) -> bool {
    self.in_window(now, window) && self.status.is_open(include_failed)
  }
}

// ─── OtpAttempt ──────────────────────────────────────────────────────────────

/// One submitted code. Written for every validation call and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpAttempt {
  pub id:             i64,
  pub principal:      Principal,
  pub phone_number:   String,
  pub submitted_code: String,
  pub created_at:     DateTime<Utc>,
}
