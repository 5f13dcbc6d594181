//! The `OtpStore` trait.
//!
//! Implemented by storage backends (e.g. `passcode-store-sqlite`, or
//! [`MemoryStore`](crate::memory::MemoryStore)). The generator depends on this
//! abstraction only; it holds no state of its own beyond per-key locks.
//!
//! Those locks only serialise callers inside one process. Issuance and
//! validation each go through a single store call ([`OtpStore::issue_code`],
//! [`OtpStore::judge_attempt`]) so a backend shared between processes can run
//! the whole read-decide-write in one transaction.

use std::{convert::Infallible, future::Future};

use chrono::TimeDelta;

use crate::{
  code::{CodeStatus, OtpAttempt, OtpCode},
  principal::Principal,
};

// ─── Unit-of-work outcomes ───────────────────────────────────────────────────

/// Result of [`OtpStore::issue_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issuance {
  /// A code was already active; nothing was written.
  Existing(OtpCode),
  /// The candidate was stored. `issued` counts it.
  Created { code: OtpCode, issued: u64 },
  /// Nothing active and the window's budget is spent; nothing was written.
  Exhausted { issued: u64 },
}

/// Result of [`OtpStore::judge_attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
  pub attempt: OtpAttempt,
  /// The code the attempt was judged against, with its updated status.
  /// `None` when no code was active.
  pub code:    Option<OtpCode>,
}

impl Judgement {
  pub fn is_verified(&self) -> bool {
    self.code.as_ref().is_some_and(|c| c.status == CodeStatus::Verified)
  }
}

// ─── Error extension ─────────────────────────────────────────────────────────

/// Backend errors the generator needs to tell apart.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// `true` when a write lost a uniqueness race against a concurrent writer.
  /// The generator re-reads and returns the winning row instead of failing.
  fn is_conflict(&self) -> bool { false }
}

impl StoreError for Infallible {}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Durable record of issued codes and submitted attempts, scoped by
/// `(principal, phone_number)`.
///
/// "Now" is the store's own clock. A window covers
/// `[now - window, now]`, inclusive at both ends.
///
/// Attempts are append-only. Codes are only ever updated through
/// [`OtpStore::mark_verified`]; nothing is deleted.
pub trait OtpStore: Send + Sync {
  type Error: StoreError;

  /// Number of codes created inside the window, whatever their status.
  fn count_codes_in_window<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
    window: TimeDelta,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// The latest code inside the window that can still be matched against.
  ///
  /// Pending codes always qualify; rejected codes qualify only when
  /// `include_failed` is set. Latest means greatest `created_at`, ties broken
  /// by greatest id.
  fn find_active_code<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
    window: TimeDelta,
    include_failed: bool,
  ) -> impl Future<Output = Result<Option<OtpCode>, Self::Error>> + Send + 'a;

  /// Persist a freshly generated code in the pending state.
  fn create_code<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
    code: &'a str,
  ) -> impl Future<Output = Result<OtpCode, Self::Error>> + Send + 'a;

  /// Append one attempt to the audit log.
  fn record_attempt<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
    submitted_code: &'a str,
  ) -> impl Future<Output = Result<OtpAttempt, Self::Error>> + Send + 'a;

  /// Record the outcome of a validation against `code_id`.
  fn mark_verified(
    &self,
    code_id: i64,
    verified: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Units of work ─────────────────────────────────────────────────────

  /// Return the active code (pending or rejected) for the key or, if there
  /// is none and fewer than `limit` codes were created in the window, store
  /// `candidate` as a new pending code.
  ///
  /// The default composes the single-step methods and is only atomic under
  /// the caller's lock. Backends reachable from more than one process must
  /// override it to run as one transaction.
  fn issue_code<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
    window: TimeDelta,
    limit: u32,
    candidate: &'a str,
  ) -> impl Future<Output = Result<Issuance, Self::Error>> + Send + 'a {
    async move {
      if let Some(active) = self
        .find_active_code(principal, phone_number, window, true)
        .await?
      {
        return Ok(Issuance::Existing(active));
      }
      let issued = self
        .count_codes_in_window(principal, phone_number, window)
        .await?;
      if issued >= u64::from(limit) {
        return Ok(Issuance::Exhausted { issued });
      }
      let code = self.create_code(principal, phone_number, candidate).await?;
      Ok(Issuance::Created { code, issued: issued + 1 })
    }
  }

  /// Append the attempt, then judge it against the active code (pending or
  /// rejected): an exact match marks it verified, anything else rejected.
  ///
  /// Same atomicity contract as [`OtpStore::issue_code`].
  fn judge_attempt<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
    window: TimeDelta,
    submitted_code: &'a str,
  ) -> impl Future<Output = Result<Judgement, Self::Error>> + Send + 'a {
    async move {
      let attempt = self
        .record_attempt(principal, phone_number, submitted_code)
        .await?;
      let Some(mut code) = self
        .find_active_code(principal, phone_number, window, true)
        .await?
      else {
        return Ok(Judgement { attempt, code: None });
      };
      let verified = code.code == submitted_code;
      self.mark_verified(code.id, verified).await?;
      code.status = CodeStatus::from_result(verified);
      Ok(Judgement { attempt, code: Some(code) })
    }
  }

  // ── History ───────────────────────────────────────────────────────────

  /// Every code ever issued for the key, oldest first.
  fn list_codes<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
  ) -> impl Future<Output = Result<Vec<OtpCode>, Self::Error>> + Send + 'a;

  /// Every attempt ever recorded for the key, oldest first.
  fn list_attempts<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
  ) -> impl Future<Output = Result<Vec<OtpAttempt>, Self::Error>> + Send + 'a;
}
