//! In-memory [`OtpStore`] implementation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::{
  clock::{Clock, SystemClock},
  code::{CodeStatus, OtpAttempt, OtpCode},
  principal::Principal,
  store::{Issuance, Judgement, OtpStore, StoreError},
};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
  #[error("otp code not found: {0}")]
  CodeNotFound(i64),
}

impl StoreError for MemoryStoreError {}

#[derive(Default)]
struct Inner {
  codes:    Vec<OtpCode>,
  attempts: Vec<OtpAttempt>,
}

impl Inner {
  fn codes_for<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
  ) -> impl Iterator<Item = &'a OtpCode> {
    self
      .codes
      .iter()
      .filter(move |c| &c.principal == principal && c.phone_number == phone_number)
  }

  fn count_in_window(
    &self,
    principal: &Principal,
    phone_number: &str,
    now: DateTime<Utc>,
    window: TimeDelta,
  ) -> u64 {
    self
      .codes_for(principal, phone_number)
      .filter(|c| c.in_window(now, window))
      .count() as u64
  }

  fn active<'a>(
    &'a self,
    principal: &'a Principal,
    phone_number: &'a str,
    now: DateTime<Utc>,
    window: TimeDelta,
    include_failed: bool,
  ) -> Option<&'a OtpCode> {
    self
      .codes_for(principal, phone_number)
      .filter(|c| c.is_active(now, window, include_failed))
      .max_by_key(|c| (c.created_at, c.id))
  }

  fn push_code(
    &mut self,
    principal: &Principal,
    phone_number: &str,
    code: &str,
    created_at: DateTime<Utc>,
  ) -> OtpCode {
    let record = OtpCode {
      id: self.codes.len() as i64 + 1,
      principal: principal.clone(),
      phone_number: phone_number.to_owned(),
      code: code.to_owned(),
      status: CodeStatus::Pending,
      created_at,
    };
    self.codes.push(record.clone());
    record
  }

  fn push_attempt(
    &mut self,
    principal: &Principal,
    phone_number: &str,
    submitted_code: &str,
    created_at: DateTime<Utc>,
  ) -> OtpAttempt {
    let attempt = OtpAttempt {
      id: self.attempts.len() as i64 + 1,
      principal: principal.clone(),
      phone_number: phone_number.to_owned(),
      submitted_code: submitted_code.to_owned(),
      created_at,
    };
    self.attempts.push(attempt.clone());
    attempt
  }

  fn set_status(&mut self, code_id: i64, status: CodeStatus) -> Result<(), MemoryStoreError> {
    let code = self
      .codes
      .iter_mut()
      .find(|c| c.id == code_id)
      .ok_or(MemoryStoreError::CodeNotFound(code_id))?;
    code.status = status;
    Ok(())
  }
}

/// A process-local store. Cloning is cheap; clones share the same data.
///
/// Every method, including the units of work, runs under one mutex, so
/// clones used from separate generators stay consistent.
#[derive(Clone)]
pub struct MemoryStore {
  inner: Arc<Mutex<Inner>>,
  clock: Arc<dyn Clock>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::with_clock(SystemClock) }

  pub fn with_clock(clock: impl Clock + 'static) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner::default())),
      clock: Arc::new(clock),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for MemoryStore {
  fn default() -> Self { Self::new() }
}

impl OtpStore for MemoryStore {
  type Error = MemoryStoreError;

  async fn count_codes_in_window(
    &self,
    principal: &Principal,
    phone_number: &str,
    window: TimeDelta,
  ) -> Result<u64, MemoryStoreError> {
    let inner = self.lock();
    Ok(inner.count_in_window(principal, phone_number, self.clock.now(), window))
  }

  async fn find_active_code(
    &self,
    principal: &Principal,
    phone_number: &str,
    window: TimeDelta,
    include_failed: bool,
  ) -> Result<Option<OtpCode>, MemoryStoreError> {
    let inner = self.lock();
    let now = self.clock.now();
    Ok(inner.active(principal, phone_number, now, window, include_failed).cloned())
  }

  async fn create_code(
    &self,
    principal: &Principal,
    phone_number: &str,
    code: &str,
  ) -> Result<OtpCode, MemoryStoreError> {
    let mut inner = self.lock();
    Ok(inner.push_code(principal, phone_number, code, self.clock.now()))
  }

  async fn record_attempt(
    &self,
    principal: &Principal,
    phone_number: &str,
    submitted_code: &str,
  ) -> Result<OtpAttempt, MemoryStoreError> {
    let mut inner = self.lock();
    Ok(inner.push_attempt(principal, phone_number, submitted_code, self.clock.now()))
  }

  async fn mark_verified(
    &self,
    code_id: i64,
    verified: bool,
  ) -> Result<(), MemoryStoreError> {
    self.lock().set_status(code_id, CodeStatus::from_result(verified))
  }

  async fn issue_code(
    &self,
    principal: &Principal,
    phone_number: &str,
    window: TimeDelta,
    limit: u32,
    candidate: &str,
  ) -> Result<Issuance, MemoryStoreError> {
    let mut inner = self.lock();
    let now = self.clock.now();

    if let Some(active) = inner.active(principal, phone_number, now, window, true) {
      return Ok(Issuance::Existing(active.clone()));
    }
    let issued = inner.count_in_window(principal, phone_number, now, window);
    if issued >= u64::from(limit) {
      return Ok(Issuance::Exhausted { issued });
    }
    let code = inner.push_code(principal, phone_number, candidate, now);
    Ok(Issuance::Created { code, issued: issued + 1 })
  }

  async fn judge_attempt(
    &self,
    principal: &Principal,
    phone_number: &str,
    window: TimeDelta,
    submitted_code: &str,
  ) -> Result<Judgement, MemoryStoreError> {
    let mut inner = self.lock();
    let now = self.clock.now();

    let attempt = inner.push_attempt(principal, phone_number, submitted_code, now);
    let Some(mut code) = inner.active(principal, phone_number, now, window, true).cloned()
    else {
      return Ok(Judgement { attempt, code: None });
    };
    code.status = CodeStatus::from_result(code.code == submitted_code);
    inner.set_status(code.id, code.status)?;
    Ok(Judgement { attempt, code: Some(code) })
  }

  async fn list_codes(
    &self,
    principal: &Principal,
    phone_number: &str,
  ) -> Result<Vec<OtpCode>, MemoryStoreError> {
    let inner = self.lock();
    Ok(inner.codes_for(principal, phone_number).cloned().collect())
  }

  async fn list_attempts(
    &self,
    principal: &Principal,
    phone_number: &str,
  ) -> Result<Vec<OtpAttempt>, MemoryStoreError> {
    let inner = self.lock();
    Ok(
      inner
        .attempts
        .iter()
        .filter(|a| &a.principal == principal && a.phone_number == phone_number)
        .cloned()
        .collect(),
    )
  }
}
