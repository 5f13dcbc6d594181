//! [`OtpGenerator`]: issuance and verification of one-time passwords.
//!
//! For each `(principal, phone_number)` key:
//!
//! - at most one code is active at a time; asking again while one is active
//!   returns that same code,
//! - at most `max_codes_per_window` distinct codes are minted per window,
//! - every submission is written to the attempt log before it is judged.
//!
//! Each call holds the key's in-process lock and hands its read-decide-write
//! sequence to the store as one unit of work ([`OtpStore::issue_code`],
//! [`OtpStore::judge_attempt`]). A durable backend runs that unit in a
//! transaction, so issuers in other processes sharing the store never both
//! observe "no active code" either.

use rand::Rng;

use crate::{
  Error, Result,
  code::OtpCode,
  config::OtpConfig,
  locks::KeyedLocks,
  principal::Principal,
  store::{Issuance, OtpStore, StoreError},
};

/// Uniformly random decimal code of exactly `length` digits, no leading zero.
pub fn generate_code(length: u8) -> String {
  let length = u32::from(length.clamp(1, OtpConfig::MAX_CODE_LENGTH));
  let low = 10_u64.pow(length - 1);
  let high = 10_u64.pow(length) - 1;
  rand::rng().random_range(low..=high).to_string()
}

pub struct OtpGenerator<S> {
  store:  S,
  config: OtpConfig,
  locks:  KeyedLocks<(Principal, String)>,
}

impl<S: OtpStore> OtpGenerator<S> {
  pub fn new(store: S, config: OtpConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { store, config, locks: KeyedLocks::new() })
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &OtpConfig { &self.config }

  /// Return the active code for the key, or mint a new one if the budget
  /// allows.
  ///
  /// A code that already failed a verification is still active and is
  /// returned as-is; the caller is expected to resend it.
  pub async fn obtain_or_create(
    &self,
    principal: &Principal,
    phone_number: &str,
  ) -> Result<OtpCode> {
    if phone_number.is_empty() {
      return Err(Error::InvalidPhoneNumber);
    }

    let _guard = self
      .locks
      .lock((principal.clone(), phone_number.to_owned()))
      .await;

    let window = self.config.validity_window();
    let limit = self.config.max_codes_per_window;
    let candidate = generate_code(self.config.code_length);
    let issuance = self
      .store
      .issue_code(principal, phone_number, window, limit, &candidate)
      .await;

    match issuance {
      Ok(Issuance::Existing(active)) => {
        tracing::debug!(%principal, code_id = active.id, "reusing active otp");
        Ok(active)
      }
      Ok(Issuance::Created { code, issued }) => {
        tracing::info!(%principal, code_id = code.id, issued, "issued otp");
        Ok(code)
      }
      Ok(Issuance::Exhausted { issued }) => {
        tracing::warn!(%principal, issued, limit, "otp generation limit reached");
        Err(Error::GenerationLimitReached {
          limit,
          window_secs: self.config.validity_window_secs,
        })
      }
      Err(e) if e.is_conflict() => {
        tracing::debug!(%principal, "otp insert conflicted, re-reading winner");
        self
          .find_active(principal, phone_number)
          .await?
          .ok_or_else(|| Error::store(e))
      }
      Err(e) => Err(Error::store(e)),
    }
  }

  /// The code a pending verification would be checked against, if any.
  /// Never creates a code.
  pub async fn get_latest_active(
    &self,
    principal: &Principal,
    phone_number: &str,
  ) -> Result<Option<OtpCode>> {
    if phone_number.is_empty() {
      return Err(Error::InvalidPhoneNumber);
    }
    self.find_active(principal, phone_number).await
  }

  /// Check `submitted_code` against the active code for the key.
  ///
  /// The attempt is recorded first, unconditionally. Returns `false` when no
  /// code is active. A mismatch marks the code rejected but leaves it
  /// active, so a later correct submission still verifies.
  pub async fn validate(
    &self,
    principal: &Principal,
    phone_number: &str,
    submitted_code: &str,
  ) -> Result<bool> {
    let _guard = self
      .locks
      .lock((principal.clone(), phone_number.to_owned()))
      .await;

    let judgement = self
      .store
      .judge_attempt(
        principal,
        phone_number,
        self.config.validity_window(),
        submitted_code,
      )
      .await
      .map_err(Error::store)?;
    tracing::debug!(%principal, attempt_id = judgement.attempt.id, "recorded otp attempt");

    let verified = judgement.is_verified();
    match &judgement.code {
      Some(code) => tracing::info!(%principal, code_id = code.id, verified, "validated otp"),
      None => tracing::debug!(%principal, "no active otp to validate against"),
    }
    Ok(verified)
  }

  async fn find_active(
    &self,
    principal: &Principal,
    phone_number: &str,
  ) -> Result<Option<OtpCode>> {
    self
      .store
      .find_active_code(principal, phone_number, self.config.validity_window(), true)
      .await
      .map_err(Error::store)
  }
}
