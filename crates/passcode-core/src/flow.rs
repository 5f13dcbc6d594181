//! Challenge flow: the issue/send/verify sequence callers build around the
//! generator.
//!
//! A caller describes what is being verified through [`OtpChallenge`]
//! (which phone number, and which key to record success under). The flow
//! issues or reuses a code, sends it, and on successful verification hands
//! back the namespaced key the caller should mark in its session.

use serde::Serialize;

use crate::{
  Result,
  code::OtpCode,
  generator::OtpGenerator,
  notify::{Delivery, MessageTemplate, Notifier},
  principal::Principal,
  store::OtpStore,
};

/// What a protected action needs verified.
pub trait OtpChallenge {
  fn phone_number(&self) -> &str;

  /// Identifies the protected action; combined with the configured
  /// namespace to form the session key.
  fn otp_key(&self) -> &str;
}

/// A code that was issued (or re-issued) and handed to the notifier.
#[derive(Debug, Clone, Serialize)]
pub struct Issued {
  pub code:     OtpCode,
  pub delivery: Delivery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verification {
  Verified { session_key: String },
  Rejected,
}

impl Verification {
  pub fn is_verified(&self) -> bool { matches!(self, Self::Verified { .. }) }
}

pub struct OtpFlow<S, N> {
  generator: OtpGenerator<S>,
  notifier:  N,
  template:  MessageTemplate,
}

impl<S: OtpStore, N: Notifier> OtpFlow<S, N> {
  pub fn new(
    generator: OtpGenerator<S>,
    notifier: N,
    template: MessageTemplate,
  ) -> Self {
    Self { generator, notifier, template }
  }

  pub fn generator(&self) -> &OtpGenerator<S> { &self.generator }

  pub fn notifier(&self) -> &N { &self.notifier }

  /// Obtain the active code (minting one if needed) and send it.
  ///
  /// Budget exhaustion is returned as an error and nothing is sent.
  pub async fn issue(
    &self,
    principal: &Principal,
    challenge: &impl OtpChallenge,
  ) -> Result<Issued> {
    let phone_number = challenge.phone_number();
    let code = self.generator.obtain_or_create(principal, phone_number).await?;
    let message = self.template.render(&code.code);
    let delivery = self.notifier.send(phone_number, &message).await;
    if !delivery.success {
      tracing::warn!(
        %principal,
        code_id = code.id,
        description = delivery.description.as_deref().unwrap_or(""),
        "otp delivery failed"
      );
    }
    Ok(Issued { code, delivery })
  }

  /// The code awaiting verification, without issuing or sending anything.
  pub async fn pending(
    &self,
    principal: &Principal,
    challenge: &impl OtpChallenge,
  ) -> Result<Option<OtpCode>> {
    self
      .generator
      .get_latest_active(principal, challenge.phone_number())
      .await
  }

  pub async fn verify(
    &self,
    principal: &Principal,
    challenge: &impl OtpChallenge,
    submitted_code: &str,
  ) -> Result<Verification> {
    let verified = self
      .generator
      .validate(principal, challenge.phone_number(), submitted_code)
      .await?;
    Ok(if verified {
      Verification::Verified { session_key: self.session_key(challenge) }
    } else {
      Verification::Rejected
    })
  }

  /// `<namespace>:<otp_key>`, the flag a caller sets once the challenge
  /// has been passed.
  pub fn session_key(&self, challenge: &impl OtpChallenge) -> String {
    format!("{}:{}", self.generator.config().key_namespace, challenge.otp_key())
  }
}
