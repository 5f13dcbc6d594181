//! The notifier selected by `[notifier] backend`, and the challenge the CLI
//! verifies.

use anyhow::{Context as _, Result};
use passcode_core::{
  flow::OtpChallenge,
  notify::{Delivery, Notifier},
};
use passcode_notify::{LogNotifier, TwilioNotifier};

use crate::settings::{BackendKind, NotifierSettings};

pub enum Backend {
  Log(LogNotifier),
  Twilio(TwilioNotifier),
}

impl Backend {
  pub fn from_settings(settings: &NotifierSettings) -> Result<Self> {
    Ok(match settings.backend {
      BackendKind::Log => Self::Log(LogNotifier),
      BackendKind::Twilio => {
        let twilio = settings
          .twilio
          .clone()
          .context("backend = \"twilio\" requires a [notifier.twilio] section")?;
        Self::Twilio(TwilioNotifier::new(twilio).context("failed to set up twilio notifier")?)
      }
    })
  }
}

impl Notifier for Backend {
  async fn send(&self, phone_number: &str, message: &str) -> Delivery {
    match self {
      Self::Log(n) => n.send(phone_number, message).await,
      Self::Twilio(n) => n.send(phone_number, message).await,
    }
  }
}

/// Verification of a phone number, keyed by `--key`.
pub struct PhoneChallenge {
  pub phone_number: String,
  pub otp_key:      String,
}

impl OtpChallenge for PhoneChallenge {
  fn phone_number(&self) -> &str { &self.phone_number }

  fn otp_key(&self) -> &str { &self.otp_key }
}
