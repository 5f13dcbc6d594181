//! SMS delivery through the Twilio Messages API.

use std::time::Duration;

use passcode_core::notify::{Delivery, Notifier};
use reqwest::Client;
use serde::Deserialize;

use crate::{Error, Result};

/// Credentials and sender for the Twilio Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
  pub account_sid: String,
  pub auth_token:  String,
  /// Sender number, E.164.
  pub from:        String,
  #[serde(default = "TwilioConfig::default_api_base")]
  pub api_base:    String,
}

impl TwilioConfig {
  pub const DEFAULT_API_BASE: &'static str = "https://api.twilio.com";

  fn default_api_base() -> String { Self::DEFAULT_API_BASE.to_owned() }
}

/// The fields of a Messages API response body that we use. Success bodies
/// carry `sid`; error bodies carry `message`.
#[derive(Debug, Default, Deserialize)]
struct MessageResponse {
  sid:     Option<String>,
  message: Option<String>,
}

/// Sends each message as an SMS via Twilio.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct TwilioNotifier {
  client: Client,
  config: TwilioConfig,
}

impl TwilioNotifier {
  pub fn new(config: TwilioConfig) -> Result<Self> {
    for (field, value) in [
      ("account_sid", &config.account_sid),
      ("auth_token", &config.auth_token),
      ("from", &config.from),
    ] {
      if value.trim().is_empty() {
        return Err(Error::InvalidConfig(format!("twilio {field} is empty")));
      }
    }

    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, config })
  }

  fn messages_url(&self) -> String {
    format!(
      "{}/2010-04-01/Accounts/{}/Messages.json",
      self.config.api_base.trim_end_matches('/'),
      self.config.account_sid
    )
  }
}

impl Notifier for TwilioNotifier {
  async fn send(&self, phone_number: &str, message: &str) -> Delivery {
    let result = self
      .client
      .post(self.messages_url())
      .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
      .form(&[
        ("To", phone_number),
        ("From", self.config.from.as_str()),
        ("Body", message),
      ])
      .send()
      .await;

    let resp = match result {
      Ok(resp) => resp,
      Err(e) => {
        tracing::error!(phone_number, error = %e, "twilio request failed");
        return Delivery::failed(e.to_string());
      }
    };

    let status = resp.status();
    let body = resp.json::<MessageResponse>().await.unwrap_or_default();

    if status.is_success() {
      tracing::debug!(phone_number, sid = body.sid.as_deref(), "twilio accepted message");
      return Delivery::sent(body.sid);
    }

    let description = body
      .message
      .unwrap_or_else(|| format!("twilio returned {status}"));
    tracing::error!(
      phone_number,
      status = status.as_u16(),
      description = %description,
      "communication backend returned unexpected error"
    );
    Delivery::failed(description)
  }
}
