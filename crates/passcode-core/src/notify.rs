//! Delivery of rendered codes to the phone number's owner.
//!
//! The generator never sends anything itself. [`OtpFlow`](crate::flow::OtpFlow)
//! renders a [`MessageTemplate`] and hands it to a [`Notifier`]; concrete
//! notifiers live in `passcode-notify`.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Delivery ────────────────────────────────────────────────────────────────

/// Outcome reported by a notifier. A failed delivery is data, not an error:
/// the code stays issued and can be resent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
  pub success:     bool,
  /// Provider-supplied reason when `success` is false.
  pub description: Option<String>,
  /// Provider-side message id, when there is one.
  pub reference:   Option<String>,
}

impl Delivery {
  pub fn sent(reference: Option<String>) -> Self {
    Self { success: true, description: None, reference }
  }

  pub fn failed(description: impl Into<String>) -> Self {
    Self { success: false, description: Some(description.into()), reference: None }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

pub trait Notifier: Send + Sync {
  fn send<'a>(
    &'a self,
    phone_number: &'a str,
    message: &'a str,
  ) -> impl Future<Output = Delivery> + Send + 'a;
}

// ─── Template ────────────────────────────────────────────────────────────────

/// A message body with a `{{otp}}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
  body: String,
}

impl MessageTemplate {
  pub const DEFAULT: &'static str = "Your verification code is {{otp}}";

  pub fn new(body: impl Into<String>) -> Result<Self> {
    let body = body.into();
    if placeholder(&body).is_none() {
      return Err(Error::InvalidTemplate(format!(
        "missing {{{{otp}}}} placeholder in {body:?}"
      )));
    }
    Ok(Self { body })
  }

  pub fn body(&self) -> &str { &self.body }

  /// Substitute every placeholder with `code`.
  pub fn render(&self, code: &str) -> String {
    let mut out = String::with_capacity(self.body.len() + code.len());
    let mut rest = self.body.as_str();
    while let Some((start, end)) = placeholder(rest) {
      out.push_str(&rest[..start]);
      out.push_str(code);
      rest = &rest[end..];
    }
    out.push_str(rest);
    out
  }
}

impl Default for MessageTemplate {
  fn default() -> Self { Self { body: Self::DEFAULT.to_owned() } }
}

/// Byte range of the first `{{ otp }}` placeholder, whitespace inside the
/// braces allowed.
fn placeholder(s: &str) -> Option<(usize, usize)> {
  let mut from = 0;
  while let Some(open) = s[from..].find("{{").map(|i| from + i) {
    let inner_start = open + 2;
    let close = s[inner_start..].find("}}").map(|i| inner_start + i)?;
    if s[inner_start..close].trim() == "otp" {
      return Some((open, close + 2));
    }
    from = inner_start;
  }
  None
}
