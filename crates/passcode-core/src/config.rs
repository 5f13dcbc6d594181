//! Issuance policy.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Policy applied by [`OtpGenerator`](crate::generator::OtpGenerator).
/// Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
  /// Number of digits in a generated code.
  pub code_length:          u8,
  /// How long a code stays usable, and the span over which
  /// `max_codes_per_window` is counted.
  pub validity_window_secs: u64,
  /// Distinct codes that may be issued per principal and phone number
  /// inside one window.
  pub max_codes_per_window: u32,
  /// Prefix for the session flag set after a successful verification.
  pub key_namespace:        String,
}

impl Default for OtpConfig {
  fn default() -> Self {
    Self {
      code_length:          6,
      validity_window_secs: 15 * 60,
      max_codes_per_window: 3,
      key_namespace:        "OTPKEY".to_owned(),
    }
  }
}

impl OtpConfig {
  pub const MAX_CODE_LENGTH: u8 = 18;

  pub fn validate(&self) -> Result<()> {
    if !(1..=Self::MAX_CODE_LENGTH).contains(&self.code_length) {
      return Err(Error::InvalidConfig(format!(
        "code_length must be between 1 and {}, got {}",
        Self::MAX_CODE_LENGTH,
        self.code_length
      )));
    }
    if self.validity_window_secs == 0 {
      return Err(Error::InvalidConfig(
        "validity_window_secs must be positive".to_owned(),
      ));
    }
    if window_from_secs(self.validity_window_secs).is_none() {
      return Err(Error::InvalidConfig(format!(
        "validity_window_secs out of range: {}",
        self.validity_window_secs
      )));
    }
    if self.max_codes_per_window == 0 {
      return Err(Error::InvalidConfig(
        "max_codes_per_window must be positive".to_owned(),
      ));
    }
    Ok(())
  }

  /// The validity window. Only meaningful once [`OtpConfig::validate`] has
  /// passed; out-of-range values saturate.
  pub fn validity_window(&self) -> TimeDelta {
    window_from_secs(self.validity_window_secs).unwrap_or(TimeDelta::MAX)
  }
}

fn window_from_secs(secs: u64) -> Option<TimeDelta> {
  i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_policy() {
    let cfg = OtpConfig::default();
    assert_eq!(cfg.code_length, 6);
    assert_eq!(cfg.validity_window(), TimeDelta::seconds(900));
    assert_eq!(cfg.max_codes_per_window, 3);
    assert_eq!(cfg.key_namespace, "OTPKEY");
    cfg.validate().unwrap();
  }

  #[test]
  fn partial_input_keeps_defaults() {
    let cfg: OtpConfig =
      serde_json::from_str(r#"{"max_codes_per_window": 5}"#).unwrap();
    assert_eq!(cfg.max_codes_per_window, 5);
    assert_eq!(cfg.code_length, 6);
  }

  #[test]
  fn rejects_out_of_range_values() {
    let bad = [
      OtpConfig { code_length: 0, ..Default::default() },
      OtpConfig { code_length: 19, ..Default::default() },
      OtpConfig { validity_window_secs: 0, ..Default::default() },
      OtpConfig { validity_window_secs: u64::MAX, ..Default::default() },
      OtpConfig { max_codes_per_window: 0, ..Default::default() },
    ];
    for cfg in bad {
      assert!(
        matches!(cfg.validate(), Err(Error::InvalidConfig(_))),
        "{cfg:?}"
      );
    }
  }
}
