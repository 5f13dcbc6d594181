//! The entity on whose behalf a code is issued.
//!
//! A principal is an opaque `(kind, id)` pair so one store can serve sessions,
//! accounts, or anything else that needs phone verification. The core never
//! resolves or authenticates it.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
  /// Type tag, e.g. `session` or `account`.
  pub kind: String,
  pub id:   String,
}

impl Principal {
  pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
    Self { kind: kind.into(), id: id.into() }
  }

  pub fn session(id: impl Into<String>) -> Self { Self::new("session", id) }
}

impl fmt::Display for Principal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.id)
  }
}

impl FromStr for Principal {
  type Err = Error;

  /// Parse `kind:id`. The id may itself contain colons.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once(':') {
      Some((kind, id)) if !kind.is_empty() && !id.is_empty() => {
        Ok(Self::new(kind, id))
      }
      _ => Err(Error::InvalidPrincipal(s.to_owned())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_kind_and_id() {
    let p: Principal = "session:abc123".parse().unwrap();
    assert_eq!(p, Principal::session("abc123"));
    assert_eq!(p.to_string(), "session:abc123");
  }

  #[test]
  fn id_keeps_trailing_colons() {
    let p: Principal = "account:tenant:42".parse().unwrap();
    assert_eq!(p.kind, "account");
    assert_eq!(p.id, "tenant:42");
  }

  #[test]
  fn rejects_missing_parts() {
    for bad in ["", "session", "session:", ":abc"] {
      let err = bad.parse::<Principal>().unwrap_err();
      assert!(matches!(err, Error::InvalidPrincipal(_)), "{bad:?}");
    }
  }
}
