//! What each command prints, and the exit status it implies.

use std::{fmt::Write as _, process::ExitCode};

use chrono::{DateTime, Utc};
use passcode_core::{
  code::{CodeStatus, OtpAttempt, OtpCode},
  flow::Verification,
  notify::Delivery,
  principal::Principal,
};
use serde::Serialize;

/// A code without its value.
#[derive(Debug, Serialize)]
pub struct CodeSummary {
  pub id:         i64,
  pub status:     CodeStatus,
  pub created_at: DateTime<Utc>,
}

impl From<&OtpCode> for CodeSummary {
  fn from(code: &OtpCode) -> Self {
    Self { id: code.id, status: code.status, created_at: code.created_at }
  }
}

/// A verification outcome, with the outcome's fields inlined.
#[derive(Debug, Serialize)]
pub struct Verdict {
  pub principal:    Principal,
  #[serde(flatten)]
  pub verification: Verification,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Report {
  Issued {
    principal: Principal,
    code:      CodeSummary,
    delivery:  Delivery,
  },
  Verified(Verdict),
  Pending(Option<CodeSummary>),
  History {
    codes:    Vec<CodeSummary>,
    attempts: Vec<OtpAttempt>,
  },
}

impl Report {
  /// Failed deliveries and rejected codes count as failures.
  pub fn success(&self) -> bool {
    match self {
      Self::Issued { delivery, .. } => delivery.success,
      Self::Verified(verdict) => verdict.verification.is_verified(),
      Self::Pending(_) | Self::History { .. } => true,
    }
  }

  pub fn exit_code(&self) -> ExitCode {
    if self.success() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
  }

  pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }

  pub fn to_text(&self) -> String {
    let mut out = String::new();
    match self {
      Self::Issued { principal, code, delivery } => {
        let _ = writeln!(out, "principal  {principal}");
        let _ = writeln!(out, "code id    {}", code.id);
        if delivery.success {
          let _ = writeln!(out, "delivery   sent");
        } else {
          let reason = delivery.description.as_deref().unwrap_or("unknown error");
          let _ = writeln!(out, "delivery   failed: {reason}");
        }
      }
      Self::Verified(verdict) => match &verdict.verification {
        Verification::Verified { session_key } => {
          let _ = writeln!(out, "verified   {session_key}");
        }
        Verification::Rejected => {
          let _ = writeln!(out, "rejected");
        }
      },
      Self::Pending(Some(code)) => summary_line(&mut out, "", code),
      Self::Pending(None) => {
        let _ = writeln!(out, "no pending code");
      }
      Self::History { codes, attempts } => {
        let _ = writeln!(out, "codes");
        for code in codes {
          summary_line(&mut out, "  ", code);
        }
        let _ = writeln!(out, "attempts");
        for a in attempts {
          let _ = writeln!(
            out,
            "  {}  {:>8}  {}",
            a.id,
            a.submitted_code,
            a.created_at.to_rfc3339()
          );
        }
      }
    }
    out
  }
}

fn summary_line(out: &mut String, indent: &str, code: &CodeSummary) {
  let _ = writeln!(
    out,
    "{indent}{}  {:?}  {}",
    code.id,
    code.status,
    code.created_at.to_rfc3339()
  );
}
