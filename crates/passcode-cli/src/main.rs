//! `passcode`: issue and verify one-time passwords from the command line.
//!
//! # Usage
//!
//! ```text
//! passcode issue --phone +66812345678
//! passcode verify --principal session:3f1c… --phone +66812345678 --code 573920
//! passcode --json history --principal session:3f1c… --phone +66812345678
//! ```
//!
//! Settings come from `passcode.toml` (or `--config`) and `PASSCODE_*`
//! environment variables.

mod backend;
mod report;
mod settings;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use backend::{Backend, PhoneChallenge};
use clap::{Args, Parser, Subcommand};
use passcode_core::{
  flow::OtpFlow,
  generator::OtpGenerator,
  notify::Notifier,
  principal::Principal,
  store::OtpStore,
};
use passcode_store_sqlite::SqliteStore;
use report::{CodeSummary, Report, Verdict};
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "passcode", version, about = "Issue and verify one-time passwords")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "passcode.toml")]
  config: PathBuf,

  /// Print machine-readable JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Send the active code for a phone number, minting one if needed.
  Issue {
    /// `kind:id`; a fresh `session:<uuid>` is used when omitted.
    #[arg(long)]
    principal: Option<Principal>,
    #[arg(long)]
    phone:     String,
    #[arg(long, default_value = "phone")]
    key:       String,
  },
  /// Check a submitted code.
  Verify {
    #[command(flatten)]
    target: Target,
    #[arg(long, default_value = "phone")]
    key:    String,
    #[arg(long)]
    code:   String,
  },
  /// Show the code awaiting verification, without its value.
  Pending {
    #[command(flatten)]
    target: Target,
  },
  /// List every code and attempt for a principal and phone number.
  History {
    #[command(flatten)]
    target: Target,
  },
}

#[derive(Args)]
struct Target {
  /// `kind:id`, e.g. `session:3f1c…` or `account:42`.
  #[arg(long)]
  principal: Principal,
  #[arg(long)]
  phone:     String,
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn run<S: OtpStore, N: Notifier>(
  flow: &OtpFlow<S, N>,
  command: Command,
) -> anyhow::Result<Report> {
  match command {
    Command::Issue { principal, phone, key } => {
      let principal =
        principal.unwrap_or_else(|| Principal::session(uuid::Uuid::new_v4().to_string()));
      let challenge = PhoneChallenge { phone_number: phone, otp_key: key };
      let issued = flow
        .issue(&principal, &challenge)
        .await
        .context("failed to issue code")?;
      Ok(Report::Issued {
        principal,
        code: CodeSummary::from(&issued.code),
        delivery: issued.delivery,
      })
    }

    Command::Verify { target, key, code } => {
      let challenge = PhoneChallenge { phone_number: target.phone, otp_key: key };
      let verification = flow
        .verify(&target.principal, &challenge, &code)
        .await
        .context("failed to verify code")?;
      Ok(Report::Verified(Verdict { principal: target.principal, verification }))
    }

    Command::Pending { target } => {
      let challenge = PhoneChallenge { phone_number: target.phone, otp_key: String::new() };
      let pending = flow
        .pending(&target.principal, &challenge)
        .await
        .context("failed to look up pending code")?;
      Ok(Report::Pending(pending.as_ref().map(CodeSummary::from)))
    }

    Command::History { target } => {
      let store = flow.generator().store();
      let codes = store
        .list_codes(&target.principal, &target.phone)
        .await
        .context("failed to list codes")?;
      let attempts = store
        .list_attempts(&target.principal, &target.phone)
        .await
        .context("failed to list attempts")?;
      Ok(Report::History {
        codes: codes.iter().map(CodeSummary::from).collect(),
        attempts,
      })
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  // Logs go to stderr so `--json` output stays parseable.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config)?;
  let store_path = settings.store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let generator =
    OtpGenerator::new(store, settings.otp.clone()).context("invalid otp settings")?;
  let notifier = Backend::from_settings(&settings.notifier)?;
  let flow = OtpFlow::new(generator, notifier, settings.template()?);

  let report = run(&flow, cli.command).await?;
  if cli.json {
    println!("{}", report.to_json().context("serialising output")?);
  } else {
    print!("{}", report.to_text());
  }
  Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
  use passcode_core::{
    code::CodeStatus, config::OtpConfig, memory::MemoryStore, notify::MessageTemplate,
  };
  use passcode_notify::LogNotifier;

  use super::*;

  fn flow() -> OtpFlow<MemoryStore, LogNotifier> {
    let generator = OtpGenerator::new(MemoryStore::new(), OtpConfig::default()).unwrap();
    OtpFlow::new(generator, LogNotifier, MessageTemplate::default())
  }

  fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("passcode").chain(args.iter().copied())).unwrap()
  }

  /// `cmd` for principal `session:cli` on phone `0812345678`, then `extra`.
  fn on_cli<'a>(cmd: &'a str, extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec![cmd, "--principal", "session:cli", "--phone", "0812345678"];
    args.extend_from_slice(extra);
    args
  }

  #[test]
  fn global_flags_parse_after_subcommand() {
    let cli = parse(&["pending", "--principal", "account:42", "--phone", "0812345678", "--json"]);
    assert!(cli.json);
    assert_eq!(cli.config, PathBuf::from("passcode.toml"));
    let Command::Pending { target } = cli.command else { panic!("expected pending") };
    assert_eq!(target.principal, Principal::new("account", "42"));
  }

  #[test]
  fn malformed_principal_is_rejected() {
    let parsed = Cli::try_parse_from([
      "passcode", "verify", "--principal", "nocolon", "--phone", "1", "--code", "1",
    ]);
    assert!(parsed.is_err());
  }

  #[tokio::test]
  async fn issue_without_principal_mints_a_session() {
    let flow = flow();
    let report = run(&flow, parse(&["issue", "--phone", "0812345678"]).command)
      .await
      .unwrap();

    let Report::Issued { principal, code, delivery } = &report else {
      panic!("expected an issue report");
    };
    assert_eq!(principal.kind, "session");
    assert!(uuid::Uuid::parse_str(&principal.id).is_ok());
    assert_eq!(code.status, CodeStatus::Pending);
    assert!(delivery.success);
    assert!(report.success());
  }

  #[tokio::test]
  async fn verify_pending_and_history_round() {
    let flow = flow();
    let p = Principal::session("cli");
    let issued = flow.generator().obtain_or_create(&p, "0812345678").await.unwrap();

    let pending = run(&flow, parse(&on_cli("pending", &[])).command).await.unwrap();
    assert!(matches!(&pending, Report::Pending(Some(c)) if c.id == issued.id));

    let wrong = on_cli("verify", &["--code", "not-it"]);
    let rejected = run(&flow, parse(&wrong).command).await.unwrap();
    assert!(!rejected.success());

    let right = on_cli("verify", &["--code", issued.code.as_str()]);
    let verified = run(&flow, parse(&right).command).await.unwrap();
    assert!(verified.success());
    assert_eq!(verified.to_text(), "verified   OTPKEY:phone\n");

    let history = run(&flow, parse(&on_cli("history", &[])).command).await.unwrap();
    let Report::History { codes, attempts } = history else { panic!("expected history") };
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].status, CodeStatus::Verified);
    assert_eq!(attempts.len(), 2);
  }

  #[tokio::test]
  async fn pending_with_nothing_issued_succeeds() {
    let flow = flow();
    let cmd = parse(&["pending", "--principal", "session:none", "--phone", "0812345678"]);
    let report = run(&flow, cmd.command).await.unwrap();
    assert!(matches!(report, Report::Pending(None)));
    assert!(report.success());
  }
}
