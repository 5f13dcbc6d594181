//! Integration tests for `SqliteStore`, in memory and on shared files.

use std::path::PathBuf;

use chrono::{TimeDelta, TimeZone as _, Utc};
use passcode_core::{
  clock::ManualClock,
  code::CodeStatus,
  config::OtpConfig,
  generator::OtpGenerator,
  principal::Principal,
  store::{Issuance, OtpStore, StoreError as _},
};

use crate::{Error, SqliteStore};

const PHONE: &str = "0812345678";

fn window() -> TimeDelta { TimeDelta::seconds(900) }

async fn store() -> (SqliteStore, ManualClock) {
  let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
    .with_clock(clock.clone());
  (store, clock)
}

fn session() -> Principal { Principal::session("7f3c2a") }

// ─── Codes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_find_code() {
  let (s, _clock) = store().await;

  let created = s.create_code(&session(), PHONE, "573920").await.unwrap();
  assert_eq!(created.status, CodeStatus::Pending);
  assert!(created.id > 0);

  let found = s.find_active_code(&session(), PHONE, window(), false).await.unwrap();
  assert_eq!(found, Some(created));
}

#[tokio::test]
async fn sub_microsecond_clock_roundtrips() {
  let (s, clock) = store().await;
  clock.advance(TimeDelta::nanoseconds(1_234_567));

  let created = s.create_code(&session(), PHONE, "573920").await.unwrap();
  let listed = s.list_codes(&session(), PHONE).await.unwrap();
  assert_eq!(listed, vec![created]);
}

#[tokio::test]
async fn latest_code_wins() {
  let (s, clock) = store().await;

  s.create_code(&session(), PHONE, "111111").await.unwrap();
  clock.advance(TimeDelta::seconds(5));
  let newer = s.create_code(&session(), PHONE, "222222").await.unwrap();

  let found = s.find_active_code(&session(), PHONE, window(), true).await.unwrap();
  assert_eq!(found.unwrap().id, newer.id);
}

#[tokio::test]
async fn rejected_codes_only_match_when_included() {
  let (s, _clock) = store().await;
  let code = s.create_code(&session(), PHONE, "111111").await.unwrap();
  s.mark_verified(code.id, false).await.unwrap();

  let strict = s.find_active_code(&session(), PHONE, window(), false).await.unwrap();
  assert!(strict.is_none());

  let lenient = s.find_active_code(&session(), PHONE, window(), true).await.unwrap();
  assert_eq!(lenient.unwrap().status, CodeStatus::Rejected);
}

#[tokio::test]
async fn verified_codes_never_match() {
  let (s, _clock) = store().await;
  let code = s.create_code(&session(), PHONE, "111111").await.unwrap();
  s.mark_verified(code.id, true).await.unwrap();

  assert!(s.find_active_code(&session(), PHONE, window(), true).await.unwrap().is_none());
  let listed = s.list_codes(&session(), PHONE).await.unwrap();
  assert_eq!(listed[0].status, CodeStatus::Verified);
}

#[tokio::test]
async fn window_boundaries_are_inclusive() {
  let (s, clock) = store().await;
  s.create_code(&session(), PHONE, "111111").await.unwrap();

  clock.advance(window());
  assert_eq!(s.count_codes_in_window(&session(), PHONE, window()).await.unwrap(), 1);
  assert!(s.find_active_code(&session(), PHONE, window(), true).await.unwrap().is_some());

  clock.advance(TimeDelta::seconds(1));
  assert_eq!(s.count_codes_in_window(&session(), PHONE, window()).await.unwrap(), 0);
  assert!(s.find_active_code(&session(), PHONE, window(), true).await.unwrap().is_none());
}

#[tokio::test]
async fn count_includes_every_status() {
  let (s, clock) = store().await;
  let a = s.create_code(&session(), PHONE, "111111").await.unwrap();
  clock.advance(TimeDelta::seconds(1));
  let b = s.create_code(&session(), PHONE, "222222").await.unwrap();
  clock.advance(TimeDelta::seconds(1));
  s.create_code(&session(), PHONE, "333333").await.unwrap();

  s.mark_verified(a.id, true).await.unwrap();
  s.mark_verified(b.id, false).await.unwrap();

  assert_eq!(s.count_codes_in_window(&session(), PHONE, window()).await.unwrap(), 3);
}

#[tokio::test]
async fn keys_are_isolated() {
  let (s, _clock) = store().await;
  s.create_code(&session(), PHONE, "111111").await.unwrap();

  let other = Principal::new("account", "7f3c2a");
  assert!(s.find_active_code(&other, PHONE, window(), true).await.unwrap().is_none());
  assert_eq!(s.count_codes_in_window(&session(), "0899999999", window()).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_issue_at_same_instant_conflicts() {
  let (s, _clock) = store().await;
  s.create_code(&session(), PHONE, "111111").await.unwrap();

  let err = s.create_code(&session(), PHONE, "222222").await.unwrap_err();
  assert!(err.is_conflict(), "{err}");
}

#[tokio::test]
async fn mark_verified_unknown_id_errors() {
  let (s, _clock) = store().await;
  let err = s.mark_verified(999, true).await.unwrap_err();
  assert!(matches!(err, Error::CodeNotFound(999)));
  assert!(!err.is_conflict());
}

// ─── Attempts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn attempts_are_appended_in_order() {
  let (s, clock) = store().await;

  s.record_attempt(&session(), PHONE, "000000").await.unwrap();
  clock.advance(TimeDelta::seconds(1));
  s.record_attempt(&session(), PHONE, "573920").await.unwrap();
  s.record_attempt(&session(), "0899999999", "123456").await.unwrap();

  let attempts = s.list_attempts(&session(), PHONE).await.unwrap();
  let submitted: Vec<_> = attempts.iter().map(|a| a.submitted_code.as_str()).collect();
  assert_eq!(submitted, ["000000", "573920"]);
  assert!(attempts[0].created_at < attempts[1].created_at);
}

// ─── Through the generator ───────────────────────────────────────────────────

#[tokio::test]
async fn generator_scenario_on_sqlite() {
  let (s, clock) = store().await;
  let g = OtpGenerator::new(s, OtpConfig::default()).unwrap();

  let a = g.obtain_or_create(&session(), PHONE).await.unwrap();
  assert_eq!(a.code.len(), 6);

  assert!(!g.validate(&session(), PHONE, "not-it").await.unwrap());
  assert_eq!(g.obtain_or_create(&session(), PHONE).await.unwrap().id, a.id);

  assert!(g.validate(&session(), PHONE, &a.code).await.unwrap());
  assert_eq!(g.store().list_attempts(&session(), PHONE).await.unwrap().len(), 2);

  clock.advance(TimeDelta::seconds(1));
  let b = g.obtain_or_create(&session(), PHONE).await.unwrap();
  assert_ne!(a.id, b.id);

  clock.advance(TimeDelta::seconds(1));
  assert!(g.validate(&session(), PHONE, &b.code).await.unwrap());
  clock.advance(TimeDelta::seconds(1));
  let c = g.obtain_or_create(&session(), PHONE).await.unwrap();
  assert!(g.validate(&session(), PHONE, &c.code).await.unwrap());

  clock.advance(TimeDelta::seconds(1));
  let err = g.obtain_or_create(&session(), PHONE).await.unwrap_err();
  assert!(matches!(err, passcode_core::Error::GenerationLimitReached { .. }));
}

#[tokio::test]
async fn conflict_without_active_winner_propagates() {
  let (s, _clock) = store().await;
  // Another writer issued a code that was already judged at this instant;
  // the generator's insert collides with it and nothing is active.
  let winner = s.create_code(&session(), PHONE, "482913").await.unwrap();
  s.mark_verified(winner.id, true).await.unwrap();

  let g = OtpGenerator::new(s, OtpConfig::default()).unwrap();
  let err = g.obtain_or_create(&session(), PHONE).await.unwrap_err();
  assert!(matches!(err, passcode_core::Error::Store(_)));
}

// ─── Units of work ───────────────────────────────────────────────────────────

#[tokio::test]
async fn issue_code_reuses_then_exhausts() {
  let (s, clock) = store().await;

  let Issuance::Created { code: first, issued: 1 } =
    s.issue_code(&session(), PHONE, window(), 2, "111111").await.unwrap()
  else {
    panic!("expected a new code");
  };
  let again = s.issue_code(&session(), PHONE, window(), 2, "999999").await.unwrap();
  assert_eq!(again, Issuance::Existing(first.clone()));

  s.mark_verified(first.id, true).await.unwrap();
  clock.advance(TimeDelta::seconds(1));
  let second = s.issue_code(&session(), PHONE, window(), 2, "222222").await.unwrap();
  assert!(matches!(second, Issuance::Created { issued: 2, .. }));

  let listed = s.list_codes(&session(), PHONE).await.unwrap();
  s.mark_verified(listed[1].id, true).await.unwrap();
  clock.advance(TimeDelta::seconds(1));
  let third = s.issue_code(&session(), PHONE, window(), 2, "333333").await.unwrap();
  assert_eq!(third, Issuance::Exhausted { issued: 2 });
  assert_eq!(s.list_codes(&session(), PHONE).await.unwrap().len(), 2);
}

#[tokio::test]
async fn judge_attempt_updates_status_in_place() {
  let (s, _clock) = store().await;

  let none = s.judge_attempt(&session(), PHONE, window(), "111111").await.unwrap();
  assert!(none.code.is_none());

  s.create_code(&session(), PHONE, "111111").await.unwrap();
  let wrong = s.judge_attempt(&session(), PHONE, window(), "000000").await.unwrap();
  assert_eq!(wrong.code.unwrap().status, CodeStatus::Rejected);

  let right = s.judge_attempt(&session(), PHONE, window(), "111111").await.unwrap();
  assert!(right.is_verified());
  assert_eq!(right.attempt.submitted_code, "111111");

  let listed = s.list_codes(&session(), PHONE).await.unwrap();
  assert_eq!(listed[0].status, CodeStatus::Verified);
  assert_eq!(s.list_attempts(&session(), PHONE).await.unwrap().len(), 3);
}

// ─── Separate connections on one file ────────────────────────────────────────

/// A database file in the temp dir, removed (with its WAL files) on drop.
struct TempDb(PathBuf);

impl TempDb {
  fn new(name: &str) -> Self {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let file = format!("passcode-{name}-{}-{nanos}.db", std::process::id());
    Self(std::env::temp_dir().join(file))
  }
}

impl Drop for TempDb {
  fn drop(&mut self) {
    for suffix in ["", "-wal", "-shm"] {
      let mut path = self.0.clone().into_os_string();
      path.push(suffix);
      let _ = std::fs::remove_file(path);
    }
  }
}

async fn generators_on(db: &TempDb) -> (OtpGenerator<SqliteStore>, OtpGenerator<SqliteStore>) {
  let a = SqliteStore::open(&db.0).await.expect("first connection");
  let b = SqliteStore::open(&db.0).await.expect("second connection");
  (
    OtpGenerator::new(a, OtpConfig::default()).unwrap(),
    OtpGenerator::new(b, OtpConfig::default()).unwrap(),
  )
}

#[tokio::test]
async fn separate_connections_issue_one_code_per_key() {
  let db = TempDb::new("issue");
  let (a, b) = generators_on(&db).await;

  for round in 0..25 {
    let p = Principal::session(format!("race-{round}"));
    let (x, y) = tokio::join!(a.obtain_or_create(&p, PHONE), b.obtain_or_create(&p, PHONE));
    assert_eq!(x.unwrap().id, y.unwrap().id, "round {round}");

    let codes = a.store().list_codes(&p, PHONE).await.unwrap();
    assert_eq!(codes.len(), 1, "round {round}");
  }
}

#[tokio::test]
async fn separate_connections_never_undo_a_verification() {
  let db = TempDb::new("judge");
  let (a, b) = generators_on(&db).await;

  for round in 0..25 {
    let p = Principal::session(format!("race-{round}"));
    let issued = a.obtain_or_create(&p, PHONE).await.unwrap();

    let (right, wrong) = tokio::join!(
      a.validate(&p, PHONE, &issued.code),
      b.validate(&p, PHONE, "not-a-code"),
    );
    assert!(right.unwrap(), "round {round}");
    assert!(!wrong.unwrap(), "round {round}");

    let codes = b.store().list_codes(&p, PHONE).await.unwrap();
    assert_eq!(codes[0].status, CodeStatus::Verified, "round {round}");
    assert_eq!(b.store().list_attempts(&p, PHONE).await.unwrap().len(), 2);
  }
}
