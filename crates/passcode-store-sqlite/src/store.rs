//! [`SqliteStore`], the SQLite implementation of [`OtpStore`].

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use passcode_core::{
  clock::{Clock, SystemClock},
  code::{CodeStatus, OtpAttempt, OtpCode},
  principal::Principal,
  store::{Issuance, Judgement, OtpStore},
};

use crate::{
  encode::{
    ATTEMPT_COLUMNS, CODE_COLUMNS, RawAttempt, RawCode, encode_dt,
    encode_status, to_column_precision,
  },
  schema::SCHEMA,
  Error, Result,
};

/// How long a connection waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// An OTP store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, clock: Arc::new(SystemClock) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, clock: Arc::new(SystemClock) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the time source used for `created_at` and window bounds.
  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        // Writers on other connections wait for the lock instead of failing.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  fn now(&self) -> DateTime<Utc> { to_column_precision(self.clock.now()) }
}

/// Encoded `(since, until)` bounds of the window ending at `now`.
fn window_bounds(now: DateTime<Utc>, window: TimeDelta) -> (String, String) {
  (encode_dt(now - window), encode_dt(now))
}

// ─── Statements ──────────────────────────────────────────────────────────────
//
// Shared by the single-step methods and the transactional units of work.
// `Transaction` derefs to `Connection`, so each takes a plain connection.

/// Owned copies of the key columns, movable into a `call` closure.
struct KeyCols {
  kind:  String,
  id:    String,
  phone: String,
}

impl KeyCols {
  fn new(principal: &Principal, phone_number: &str) -> Self {
    Self {
      kind:  principal.kind.clone(),
      id:    principal.id.clone(),
      phone: phone_number.to_owned(),
    }
  }
}

fn count_in_window(
  conn: &rusqlite::Connection,
  key: &KeyCols,
  (since, until): &(String, String),
) -> rusqlite::Result<u64> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM otp_codes
     WHERE principal_kind = ?1 AND principal_id = ?2 AND phone_number = ?3
       AND created_at >= ?4 AND created_at <= ?5",
    rusqlite::params![key.kind, key.id, key.phone, since, until],
    |row| row.get(0),
  )?;
  Ok(count.unsigned_abs())
}

fn select_active(
  conn: &rusqlite::Connection,
  key: &KeyCols,
  (since, until): &(String, String),
  include_failed: bool,
) -> rusqlite::Result<Option<RawCode>> {
  conn
    .query_row(
      &format!(
        "SELECT {CODE_COLUMNS} FROM otp_codes
         WHERE principal_kind = ?1 AND principal_id = ?2 AND phone_number = ?3
           AND created_at >= ?4 AND created_at <= ?5
           AND (verified IS NULL OR (?6 AND verified = 0))
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
      ),
      rusqlite::params![key.kind, key.id, key.phone, since, until, include_failed],
      RawCode::from_row,
    )
    .optional()
}

fn insert_code(
  conn: &rusqlite::Connection,
  key: &KeyCols,
  code: &str,
  at: &str,
) -> rusqlite::Result<i64> {
  conn.execute(
    "INSERT INTO otp_codes
       (principal_kind, principal_id, phone_number, code, verified, created_at)
     VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
    rusqlite::params![key.kind, key.id, key.phone, code, at],
  )?;
  Ok(conn.last_insert_rowid())
}

fn insert_attempt(
  conn: &rusqlite::Connection,
  key: &KeyCols,
  submitted_code: &str,
  at: &str,
) -> rusqlite::Result<i64> {
  conn.execute(
    "INSERT INTO otp_attempts
       (principal_kind, principal_id, phone_number, submitted_code, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![key.kind, key.id, key.phone, submitted_code, at],
  )?;
  Ok(conn.last_insert_rowid())
}

fn update_status(
  conn: &rusqlite::Connection,
  code_id: i64,
  status: CodeStatus,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE otp_codes SET verified = ?2 WHERE id = ?1",
    rusqlite::params![code_id, encode_status(status)],
  )
}

/// What an issuance transaction decided, before decoding.
enum RawIssuance {
  Existing(RawCode),
  Created { id: i64, created_at: DateTime<Utc>, issued: u64 },
  Exhausted { issued: u64 },
}

// ─── OtpStore impl ───────────────────────────────────────────────────────────

impl OtpStore for SqliteStore {
  type Error = Error;

  async fn count_codes_in_window(
    &self,
    principal: &Principal,
    phone_number: &str,
    window: TimeDelta,
  ) -> Result<u64> {
    let key = KeyCols::new(principal, phone_number);
    let bounds = window_bounds(self.now(), window);

    let count = self
      .conn
      .call(move |conn| Ok(count_in_window(conn, &key, &bounds)?))
      .await?;
    Ok(count)
  }

  async fn find_active_code(
    &self,
    principal: &Principal,
    phone_number: &str,
    window: TimeDelta,
    include_failed: bool,
  ) -> Result<Option<OtpCode>> {
    let key = KeyCols::new(principal, phone_number);
    let bounds = window_bounds(self.now(), window);

    let raw = self
      .conn
      .call(move |conn| Ok(select_active(conn, &key, &bounds, include_failed)?))
      .await?;

    raw.map(RawCode::into_code).transpose()
  }

  async fn create_code(
    &self,
    principal: &Principal,
    phone_number: &str,
    code: &str,
  ) -> Result<OtpCode> {
    let mut record = OtpCode {
      id:           0,
      principal:    principal.clone(),
      phone_number: phone_number.to_owned(),
      code:         code.to_owned(),
      status:       CodeStatus::Pending,
      created_at:   self.now(),
    };

    let key = KeyCols::new(principal, phone_number);
    let code = record.code.clone();
    let at = encode_dt(record.created_at);

    record.id = self
      .conn
      .call(move |conn| Ok(insert_code(conn, &key, &code, &at)?))
      .await?;

    tracing::trace!(code_id = record.id, "inserted otp code");
    Ok(record)
  }

  async fn record_attempt(
    &self,
    principal: &Principal,
    phone_number: &str,
    submitted_code: &str,
  ) -> Result<OtpAttempt> {
    let mut attempt = OtpAttempt {
      id:             0,
      principal:      principal.clone(),
      phone_number:   phone_number.to_owned(),
      submitted_code: submitted_code.to_owned(),
      created_at:     self.now(),
    };

    let key = KeyCols::new(principal, phone_number);
    let submitted = attempt.submitted_code.clone();
    let at = encode_dt(attempt.created_at);

    attempt.id = self
      .conn
      .call(move |conn| Ok(insert_attempt(conn, &key, &submitted, &at)?))
      .await?;

    Ok(attempt)
  }

  async fn mark_verified(&self, code_id: i64, verified: bool) -> Result<()> {
    let status = CodeStatus::from_result(verified);

    let updated = self
      .conn
      .call(move |conn| Ok(update_status(conn, code_id, status)?))
      .await?;

    if updated == 0 {
      return Err(Error::CodeNotFound(code_id));
    }
    Ok(())
  }

  /// Runs in one `BEGIN IMMEDIATE` transaction: the write lock is taken
  /// before the first read, so another connection cannot insert between the
  /// lookup and the insert. "Now" is read after the lock is acquired.
  async fn issue_code(
    &self,
    principal: &Principal,
    phone_number: &str,
    window: TimeDelta,
    limit: u32,
    candidate: &str,
  ) -> Result<Issuance> {
    let key = KeyCols::new(principal, phone_number);
    let candidate_code = candidate.to_owned();
    let clock = self.clock.clone();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = to_column_precision(clock.now());
        let bounds = window_bounds(now, window);

        if let Some(active) = select_active(&tx, &key, &bounds, true)? {
          return Ok(RawIssuance::Existing(active));
        }
        let issued = count_in_window(&tx, &key, &bounds)?;
        if issued >= u64::from(limit) {
          return Ok(RawIssuance::Exhausted { issued });
        }
        let id = insert_code(&tx, &key, &candidate_code, &encode_dt(now))?;
        tx.commit()?;
        Ok(RawIssuance::Created { id, created_at: now, issued: issued + 1 })
      })
      .await?;

    Ok(match raw {
      RawIssuance::Existing(active) => Issuance::Existing(active.into_code()?),
      RawIssuance::Exhausted { issued } => Issuance::Exhausted { issued },
      RawIssuance::Created { id, created_at, issued } => {
        tracing::trace!(code_id = id, "inserted otp code");
        Issuance::Created {
          code: OtpCode {
            id,
            principal: principal.clone(),
            phone_number: phone_number.to_owned(),
            code: candidate.to_owned(),
            status: CodeStatus::Pending,
            created_at,
          },
          issued,
        }
      }
    })
  }

  /// Attempt insert, lookup and status update in one `BEGIN IMMEDIATE`
  /// transaction.
  async fn judge_attempt(
    &self,
    principal: &Principal,
    phone_number: &str,
    window: TimeDelta,
    submitted_code: &str,
  ) -> Result<Judgement> {
    let key = KeyCols::new(principal, phone_number);
    let submitted = submitted_code.to_owned();
    let clock = self.clock.clone();

    let (attempt_id, created_at, raw) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = to_column_precision(clock.now());
        let attempt_id = insert_attempt(&tx, &key, &submitted, &encode_dt(now))?;

        let mut active = select_active(&tx, &key, &window_bounds(now, window), true)?;
        if let Some(raw) = active.as_mut() {
          let status = CodeStatus::from_result(raw.code == submitted);
          update_status(&tx, raw.id, status)?;
          raw.verified = encode_status(status);
        }
        tx.commit()?;
        Ok((attempt_id, now, active))
      })
      .await?;

    Ok(Judgement {
      attempt: OtpAttempt {
        id: attempt_id,
        principal: principal.clone(),
        phone_number: phone_number.to_owned(),
        submitted_code: submitted_code.to_owned(),
        created_at,
      },
      code: raw.map(RawCode::into_code).transpose()?,
    })
  }

  async fn list_codes(
    &self,
    principal: &Principal,
    phone_number: &str,
  ) -> Result<Vec<OtpCode>> {
    let key = KeyCols::new(principal, phone_number);

    let raws: Vec<RawCode> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CODE_COLUMNS} FROM otp_codes
           WHERE principal_kind = ?1 AND principal_id = ?2 AND phone_number = ?3
           ORDER BY created_at, id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![key.kind, key.id, key.phone], RawCode::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCode::into_code).collect()
  }

  async fn list_attempts(
    &self,
    principal: &Principal,
    phone_number: &str,
  ) -> Result<Vec<OtpAttempt>> {
    let key = KeyCols::new(principal, phone_number);

    let raws: Vec<RawAttempt> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ATTEMPT_COLUMNS} FROM otp_attempts
           WHERE principal_kind = ?1 AND principal_id = ?2 AND phone_number = ?3
           ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![key.kind, key.id, key.phone], RawAttempt::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAttempt::into_attempt).collect()
  }
}
