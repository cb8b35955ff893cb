//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::params_from_iter;
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::flow::{Mode, Session, Step};
use crate::locale::Locale;
use crate::savings::BankRate;
use crate::store::migrations;
use crate::store::traits::{ChatLogEntry, Database, InquiryLead, Lead};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Writes are
/// serialized through `write_lock` so a transaction never picks up another
/// request's statements.
pub struct LibSqlBackend {
    /// Held so the database outlives `conn`.
    _db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            _db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(v: Option<&str>) -> Value {
    v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null)
}

fn opt_real(v: Option<f64>) -> Value {
    v.map(Value::Real).unwrap_or(Value::Null)
}

fn opt_int(v: Option<u32>) -> Value {
    v.map(|n| Value::Integer(i64::from(n))).unwrap_or(Value::Null)
}

fn opt_datetime(v: Option<DateTime<Utc>>) -> Value {
    v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null)
}

fn to_u32(v: i64) -> u32 {
    u32::try_from(v).unwrap_or_default()
}

fn parse_decimal(s: &str) -> Decimal {
    s.parse().unwrap_or_else(|e| {
        warn!(value = s, "Unparseable stored decimal: {e}");
        Decimal::ZERO
    })
}

const SESSION_COLUMNS: &str = "external_id, current_step, locale, mode, name, phone, age, \
     loan_amount, loan_tenure, monthly_repayment, interest_rate, remaining_tenure, \
     query_count, query_window_start, created_at, updated_at";

fn row_to_session(row: &libsql::Row) -> Result<Session, libsql::Error> {
    let external_id: String = row.get(0)?;
    let step_str: String = row.get(1)?;
    let locale_str: String = row.get(2)?;
    let mode_str: String = row.get(3)?;

    let (current_step, corrupt_step) = match step_str.parse::<Step>() {
        Ok(step) => (step, None),
        Err(_) => {
            error!(external_id = %external_id, step = %step_str, "Stored session has an unknown step");
            (Step::first(), Some(step_str))
        }
    };
    let locale = Locale::from_code(&locale_str).unwrap_or_else(|| {
        warn!(external_id = %external_id, locale = %locale_str, "Unknown stored locale");
        Locale::default()
    });
    let mode = mode_str.parse::<Mode>().unwrap_or_else(|_| {
        warn!(external_id = %external_id, mode = %mode_str, "Unknown stored mode");
        Mode::Flow
    });

    let window_str: Option<String> = row.get(13).ok();
    let created_str: String = row.get(14)?;
    let updated_str: String = row.get(15)?;

    Ok(Session {
        external_id,
        current_step,
        locale,
        mode,
        name: row.get(4).ok(),
        phone: row.get(5).ok(),
        age: row.get::<i64>(6).ok().map(to_u32),
        loan_amount: row.get(7).ok(),
        loan_tenure: row.get::<i64>(8).ok().map(to_u32),
        monthly_repayment: row.get(9).ok(),
        interest_rate: row.get(10).ok(),
        remaining_tenure: row.get::<i64>(11).ok().map(to_u32),
        query_count: to_u32(row.get::<i64>(12).unwrap_or(0)),
        query_window_start: window_str.as_deref().map(parse_datetime),
        corrupt_step,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const LEAD_COLUMNS: &str = "id, external_id, name, phone, loan_amount, loan_tenure, \
     current_repayment, new_repayment, monthly_savings, yearly_savings, lifetime_savings, \
     years_saved, months_saved, bank_name, interest_rate, created_at";

fn row_to_lead(row: &libsql::Row) -> Result<Lead, libsql::Error> {
    let id_str: String = row.get(0)?;
    let current: String = row.get(6)?;
    let new: String = row.get(7)?;
    let monthly: String = row.get(8)?;
    let yearly: String = row.get(9)?;
    let lifetime: String = row.get(10)?;
    let created_str: String = row.get(15)?;

    Ok(Lead {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        external_id: row.get(1)?,
        name: row.get(2).ok(),
        phone: row.get(3).ok(),
        loan_amount: row.get(4)?,
        loan_tenure: to_u32(row.get(5)?),
        current_repayment: parse_decimal(&current),
        new_repayment: parse_decimal(&new),
        monthly_savings: parse_decimal(&monthly),
        yearly_savings: parse_decimal(&yearly),
        lifetime_savings: parse_decimal(&lifetime),
        years_saved: to_u32(row.get(11)?),
        months_saved: to_u32(row.get(12)?),
        bank_name: row.get(13)?,
        interest_rate: row.get(14)?,
        created_at: parse_datetime(&created_str),
    })
}

const UPSERT_SESSION_SQL: &str = "INSERT INTO sessions (external_id, current_step, locale, mode, \
     name, phone, age, loan_amount, loan_tenure, monthly_repayment, interest_rate, \
     remaining_tenure, query_count, query_window_start, created_at, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
     ON CONFLICT(external_id) DO UPDATE SET \
     current_step = excluded.current_step, locale = excluded.locale, mode = excluded.mode, \
     name = excluded.name, phone = excluded.phone, age = excluded.age, \
     loan_amount = excluded.loan_amount, loan_tenure = excluded.loan_tenure, \
     monthly_repayment = excluded.monthly_repayment, interest_rate = excluded.interest_rate, \
     remaining_tenure = excluded.remaining_tenure, query_count = excluded.query_count, \
     query_window_start = excluded.query_window_start, updated_at = excluded.updated_at";

fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

fn session_values(session: &Session, now: &str) -> Vec<Value> {
    vec![
        text(session.external_id.as_str()),
        text(session.current_step.as_str()),
        text(session.locale.code()),
        text(session.mode.as_str()),
        opt_text(session.name.as_deref()),
        opt_text(session.phone.as_deref()),
        opt_int(session.age),
        opt_real(session.loan_amount),
        opt_int(session.loan_tenure),
        opt_real(session.monthly_repayment),
        opt_real(session.interest_rate),
        opt_int(session.remaining_tenure),
        Value::Integer(i64::from(session.query_count)),
        opt_datetime(session.query_window_start),
        text(session.created_at.to_rfc3339()),
        text(now),
    ]
}

const INSERT_LEAD_SQL: &str = "INSERT INTO leads (id, external_id, name, phone, loan_amount, \
     loan_tenure, current_repayment, new_repayment, monthly_savings, yearly_savings, \
     lifetime_savings, years_saved, months_saved, bank_name, interest_rate, created_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

fn lead_values(lead: &Lead) -> Vec<Value> {
    vec![
        text(lead.id.to_string()),
        text(lead.external_id.as_str()),
        opt_text(lead.name.as_deref()),
        opt_text(lead.phone.as_deref()),
        Value::Real(lead.loan_amount),
        Value::Integer(i64::from(lead.loan_tenure)),
        text(lead.current_repayment.to_string()),
        text(lead.new_repayment.to_string()),
        text(lead.monthly_savings.to_string()),
        text(lead.yearly_savings.to_string()),
        text(lead.lifetime_savings.to_string()),
        Value::Integer(i64::from(lead.years_saved)),
        Value::Integer(i64::from(lead.months_saved)),
        text(lead.bank_name.as_str()),
        Value::Real(lead.interest_rate),
        text(lead.created_at.to_rfc3339()),
    ]
}

const INSERT_RATE_SQL: &str = "INSERT INTO bank_rates (bank_name, min_amount, max_amount, \
     interest_rate) VALUES (?1, ?2, ?3, ?4)";

fn rate_values(rate: &BankRate) -> Vec<Value> {
    vec![
        text(rate.bank_name.as_str()),
        Value::Real(rate.min_amount),
        opt_real(rate.max_amount),
        Value::Real(rate.interest_rate),
    ]
}

/// Commit when every statement succeeded, otherwise roll back and return the error.
async fn finish_transaction(
    tx: libsql::Transaction,
    outcome: Result<(), DatabaseError>,
    op: &str,
) -> Result<(), DatabaseError> {
    match outcome {
        Ok(()) => tx
            .commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op} commit: {e}"))),
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(op, "Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

// ── Database impl ───────────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn get_or_create_session(
        &self,
        external_id: &str,
    ) -> Result<(Session, bool), DatabaseError> {
        let fresh = Session::new(external_id);
        let now = fresh.created_at.to_rfc3339();
        let inserted = {
            let _guard = self.write_lock.lock().await;
            self.conn()
                .execute(
                    "INSERT INTO sessions (external_id, current_step, locale, mode, query_count, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5) ON CONFLICT(external_id) DO NOTHING",
                    params![
                        external_id,
                        fresh.current_step.as_str(),
                        fresh.locale.code(),
                        fresh.mode.as_str(),
                        now,
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("get_or_create_session insert: {e}")))?
        };

        let session = self.get_session(external_id).await?.ok_or_else(|| {
            DatabaseError::NotFound {
                entity: "session".to_string(),
                id: external_id.to_string(),
            }
        })?;

        let created = inserted == 1;
        if created {
            info!(external_id, "Session created");
        }
        Ok((session, created))
    }

    async fn get_session(&self, external_id: &str) -> Result<Option<Session>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE external_id = ?1"),
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let session = row_to_session(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_session row parse: {e}")))?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn save_session(&self, session: &Session) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(UPSERT_SESSION_SQL, params_from_iter(session_values(session, &now)))
            .await
            .map_err(|e| DatabaseError::Query(format!("save_session: {e}")))?;
        debug!(external_id = %session.external_id, step = %session.current_step, "Session saved");
        Ok(())
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn complete_flow(&self, session: &Session, lead: &Lead) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_flow begin: {e}")))?;

        let written = async {
            tx.execute(INSERT_LEAD_SQL, params_from_iter(lead_values(lead)))
                .await
                .map_err(|e| DatabaseError::Query(format!("complete_flow lead: {e}")))?;
            tx.execute(UPSERT_SESSION_SQL, params_from_iter(session_values(session, &now)))
                .await
                .map_err(|e| DatabaseError::Query(format!("complete_flow session: {e}")))?;
            Ok::<(), DatabaseError>(())
        }
        .await;
        finish_transaction(tx, written, "complete_flow").await?;

        info!(external_id = %lead.external_id, lead_id = %lead.id, "Lead recorded");
        Ok(())
    }

    async fn list_leads(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_leads: {e}")))?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_lead(&row) {
                Ok(lead) => leads.push(lead),
                Err(e) => warn!("Skipping lead row: {e}"),
            }
        }
        Ok(leads)
    }

    async fn list_leads_for_user(&self, external_id: &str) -> Result<Vec<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE external_id = ?1 ORDER BY created_at ASC"
                ),
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_leads_for_user: {e}")))?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_lead(&row) {
                Ok(lead) => leads.push(lead),
                Err(e) => warn!("Skipping lead row: {e}"),
            }
        }
        Ok(leads)
    }

    async fn insert_inquiry_lead(&self, lead: &InquiryLead) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO inquiry_leads (id, external_id, name, phone, question, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params_from_iter(vec![
                    text(lead.id.to_string()),
                    text(lead.external_id.as_str()),
                    opt_text(lead.name.as_deref()),
                    opt_text(lead.phone.as_deref()),
                    text(lead.question.as_str()),
                    text(lead.created_at.to_rfc3339()),
                ]),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_inquiry_lead: {e}")))?;
        info!(external_id = %lead.external_id, lead_id = %lead.id, "Inquiry lead recorded");
        Ok(())
    }

    async fn list_inquiry_leads(
        &self,
        external_id: &str,
    ) -> Result<Vec<InquiryLead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, external_id, name, phone, question, created_at FROM inquiry_leads \
                 WHERE external_id = ?1 ORDER BY created_at ASC, rowid ASC",
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_inquiry_leads: {e}")))?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let parsed = (|| -> Result<InquiryLead, libsql::Error> {
                let id_str: String = row.get(0)?;
                let created_str: String = row.get(5)?;
                Ok(InquiryLead {
                    id: Uuid::parse_str(&id_str).unwrap_or_default(),
                    external_id: row.get(1)?,
                    name: row.get(2).ok(),
                    phone: row.get(3).ok(),
                    question: row.get(4)?,
                    created_at: parse_datetime(&created_str),
                })
            })();
            match parsed {
                Ok(lead) => leads.push(lead),
                Err(e) => warn!("Skipping inquiry lead row: {e}"),
            }
        }
        Ok(leads)
    }

    // ── Bank rates ──────────────────────────────────────────────────

    async fn list_bank_rates(&self) -> Result<Vec<BankRate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT bank_name, min_amount, max_amount, interest_rate FROM bank_rates ORDER BY id",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_bank_rates: {e}")))?;

        let mut rates = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let parsed = (|| -> Result<BankRate, libsql::Error> {
                Ok(BankRate {
                    bank_name: row.get(0)?,
                    min_amount: row.get(1)?,
                    max_amount: row.get(2).ok(),
                    interest_rate: row.get(3)?,
                })
            })();
            match parsed {
                Ok(rate) => rates.push(rate),
                Err(e) => warn!("Skipping bank rate row: {e}"),
            }
        }
        Ok(rates)
    }

    async fn insert_bank_rate(&self, rate: &BankRate) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(INSERT_RATE_SQL, params_from_iter(rate_values(rate)))
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_bank_rate: {e}")))?;
        Ok(())
    }

    async fn replace_bank_rates(&self, rates: &[BankRate]) -> Result<usize, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_bank_rates begin: {e}")))?;
        let written = async {
            tx.execute("DELETE FROM bank_rates", ())
                .await
                .map_err(|e| DatabaseError::Query(format!("replace_bank_rates clear: {e}")))?;
            for rate in rates {
                tx.execute(INSERT_RATE_SQL, params_from_iter(rate_values(rate)))
                    .await
                    .map_err(|e| DatabaseError::Query(format!("replace_bank_rates insert: {e}")))?;
            }
            Ok::<(), DatabaseError>(())
        }
        .await;
        finish_transaction(tx, written, "replace_bank_rates").await?;
        info!(count = rates.len(), "Bank rates replaced");
        Ok(rates.len())
    }

    // ── Chat logs ───────────────────────────────────────────────────

    async fn append_chat_log(
        &self,
        external_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO chat_logs (id, external_id, question, answer, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    external_id,
                    question,
                    answer,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_chat_log: {e}")))?;
        Ok(())
    }

    async fn list_chat_logs(
        &self,
        external_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, external_id, question, answer, created_at FROM chat_logs \
                 WHERE external_id = ?1 ORDER BY created_at ASC, rowid ASC LIMIT ?2",
                params![external_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_chat_logs: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id_str: String = row.get(0).unwrap_or_default();
            let created_str: String = row.get(4).unwrap_or_default();
            entries.push(ChatLogEntry {
                id: Uuid::parse_str(&id_str).unwrap_or_default(),
                external_id: row.get(1).unwrap_or_default(),
                question: row.get(2).unwrap_or_default(),
                answer: row.get(3).unwrap_or_default(),
                created_at: parse_datetime(&created_str),
            });
        }
        Ok(entries)
    }
}
