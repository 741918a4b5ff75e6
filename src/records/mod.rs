//! Durable local record of every task the engine has created.
//!
//! The store exclusively owns the durable state; the engine holds no cached
//! copies across invocations and re-reads before every mutation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::error::{BridgeError, Result};
use crate::model::{EntityRef, TaskRecord};

#[async_trait]
pub trait TaskRecordStore: Send + Sync {
    /// The open (non-completed) record tracking an alert, if any. Closed
    /// records are not returned; a new alert with the same id starts a new
    /// task.
    async fn find_by_alert_id(&self, alert_id: &str) -> Result<Option<TaskRecord>>;

    async fn get(&self, id: &str) -> Result<TaskRecord>;

    async fn insert(&self, record: &TaskRecord) -> Result<()>;

    /// Full-row replace by provider task id.
    async fn update(&self, record: &TaskRecord) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<TaskRecord>>;
}

// ─── SQLite implementation ────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
struct RecordRow {
    id: String,
    name: String,
    notes: String,
    completed: bool,
    created_at: Option<String>,
    due_on: Option<String>,
    completed_at: Option<String>,
    workspace: Option<String>,
    projects: String,
    assignee: Option<String>,
    followers: String,
    tags: String,
    alert_id: Option<String>,
}

fn parse_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| BridgeError::store(format!("timestamp {s:?}: {e}")))
    })
    .transpose()
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        s.parse::<NaiveDate>()
            .map_err(|e| BridgeError::store(format!("date {s:?}: {e}")))
    })
    .transpose()
}

impl RecordRow {
    fn into_record(self) -> Result<TaskRecord> {
        Ok(TaskRecord {
            name: self.name,
            notes: self.notes,
            completed: self.completed,
            created_at: parse_timestamp(self.created_at.as_deref())?,
            due_on: parse_date(self.due_on.as_deref())?,
            completed_at: parse_timestamp(self.completed_at.as_deref())?,
            workspace: self
                .workspace
                .as_deref()
                .map(serde_json::from_str::<EntityRef>)
                .transpose()?,
            projects: serde_json::from_str(&self.projects)?,
            assignee: self
                .assignee
                .as_deref()
                .map(serde_json::from_str::<EntityRef>)
                .transpose()?,
            followers: serde_json::from_str(&self.followers)?,
            tags: serde_json::from_str(&self.tags)?,
            alert_id: self.alert_id,
            id: self.id,
        })
    }
}

struct BoundFields {
    created_at: Option<String>,
    due_on: Option<String>,
    completed_at: Option<String>,
    workspace: Option<String>,
    projects: String,
    assignee: Option<String>,
    followers: String,
    tags: String,
}

fn bind_fields(record: &TaskRecord) -> Result<BoundFields> {
    Ok(BoundFields {
        created_at: record.created_at.map(|t| t.to_rfc3339()),
        due_on: record.due_on.map(|d| d.to_string()),
        completed_at: record.completed_at.map(|t| t.to_rfc3339()),
        workspace: record
            .workspace
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        projects: serde_json::to_string(&record.projects)?,
        assignee: record
            .assignee
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        followers: serde_json::to_string(&record.followers)?,
        tags: serde_json::to_string(&record.tags)?,
    })
}

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRecordStore for SqliteRecordStore {
    async fn find_by_alert_id(&self, alert_id: &str) -> Result<Option<TaskRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT * FROM task_records WHERE alert_id = ? AND completed = 0",
        )
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RecordRow::into_record).transpose()
    }

    async fn get(&self, id: &str) -> Result<TaskRecord> {
        let row: Option<RecordRow> = sqlx::query_as("SELECT * FROM task_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.into_record(),
            None => Err(BridgeError::NotFound(format!("task record {id}"))),
        }
    }

    async fn insert(&self, record: &TaskRecord) -> Result<()> {
        let f = bind_fields(record)?;
        sqlx::query(
            "INSERT INTO task_records
             (id, name, notes, completed, created_at, due_on, completed_at,
              workspace, projects, assignee, followers, tags, alert_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.notes)
        .bind(record.completed)
        .bind(&f.created_at)
        .bind(&f.due_on)
        .bind(&f.completed_at)
        .bind(&f.workspace)
        .bind(&f.projects)
        .bind(&f.assignee)
        .bind(&f.followers)
        .bind(&f.tags)
        .bind(&record.alert_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, record: &TaskRecord) -> Result<()> {
        let f = bind_fields(record)?;
        let affected = sqlx::query(
            "UPDATE task_records SET
               name = ?, notes = ?, completed = ?, created_at = ?, due_on = ?,
               completed_at = ?, workspace = ?, projects = ?, assignee = ?,
               followers = ?, tags = ?, alert_id = ?
             WHERE id = ?",
        )
        .bind(&record.name)
        .bind(&record.notes)
        .bind(record.completed)
        .bind(&f.created_at)
        .bind(&f.due_on)
        .bind(&f.completed_at)
        .bind(&f.workspace)
        .bind(&f.projects)
        .bind(&f.assignee)
        .bind(&f.followers)
        .bind(&f.tags)
        .bind(&record.alert_id)
        .bind(&record.id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(BridgeError::NotFound(format!("task record {}", record.id)));
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let affected = sqlx::query("DELETE FROM task_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(BridgeError::NotFound(format!("task record {id}")));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>> {
        let rows: Vec<RecordRow> =
            sqlx::query_as("SELECT * FROM task_records ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }
}
