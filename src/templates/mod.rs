//! Durable alert-type → routing-template store.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{BridgeError, Result};
use crate::model::{AlertTemplate, Membership};

/// Read side is all the engine needs; the write side serves the
/// administrative collaborator that curates routing.
#[async_trait]
pub trait AlertTemplateStore: Send + Sync {
    /// Look up the template registered for an alert type.
    /// [`BridgeError::NotFound`] on a miss; the creation flow treats that
    /// as "alert is not actionable".
    async fn get(&self, template_id: &str) -> Result<AlertTemplate>;

    /// Insert or replace a template. Rejects templates with no memberships.
    async fn put(&self, template: &AlertTemplate) -> Result<()>;

    async fn remove(&self, template_id: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<AlertTemplate>>;
}

// ─── SQLite implementation ────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
struct TemplateRow {
    id: String,
    description: String,
    memberships: String,
    tags: String,
    due_in_days: i64,
}

impl TemplateRow {
    fn into_template(self) -> Result<AlertTemplate> {
        Ok(AlertTemplate {
            id: self.id,
            description: self.description,
            memberships: serde_json::from_str::<Vec<Membership>>(&self.memberships)?,
            tags: serde_json::from_str::<Vec<String>>(&self.tags)?,
            due_in_days: self.due_in_days,
        })
    }
}

#[derive(Clone)]
pub struct SqliteTemplateStore {
    pool: SqlitePool,
}

impl SqliteTemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertTemplateStore for SqliteTemplateStore {
    async fn get(&self, template_id: &str) -> Result<AlertTemplate> {
        let row: Option<TemplateRow> =
            sqlx::query_as("SELECT * FROM alert_templates WHERE id = ?")
                .bind(template_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => row.into_template(),
            None => Err(BridgeError::NotFound(format!(
                "alert template {template_id}"
            ))),
        }
    }

    async fn put(&self, template: &AlertTemplate) -> Result<()> {
        template.validate()?;
        sqlx::query(
            "INSERT INTO alert_templates (id, description, memberships, tags, due_in_days)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               description = excluded.description,
               memberships = excluded.memberships,
               tags = excluded.tags,
               due_in_days = excluded.due_in_days",
        )
        .bind(&template.id)
        .bind(&template.description)
        .bind(serde_json::to_string(&template.memberships)?)
        .bind(serde_json::to_string(&template.tags)?)
        .bind(template.due_in_days)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, template_id: &str) -> Result<()> {
        let affected = sqlx::query("DELETE FROM alert_templates WHERE id = ?")
            .bind(template_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(BridgeError::NotFound(format!(
                "alert template {template_id}"
            )));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AlertTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as("SELECT * FROM alert_templates ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TemplateRow::into_template).collect()
    }
}
