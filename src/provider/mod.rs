//! Task Provider adapter: wire types, the client trait and the pure
//! record → provider payload mapping.

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{EntityRef, Membership, TaskRecord};

// ─── Wire types ───────────────────────────────────────────────────────────────

/// `{id, name}` reference as the provider returns it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderRef {
    #[serde(alias = "gid")]
    pub id: String,
    pub name: String,
}

impl From<ProviderRef> for EntityRef {
    fn from(r: ProviderRef) -> Self {
        Self {
            id: r.id,
            name: r.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    #[serde(alias = "gid")]
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// A task as the provider reports it. This is the authoritative state the
/// local record is derived from.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTask {
    #[serde(alias = "gid")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub due_on: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub workspace: Option<ProviderRef>,
    #[serde(default)]
    pub projects: Vec<ProviderRef>,
    pub assignee: Option<ProviderRef>,
    #[serde(default)]
    pub followers: Vec<ProviderRef>,
    #[serde(default)]
    pub tags: Vec<ProviderRef>,
}

impl ProviderTask {
    /// Derive the durable record from the provider's response, attaching the
    /// originating alert when the task came through the alert flow.
    pub fn into_record(self, alert_id: Option<String>) -> TaskRecord {
        TaskRecord {
            id: self.id,
            name: self.name,
            notes: self.notes,
            completed: self.completed,
            created_at: self.created_at,
            due_on: self.due_on,
            completed_at: self.completed_at,
            workspace: self.workspace.map(Into::into),
            projects: self.projects.into_iter().map(Into::into).collect(),
            assignee: self.assignee.map(Into::into),
            followers: self.followers.into_iter().map(Into::into).collect(),
            tags: self.tags.into_iter().map(Into::into).collect(),
            alert_id,
        }
    }
}

/// Creation payload.
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub name: String,
    pub notes: String,
    pub workspace: String,
    /// All of the template's locations go on this one task.
    pub memberships: Vec<Membership>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<NaiveDate>,
}

/// Partial update payload. Only the set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<NaiveDate>,
}

/// The provider-shaped payload for a stored record, used when compensation
/// pushes the last known-good state back after a failed local write.
pub fn task_fields_from_record(record: &TaskRecord) -> TaskFields {
    TaskFields {
        name: Some(record.name.clone()),
        notes: Some(record.notes.clone()),
        completed: Some(record.completed),
        due_on: record.due_on,
    }
}

// ─── Client trait ─────────────────────────────────────────────────────────────

#[async_trait]
pub trait TaskProviderClient: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> Result<ProviderTask>;

    async fn update_task(&self, id: &str, fields: &TaskFields) -> Result<ProviderTask>;

    async fn delete_task(&self, id: &str) -> Result<()>;

    async fn get_current_user(&self) -> Result<ProviderUser>;

    async fn list_workspaces(&self) -> Result<Vec<ProviderRef>>;

    async fn list_projects(&self, workspace_id: &str) -> Result<Vec<ProviderRef>>;
}
