//! Domain types: inbound alerts, routing templates and the durable task
//! record mirrored from the Task Provider.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

// ─── Alert ────────────────────────────────────────────────────────────────────

fn default_count() -> u32 {
    1
}

/// Inbound incident event. Immutable as received; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Correlation key. At most one open task exists per alert id.
    pub id: String,
    /// Source system tag, shown in the task title.
    pub api_key: String,
    /// Routing key into the template store.
    #[serde(rename = "type")]
    pub alert_type: String,
    /// Occurrence count reported by the alert source.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Free-text incident description.
    pub message: String,
}

impl Alert {
    /// Reject payloads missing the fields every transition depends on.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(BridgeError::Validation("alert id is empty".to_string()));
        }
        if self.alert_type.is_empty() {
            return Err(BridgeError::Validation("alert type is empty".to_string()));
        }
        if self.message.is_empty() {
            return Err(BridgeError::Validation("alert message is empty".to_string()));
        }
        Ok(())
    }
}

/// Alert lifecycle events, delivered at-least-once and unordered.
#[derive(Debug, Clone)]
pub enum AlertEvent {
    Created(Alert),
    Updated(Alert),
    Closed(Alert),
}

impl AlertEvent {
    pub fn alert(&self) -> &Alert {
        match self {
            Self::Created(a) | Self::Updated(a) | Self::Closed(a) => a,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Closed(_) => "closed",
        }
    }
}

// ─── AlertTemplate ────────────────────────────────────────────────────────────

/// A provider-side `{project, section}` location a task is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub project: String,
    pub section: String,
}

/// Routing template keyed by alert type. Created by an administrative
/// collaborator; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTemplate {
    /// Template id, equal to the alert type it routes.
    pub id: String,
    pub description: String,
    /// Where tasks for this alert type land. One task carries all of these.
    pub memberships: Vec<Membership>,
    /// Provider tag names attached to created tasks.
    pub tags: Vec<String>,
    /// Days from creation to the task due date.
    pub due_in_days: i64,
}

impl AlertTemplate {
    /// A template with no routing target is invalid and must be rejected at
    /// write time.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(BridgeError::Validation("template id is empty".to_string()));
        }
        if self.memberships.is_empty() {
            return Err(BridgeError::Validation(format!(
                "template {} has no memberships",
                self.id
            )));
        }
        Ok(())
    }
}

// ─── TaskRecord ───────────────────────────────────────────────────────────────

/// Denormalized snapshot of a provider-side entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
}

/// Durable local record of a provider task, keyed by the provider's task id.
/// Always derived from the provider's authoritative response, never from
/// caller input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The Task Provider's task id. There is no separate local id.
    pub id: String,
    pub name: String,
    pub notes: String,
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub due_on: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub workspace: Option<EntityRef>,
    pub projects: Vec<EntityRef>,
    pub assignee: Option<EntityRef>,
    pub followers: Vec<EntityRef>,
    pub tags: Vec<EntityRef>,
    /// Originating alert id. None for tasks created outside the alert flow.
    pub alert_id: Option<String>,
}
