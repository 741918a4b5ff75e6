// SPDX-License-Identifier: MIT
//! The reconciliation engine.
//!
//! Every state transition that touches both systems follows the same
//! two-phase discipline: the provider write happens first, and the local
//! write is derived from the provider's authoritative response, never from
//! the caller's input. A local failure after a successful provider write
//! triggers a compensating provider action. A failed compensation means the
//! two systems have diverged and an operator must reconcile them manually,
//! so it is logged at a higher severity than the failure itself.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset};
use tracing::{debug, error, info, warn};

use super::keyed::KeyedLocks;
use super::occurrence;
use super::Clock;
use crate::error::{BridgeError, Result};
use crate::model::{Alert, AlertEvent, AlertTemplate, TaskRecord};
use crate::provider::{
    task_fields_from_record, NewTask, ProviderRef, ProviderUser, TaskFields, TaskProviderClient,
};
use crate::records::TaskRecordStore;
use crate::templates::AlertTemplateStore;

pub struct SyncEngine {
    templates: Arc<dyn AlertTemplateStore>,
    records: Arc<dyn TaskRecordStore>,
    provider: Arc<dyn TaskProviderClient>,
    /// Provider workspace every task is created in.
    workspace: String,
    /// The provider's operating timezone; occurrence timestamps are
    /// formatted in this offset.
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
}

impl SyncEngine {
    pub fn new(
        templates: Arc<dyn AlertTemplateStore>,
        records: Arc<dyn TaskRecordStore>,
        provider: Arc<dyn TaskProviderClient>,
        workspace: String,
        offset: FixedOffset,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            templates,
            records,
            provider,
            workspace,
            offset,
            clock,
            locks: KeyedLocks::default(),
        }
    }

    fn now_local(&self) -> DateTime<FixedOffset> {
        self.clock.now_utc().with_timezone(&self.offset)
    }

    // ─── Event entry point ────────────────────────────────────────────────────

    /// Process one alert lifecycle event.
    ///
    /// Transitions for the same alert id are serialized; events for
    /// different ids run in parallel. Errors are isolated per event and
    /// never fault the dispatcher; delivery-level retry is the event
    /// source's responsibility.
    pub async fn handle_event(&self, event: AlertEvent) {
        let alert_id = event.alert().id.clone();
        let kind = event.kind();
        let _guard = self.locks.acquire(&alert_id).await;
        let outcome = match &event {
            AlertEvent::Created(alert) => self.alert_created(alert).await,
            AlertEvent::Updated(alert) => self.alert_updated(alert).await,
            AlertEvent::Closed(alert) => self.alert_closed(alert).await,
        };
        if let Err(err) = outcome {
            warn!(alert_id = %alert_id, event = kind, error = %err, "alert event dropped");
        }
    }

    // ─── Transitions ──────────────────────────────────────────────────────────

    async fn alert_created(&self, alert: &Alert) -> Result<()> {
        alert.validate()?;
        if let Some(existing) = self.records.find_by_alert_id(&alert.id).await? {
            debug!(
                alert_id = %alert.id,
                task_id = %existing.id,
                "open task already tracks this alert — duplicate create ignored"
            );
            return Ok(());
        }
        let template = match self.templates.get(&alert.alert_type).await {
            Ok(template) => template,
            Err(err) if err.is_not_found() => {
                debug!(
                    alert_id = %alert.id,
                    alert_type = %alert.alert_type,
                    "no routing template — alert not actionable"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let task = self.task_from_alert(alert, &template);
        let record = self.create_tracked(task, Some(&alert.id)).await?;
        info!(alert_id = %alert.id, task_id = %record.id, "task created for alert");
        Ok(())
    }

    async fn alert_updated(&self, alert: &Alert) -> Result<()> {
        alert.validate()?;
        let Some(record) = self.records.find_by_alert_id(&alert.id).await? else {
            info!(alert_id = %alert.id, "no open task for updated alert — ignored");
            return Ok(());
        };
        let now = self.now_local();
        let fields = TaskFields {
            name: Some(occurrence::tag_name(&record.name, alert.count)),
            notes: Some(occurrence::merge_notes(&record.notes, alert.count, now)),
            ..TaskFields::default()
        };
        let merged = self.update_tracked(&record.id, &fields).await?;
        info!(
            alert_id = %alert.id,
            task_id = %merged.id,
            count = alert.count,
            "occurrence folded into task"
        );
        Ok(())
    }

    async fn alert_closed(&self, alert: &Alert) -> Result<()> {
        alert.validate()?;
        let Some(record) = self.records.find_by_alert_id(&alert.id).await? else {
            info!(alert_id = %alert.id, "no open task for closed alert — ignored");
            return Ok(());
        };
        let fields = TaskFields {
            completed: Some(true),
            ..TaskFields::default()
        };
        let closed = self.update_tracked(&record.id, &fields).await?;
        info!(alert_id = %alert.id, task_id = %closed.id, "task closed");
        Ok(())
    }

    /// Routing: the template decides where the task lands and when it is
    /// due. One task carries all of the template's memberships.
    fn task_from_alert(&self, alert: &Alert, template: &AlertTemplate) -> NewTask {
        let now = self.now_local();
        NewTask {
            // The occurrence tag leads so later merges can rewrite it.
            name: format!("[{}x] [{}] {}", alert.count, alert.api_key, alert.message),
            notes: alert.message.clone(),
            workspace: self.workspace.clone(),
            memberships: template.memberships.clone(),
            tags: template.tags.clone(),
            due_on: Some(now.date_naive() + Duration::days(template.due_in_days)),
        }
    }

    // ─── Direct actions ───────────────────────────────────────────────────────
    //
    // Unlike event transitions these propagate their errors to the caller.

    /// Create a task outside the alert flow (no alert back-reference).
    pub async fn create_task(&self, task: NewTask) -> Result<TaskRecord> {
        self.create_tracked(task, None).await
    }

    /// Push a partial update to the provider and persist its response.
    pub async fn update_task(&self, id: &str, fields: &TaskFields) -> Result<TaskRecord> {
        self.update_tracked(id, fields).await
    }

    /// Mark a task completed on both sides.
    pub async fn close_task(&self, id: &str) -> Result<TaskRecord> {
        let fields = TaskFields {
            completed: Some(true),
            ..TaskFields::default()
        };
        self.update_tracked(id, &fields).await
    }

    /// Delete the provider task, then the local record. There is no
    /// compensating action: when the local delete fails the orphaned record
    /// is surfaced for manual cleanup rather than silently hidden.
    pub async fn remove_task(&self, id: &str) -> Result<()> {
        self.provider.delete_task(id).await?;
        match self.records.remove(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if matches!(err, BridgeError::Store { .. }) {
                    error!(
                        task_id = %id,
                        error = %err,
                        "provider task deleted but the local record remains — manual cleanup required"
                    );
                }
                Err(err)
            }
        }
    }

    // ─── Provider surface ─────────────────────────────────────────────────────

    /// The user the provider token authenticates as.
    pub async fn current_user(&self) -> Result<ProviderUser> {
        self.provider.get_current_user().await
    }

    /// Find a workspace by its display name.
    pub async fn find_workspace(&self, name: &str) -> Result<ProviderRef> {
        self.provider
            .list_workspaces()
            .await?
            .into_iter()
            .find(|workspace| workspace.name == name)
            .ok_or_else(|| BridgeError::NotFound(format!("workspace {name}")))
    }

    /// Projects in the configured workspace.
    pub async fn list_projects(&self) -> Result<Vec<ProviderRef>> {
        self.provider.list_projects(&self.workspace).await
    }

    // ─── Two-phase writes ─────────────────────────────────────────────────────

    async fn create_tracked(&self, task: NewTask, alert_id: Option<&str>) -> Result<TaskRecord> {
        let provider_task = self.provider.create_task(&task).await?;
        let record = provider_task.into_record(alert_id.map(str::to_string));
        if let Err(store_err) = self.records.insert(&record).await {
            match self.provider.delete_task(&record.id).await {
                Ok(()) => warn!(
                    task_id = %record.id,
                    "local insert failed — created provider task rolled back"
                ),
                Err(comp_err) => error!(
                    task_id = %record.id,
                    error = %comp_err,
                    "compensation failed: provider task left behind — manual reconciliation required"
                ),
            }
            return Err(store_err);
        }
        Ok(record)
    }

    async fn update_tracked(&self, id: &str, fields: &TaskFields) -> Result<TaskRecord> {
        // Re-read instead of trusting any cached state; the provider
        // response carries everything but the alert back-reference.
        let current = self.records.get(id).await?;
        let provider_task = self.provider.update_task(id, fields).await?;
        let record = provider_task.into_record(current.alert_id.clone());
        if let Err(store_err) = self.records.update(&record).await {
            match self.records.get(id).await {
                Ok(known_good) => {
                    let rollback = task_fields_from_record(&known_good);
                    match self.provider.update_task(id, &rollback).await {
                        Ok(_) => warn!(
                            task_id = %id,
                            "local update failed — provider task restored to last known-good state"
                        ),
                        Err(comp_err) => error!(
                            task_id = %id,
                            error = %comp_err,
                            "compensation failed: provider and mirror diverged — manual reconciliation required"
                        ),
                    }
                }
                Err(read_err) => error!(
                    task_id = %id,
                    error = %read_err,
                    "compensation failed: could not re-read last known-good record — manual reconciliation required"
                ),
            }
            return Err(store_err);
        }
        Ok(record)
    }
}
