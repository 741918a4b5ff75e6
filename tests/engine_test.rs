//! Integration tests for the synchronization engine.
//!
//! A recording mock stands in for the Task Provider, the real SQLite stores
//! back the local mirror, and a frozen clock makes occurrence timestamps
//! deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use alertbridge::error::{BridgeError, Result};
use alertbridge::model::{Alert, AlertEvent, AlertTemplate, Membership, TaskRecord};
use alertbridge::provider::{
    NewTask, ProviderRef, ProviderTask, ProviderUser, TaskFields, TaskProviderClient,
};
use alertbridge::records::{SqliteRecordStore, TaskRecordStore};
use alertbridge::storage;
use alertbridge::sync::Clock;
use alertbridge::templates::{AlertTemplateStore, SqliteTemplateStore};
use alertbridge::SyncEngine;

/// 17:07:31 UTC == 14:07:31 at the -03:00 operating offset.
fn frozen_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 17, 7, 31).unwrap()
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// ─── Recording mock provider ─────────────────────────────────────────────────

#[derive(Default)]
struct MockProvider {
    calls: Mutex<Vec<String>>,
    tasks: Mutex<HashMap<String, ProviderTask>>,
    next_id: AtomicU64,
    fail_create: AtomicBool,
}

impl MockProvider {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn task(&self, id: &str) -> Option<ProviderTask> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskProviderClient for MockProvider {
    async fn create_task(&self, task: &NewTask) -> Result<ProviderTask> {
        self.calls.lock().unwrap().push("create".to_string());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BridgeError::provider(Some(500), "injected provider outage"));
        }
        // Yield so concurrent transitions get a chance to interleave if the
        // engine ever stopped serializing them.
        tokio::task::yield_now().await;
        let id = (1000 + self.next_id.fetch_add(1, Ordering::SeqCst)).to_string();
        let created = ProviderTask {
            id: id.clone(),
            name: task.name.clone(),
            notes: task.notes.clone(),
            completed: false,
            created_at: Some(frozen_now()),
            due_on: task.due_on,
            completed_at: None,
            workspace: Some(ProviderRef {
                id: task.workspace.clone(),
                name: "Chaordic".to_string(),
            }),
            projects: task
                .memberships
                .iter()
                .map(|m| ProviderRef {
                    id: m.project.clone(),
                    name: format!("project {}", m.project),
                })
                .collect(),
            assignee: None,
            followers: vec![],
            tags: task
                .tags
                .iter()
                .map(|t| ProviderRef {
                    id: format!("tag-{t}"),
                    name: t.clone(),
                })
                .collect(),
        };
        self.tasks.lock().unwrap().insert(id, created.clone());
        Ok(created)
    }

    async fn update_task(&self, id: &str, fields: &TaskFields) -> Result<ProviderTask> {
        self.calls.lock().unwrap().push(format!("update:{id}"));
        tokio::task::yield_now().await;
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| BridgeError::provider(Some(404), format!("task {id} not found")))?;
        if let Some(name) = &fields.name {
            task.name = name.clone();
        }
        if let Some(notes) = &fields.notes {
            task.notes = notes.clone();
        }
        if let Some(due_on) = fields.due_on {
            task.due_on = Some(due_on);
        }
        if let Some(completed) = fields.completed {
            task.completed = completed;
            task.completed_at = completed.then(frozen_now);
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("delete:{id}"));
        self.tasks.lock().unwrap().remove(id);
        Ok(())
    }

    async fn get_current_user(&self) -> Result<ProviderUser> {
        self.calls.lock().unwrap().push("users/me".to_string());
        Ok(ProviderUser {
            id: "u1".to_string(),
            name: "bridge bot".to_string(),
            email: None,
        })
    }

    async fn list_workspaces(&self) -> Result<Vec<ProviderRef>> {
        self.calls.lock().unwrap().push("workspaces".to_string());
        Ok(vec![
            ProviderRef {
                id: "2653227806782".to_string(),
                name: "Chaordic".to_string(),
            },
            ProviderRef {
                id: "9906087654".to_string(),
                name: "Sandbox".to_string(),
            },
        ])
    }

    async fn list_projects(&self, workspace_id: &str) -> Result<Vec<ProviderRef>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("projects:{workspace_id}"));
        Ok(vec![ProviderRef {
            id: "24457451196652".to_string(),
            name: "devs-atd".to_string(),
        }])
    }
}

// ─── Failure-injecting record store ──────────────────────────────────────────

struct FlakyRecordStore {
    inner: SqliteRecordStore,
    fail_insert: AtomicBool,
    fail_update: AtomicBool,
    fail_remove: AtomicBool,
}

impl FlakyRecordStore {
    fn new(inner: SqliteRecordStore) -> Self {
        Self {
            inner,
            fail_insert: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TaskRecordStore for FlakyRecordStore {
    async fn find_by_alert_id(&self, alert_id: &str) -> Result<Option<TaskRecord>> {
        self.inner.find_by_alert_id(alert_id).await
    }

    async fn get(&self, id: &str) -> Result<TaskRecord> {
        self.inner.get(id).await
    }

    async fn insert(&self, record: &TaskRecord) -> Result<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(BridgeError::store("injected insert failure"));
        }
        self.inner.insert(record).await
    }

    async fn update(&self, record: &TaskRecord) -> Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(BridgeError::store("injected update failure"));
        }
        self.inner.update(record).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(BridgeError::store("injected remove failure"));
        }
        self.inner.remove(id).await
    }

    async fn list(&self) -> Result<Vec<TaskRecord>> {
        self.inner.list().await
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
    engine: SyncEngine,
    provider: Arc<MockProvider>,
    templates: Arc<SqliteTemplateStore>,
    records: Arc<FlakyRecordStore>,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");
    let pool = storage::connect(path.to_str().unwrap()).await.unwrap();
    let templates = Arc::new(SqliteTemplateStore::new(pool.clone()));
    let records = Arc::new(FlakyRecordStore::new(SqliteRecordStore::new(pool)));
    let provider = Arc::new(MockProvider::default());
    let engine = SyncEngine::new(
        templates.clone(),
        records.clone(),
        provider.clone(),
        "2653227806782".to_string(),
        FixedOffset::west_opt(3 * 3600).unwrap(),
        Arc::new(FixedClock(frozen_now())),
    );
    Harness {
        engine,
        provider,
        templates,
        records,
        _dir: dir,
    }
}

fn crash_template() -> AlertTemplate {
    AlertTemplate {
        id: "alert.routine.full.crash".to_string(),
        description: "full-routine crash alerts".to_string(),
        memberships: vec![
            Membership {
                project: "24457451196652".to_string(),
                section: "24457451196655".to_string(),
            },
            Membership {
                project: "23236706094881".to_string(),
                section: "909056654431347".to_string(),
            },
        ],
        tags: vec!["incident".to_string()],
        due_in_days: 2,
    }
}

fn crash_alert(count: u32) -> Alert {
    Alert {
        id: "alert-1".to_string(),
        api_key: "searchapi".to_string(),
        alert_type: "alert.routine.full.crash".to_string(),
        count,
        message: "full routine crashed".to_string(),
    }
}

// ─── Creation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_alert_type_creates_nothing() {
    let h = harness().await;
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;

    assert!(h.provider.calls().is_empty());
    assert!(h.records.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_alert_payload_is_dropped() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();

    let mut alert = crash_alert(1);
    alert.message.clear();
    h.engine.handle_event(AlertEvent::Created(alert)).await;

    assert!(h.provider.calls().is_empty());
    assert!(h.records.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn created_alert_becomes_one_task_with_all_memberships() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;

    assert_eq!(h.provider.calls(), vec!["create"]);
    let all = h.records.list().await.unwrap();
    assert_eq!(all.len(), 1);
    let record = &all[0];
    assert_eq!(record.name, "[1x] [searchapi] full routine crashed");
    assert_eq!(record.notes, "full routine crashed");
    assert_eq!(record.alert_id.as_deref(), Some("alert-1"));
    assert!(!record.completed);
    // Both template memberships landed on the single task.
    assert_eq!(record.projects.len(), 2);
    assert_eq!(record.projects[0].id, "24457451196652");
    // Due date: 2024-03-01 local + 2 days.
    assert_eq!(record.due_on, NaiveDate::from_ymd_opt(2024, 3, 3));
    assert_eq!(record.tags[0].name, "incident");
}

#[tokio::test]
async fn duplicate_created_event_is_suppressed() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;

    assert_eq!(h.provider.calls(), vec!["create"]);
    assert_eq!(h.records.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn provider_outage_fails_creation_atomically() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.provider.fail_create.store(true, Ordering::SeqCst);

    // Event path: swallowed, nothing persisted.
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;
    assert!(h.records.list().await.unwrap().is_empty());

    // Direct action: the ProviderError propagates.
    let err = h
        .engine
        .create_task(NewTask {
            name: "manual".to_string(),
            notes: String::new(),
            workspace: "2653227806782".to_string(),
            memberships: vec![],
            tags: vec![],
            due_on: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Provider {
            status: Some(500),
            ..
        }
    ));
    assert!(h.records.list().await.unwrap().is_empty());
}

// ─── Occurrence merge ────────────────────────────────────────────────────────

#[tokio::test]
async fn updated_alert_folds_occurrences_into_the_task() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;
    h.engine.handle_event(AlertEvent::Updated(crash_alert(2))).await;

    let record = h
        .records
        .find_by_alert_id("alert-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "[2x] [searchapi] full routine crashed");
    assert_eq!(
        record.notes,
        "Alert occurred 2x.\nLast at 01/03/2024 14:07:31.\n-----\nfull routine crashed"
    );

    // A third occurrence rewrites the block instead of stacking another.
    h.engine.handle_event(AlertEvent::Updated(crash_alert(3))).await;
    let record = h
        .records
        .find_by_alert_id("alert-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "[3x] [searchapi] full routine crashed");
    assert_eq!(
        record.notes,
        "Alert occurred 3x.\nLast at 01/03/2024 14:07:31.\n-----\nfull routine crashed"
    );

    // Provider and mirror agree.
    let remote = h.provider.task(&record.id).unwrap();
    assert_eq!(remote.name, record.name);
    assert_eq!(remote.notes, record.notes);
}

#[tokio::test]
async fn updated_without_open_record_is_a_noop() {
    let h = harness().await;
    h.engine.handle_event(AlertEvent::Updated(crash_alert(2))).await;

    assert!(h.provider.calls().is_empty());
    assert!(h.records.list().await.unwrap().is_empty());
}

// ─── Closing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn closed_alert_completes_the_task_and_keeps_the_record() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;
    h.engine.handle_event(AlertEvent::Closed(crash_alert(1))).await;

    let all = h.records.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].completed);
    assert!(all[0].completed_at.is_some());
    // Closed records no longer track the alert...
    assert!(h.records.find_by_alert_id("alert-1").await.unwrap().is_none());

    // ...so a fresh created event starts a new task.
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;
    assert_eq!(h.records.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn closed_without_open_record_is_a_noop() {
    let h = harness().await;
    h.engine.handle_event(AlertEvent::Closed(crash_alert(1))).await;

    assert!(h.provider.calls().is_empty());
    assert!(h.records.list().await.unwrap().is_empty());
}

// ─── Two-phase write discipline ──────────────────────────────────────────────

#[tokio::test]
async fn failed_local_insert_rolls_back_the_provider_task() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.records.fail_insert.store(true, Ordering::SeqCst);

    let err = h
        .engine
        .create_task(NewTask {
            name: "manual".to_string(),
            notes: String::new(),
            workspace: "2653227806782".to_string(),
            memberships: vec![],
            tags: vec![],
            due_on: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Store { .. }));
    // Compensation: the just-created provider task was deleted again.
    assert_eq!(h.provider.calls(), vec!["create", "delete:1000"]);
    assert_eq!(h.provider.task_count(), 0);
    assert!(h.records.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_local_update_restores_last_known_good_provider_state() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;
    let record = h
        .records
        .find_by_alert_id("alert-1")
        .await
        .unwrap()
        .unwrap();

    h.records.fail_update.store(true, Ordering::SeqCst);
    let err = h
        .engine
        .update_task(
            &record.id,
            &TaskFields {
                name: Some("renamed".to_string()),
                ..TaskFields::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Store { .. }));
    // The failed update was pushed back over: provider shows the old name.
    let remote = h.provider.task(&record.id).unwrap();
    assert_eq!(remote.name, "[1x] [searchapi] full routine crashed");
    let calls = h.provider.calls();
    assert_eq!(
        calls,
        vec![
            "create".to_string(),
            format!("update:{}", record.id),
            format!("update:{}", record.id),
        ]
    );
}

#[tokio::test]
async fn remove_task_deletes_provider_first_then_record() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;
    let record = h
        .records
        .find_by_alert_id("alert-1")
        .await
        .unwrap()
        .unwrap();

    h.engine.remove_task(&record.id).await.unwrap();
    assert_eq!(h.provider.task_count(), 0);
    assert!(h.records.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_local_remove_surfaces_the_orphaned_record() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;
    let record = h
        .records
        .find_by_alert_id("alert-1")
        .await
        .unwrap()
        .unwrap();

    h.records.fail_remove.store(true, Ordering::SeqCst);
    let err = h.engine.remove_task(&record.id).await.unwrap_err();

    assert!(matches!(err, BridgeError::Store { .. }));
    // No compensation for deletes: the provider task is gone, the local
    // record remains for manual cleanup.
    assert_eq!(h.provider.task_count(), 0);
    assert_eq!(h.records.list().await.unwrap().len(), 1);
}

// ─── Provider surface ────────────────────────────────────────────────────────

#[tokio::test]
async fn find_workspace_matches_by_name() {
    let h = harness().await;
    let workspace = h.engine.find_workspace("Sandbox").await.unwrap();
    assert_eq!(workspace.id, "9906087654");

    let err = h.engine.find_workspace("Nonexistent").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn list_projects_queries_the_configured_workspace() {
    let h = harness().await;
    let projects = h.engine.list_projects().await.unwrap();
    assert_eq!(projects[0].name, "devs-atd");
    assert_eq!(h.provider.calls(), vec!["projects:2653227806782"]);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_update_and_close_serialize_per_alert() {
    let h = harness().await;
    h.templates.put(&crash_template()).await.unwrap();
    h.engine.handle_event(AlertEvent::Created(crash_alert(1))).await;

    tokio::join!(
        h.engine.handle_event(AlertEvent::Updated(crash_alert(2))),
        h.engine.handle_event(AlertEvent::Closed(crash_alert(1))),
    );

    let record = h.records.list().await.unwrap().pop().unwrap();
    assert!(record.completed);

    let merged_name = "[2x] [searchapi] full routine crashed";
    let merged_notes =
        "Alert occurred 2x.\nLast at 01/03/2024 14:07:31.\n-----\nfull routine crashed";
    let original_name = "[1x] [searchapi] full routine crashed";
    let original_notes = "full routine crashed";

    // One of the two valid orderings, never a half-applied hybrid:
    // update-then-close merges before completing; close-then-update makes
    // the update a no-op against the closed record.
    let update_first = record.name == merged_name && record.notes == merged_notes;
    let close_first = record.name == original_name && record.notes == original_notes;
    assert!(
        update_first || close_first,
        "hybrid state: name={:?} notes={:?}",
        record.name,
        record.notes
    );
}
