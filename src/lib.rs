//! alertbridge keeps incident alerts in step with tasks in an external
//! project-management provider.
//!
//! The core is the [`sync::SyncEngine`]: it consumes alert lifecycle events
//! (`created`, `updated`, `closed`) and drives two systems of record, the
//! remote Task Provider and a local SQLite mirror, through a provider-first
//! two-phase write with compensation, so the local record never claims
//! something the provider did not accept. Repeated alerts for the same
//! incident fold into an occurrence count on the existing task instead of
//! creating duplicates.
//!
//! Event delivery, the HTTP gateway and the webhook handshake live in the
//! embedding service; this crate only exposes the engine, its stores and the
//! provider client.

pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod records;
pub mod storage;
pub mod sync;
pub mod templates;

pub use error::{BridgeError, Result};
pub use sync::SyncEngine;

use std::sync::Arc;

use config::BridgeConfig;
use provider::http::HttpProviderClient;
use records::SqliteRecordStore;
use sync::SystemClock;
use templates::SqliteTemplateStore;

/// Fully wired engine plus the stores an embedding service needs direct
/// access to (template administration, record inspection).
pub struct Bridge {
    pub config: Arc<BridgeConfig>,
    pub templates: Arc<SqliteTemplateStore>,
    pub records: Arc<SqliteRecordStore>,
    pub engine: Arc<SyncEngine>,
}

impl Bridge {
    /// Open the local database, build the provider client from config and
    /// wire the engine. Does not touch the provider; the first remote call
    /// happens when an event or action needs one.
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        let offset = config.provider.operating_offset()?;
        let pool = storage::connect(&config.database.path).await?;
        let templates = Arc::new(SqliteTemplateStore::new(pool.clone()));
        let records = Arc::new(SqliteRecordStore::new(pool));
        let client = Arc::new(HttpProviderClient::new(&config.provider)?);
        let engine = Arc::new(SyncEngine::new(
            templates.clone(),
            records.clone(),
            client,
            config.provider.workspace.clone(),
            offset,
            Arc::new(SystemClock),
        ));
        Ok(Self {
            config: Arc::new(config),
            templates,
            records,
            engine,
        })
    }
}
