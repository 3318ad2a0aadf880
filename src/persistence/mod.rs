//! Persistence layer: lifecycle flags, provisioned version and run history

pub mod store;

pub use store::SqliteStore;

use crate::core::{LifecycleEvent, LifecycleState, StepResult};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Key of the version the runtime environment was last provisioned at
pub const PROVISIONED_VERSION_KEY: &str = "tvault-contego.provisioned-version";

/// Summary of one handled lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Event that triggered the run
    pub event: LifecycleEvent,

    /// State before the event was handled
    pub state_before: LifecycleState,

    /// State after the event was handled
    pub state_after: LifecycleState,

    /// Whether the run succeeded
    pub ok: bool,

    /// Outcome message
    pub message: String,

    /// Step that failed, if any
    pub failed_step: Option<String>,

    /// When handling started
    pub started_at: DateTime<Utc>,

    /// When handling completed
    pub completed_at: DateTime<Utc>,
}

impl RunSummary {
    /// Build a summary from the outcome of a handled event
    pub fn new(
        event: LifecycleEvent,
        state_before: LifecycleState,
        state_after: LifecycleState,
        result: &StepResult,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            event,
            state_before,
            state_after,
            ok: result.ok,
            message: result.message.clone(),
            failed_step: result.step.clone(),
            started_at,
            completed_at: Utc::now(),
        }
    }
}

/// Trait for persistence backends
///
/// Flags mirror the event framework's named boolean markers; values hold
/// small strings such as the provisioned version.
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Whether a named flag is set
    async fn flag(&self, name: &str) -> Result<bool>;

    /// Set or clear a named flag
    async fn set_flag(&self, name: &str, value: bool) -> Result<()>;

    /// Read a stored value
    async fn value(&self, key: &str) -> Result<Option<String>>;

    /// Store a value; `None` removes it
    async fn set_value(&self, key: &str, value: Option<&str>) -> Result<()>;

    /// Save a run summary
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// Most recent runs first
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    flags: tokio::sync::RwLock<HashSet<String>>,
    values: tokio::sync::RwLock<HashMap<String, String>>,
    runs: tokio::sync::RwLock<Vec<RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            flags: tokio::sync::RwLock::new(HashSet::new()),
            values: tokio::sync::RwLock::new(HashMap::new()),
            runs: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn flag(&self, name: &str) -> Result<bool> {
        Ok(self.flags.read().await.contains(name))
    }

    async fn set_flag(&self, name: &str, value: bool) -> Result<()> {
        let mut flags = self.flags.write().await;
        if value {
            flags.insert(name.to_string());
        } else {
            flags.remove(name);
        }
        Ok(())
    }

    async fn value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut values = self.values.write().await;
        match value {
            Some(v) => {
                values.insert(key.to_string(), v.to_string());
            }
            None => {
                values.remove(key);
            }
        }
        Ok(())
    }

    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.push(run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.iter().find(|r| r.run_id == run_id).cloned())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }
}
