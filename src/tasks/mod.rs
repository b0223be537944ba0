//! Async task dispatch boundary.
//!
//! Heavy cascading work (group deletion, merges, status syncs) is deferred
//! to out-of-band tasks owned by an external task runner. This module only
//! defines the job payloads and the dispatcher seam; submission is
//! fire-and-forget.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A job handed to the external task runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Cascading removal of one chunk of groups
    DeleteGroups {
        project_id: i32,
        object_ids: Vec<i64>,
        transaction_id: String,
    },
    /// Migrate events/environments/metadata from source groups into the
    /// primary, then delete the sources
    MergeGroups {
        project_id: i32,
        primary_id: i64,
        source_ids: Vec<i64>,
        transaction_id: String,
    },
    /// Propagate a status change to linked external trackers
    StatusSync { project_id: i32, group_id: i64 },
    /// Tell the similarity service to forget grouping records
    SeerDeleteHashes { group_ids: Vec<i64> },
}

/// Dispatcher seam for submitting tasks to the external runner
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(&self, task: Task);
}

/// Dispatcher that records submitted tasks, for tests and local runs
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<Task>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn dispatch(&self, task: Task) {
        log::debug!("Recorded task: {:?}", task);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}
