//! The `TaskStore` boundary (§6): task CRUD plus a work queue, owned by
//! whatever persistence layer backs a deployment. Only an in-memory
//! implementation lives in the core; a Redis-backed store is an
//! external collaborator.

use async_trait::async_trait;
use cortex_core::{Error, Result, ScanTask};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: ScanTask) -> Result<()>;

    /// `Err(Error::TaskNotFound(_))` must be distinguishable from any
    /// other failure.
    async fn get_task(&self, id: Uuid) -> Result<ScanTask>;

    /// Overwrites the stored representation in full.
    async fn update_task(&self, task: ScanTask) -> Result<()>;

    async fn push_to_queue(&self, task_id: Uuid) -> Result<()>;

    /// Blocks until a task id is available; no deadline from the
    /// caller's side.
    async fn pop_from_queue(&self) -> Result<Uuid>;
}

/// In-memory `TaskStore`, grounded in the same "`RwLock` over a plain
/// collection, no I/O" design as the scanner's result storage.
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, ScanTask>>,
    queue_tx: mpsc::UnboundedSender<Uuid>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            tasks: RwLock::new(HashMap::new()),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, task: ScanTask) -> Result<()> {
        self.tasks.write().await.insert(task.id, task);
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<ScanTask> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    async fn update_task(&self, task: ScanTask) -> Result<()> {
        self.tasks.write().await.insert(task.id, task);
        Ok(())
    }

    async fn push_to_queue(&self, task_id: Uuid) -> Result<()> {
        self.queue_tx
            .send(task_id)
            .map_err(|e| Error::Store(format!("queue closed: {e}")))
    }

    async fn pop_from_queue(&self) -> Result<Uuid> {
        self.queue_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| Error::Store("queue closed".to_string()))
    }
}
