//! Task-queue driver (C6): a fixed pool of long-lived consumer loops
//! that pull tasks from a `TaskStore`, run the orchestrator, and
//! persist the lifecycle transitions.

use crate::orchestrator::{self, WorkerFn};
use crate::task_store::TaskStore;
use crate::{connect, syn, udp};
use cortex_core::{parse_port_range, Mode, ProbeCatalogue};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, warn};

const CONNECT_WORKERS: usize = 100;
const SYN_WORKERS: usize = 50;
const UDP_WORKERS: usize = 50;
const POP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Process-wide once-guards for the two restricted modes. The first
/// task of a mode pays the init cost; every later task of that mode
/// sees the same cached `Result`, including a cached failure.
static SYN_INIT: OnceLock<Result<WorkerFn, String>> = OnceLock::new();
static UDP_INIT: OnceLock<Result<WorkerFn, String>> = OnceLock::new();

fn resolve_worker(mode: Mode) -> Result<(WorkerFn, usize), String> {
    match mode {
        Mode::Connect => Ok((connect::worker(), CONNECT_WORKERS)),
        Mode::Syn => SYN_INIT
            .get_or_init(|| syn::init().map_err(|e| e.to_string()))
            .clone()
            .map(|f| (f, SYN_WORKERS)),
        Mode::Udp => UDP_INIT
            .get_or_init(|| Ok(udp::worker()))
            .clone()
            .map(|f| (f, UDP_WORKERS)),
    }
}

/// Runs `consumer_count` long-lived consumer loops against `store`,
/// each repeating the pop -> run -> persist cycle until the process
/// exits. Returns once every consumer loop has (in practice, never)
/// terminated -- intended to be spawned and left running.
pub async fn run(store: Arc<dyn TaskStore>, catalogue: Arc<ProbeCatalogue>, consumer_count: usize) {
    let mut handles = Vec::with_capacity(consumer_count);
    for _ in 0..consumer_count {
        let store = Arc::clone(&store);
        let catalogue = Arc::clone(&catalogue);
        handles.push(tokio::spawn(consumer_loop(store, catalogue)));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn consumer_loop(store: Arc<dyn TaskStore>, catalogue: Arc<ProbeCatalogue>) {
    loop {
        process_one(&store, &catalogue).await;
    }
}

/// Processes exactly one pop-run-persist cycle. Split out from
/// `consumer_loop` so tests can drive a single iteration.
pub async fn process_one(store: &Arc<dyn TaskStore>, catalogue: &Arc<ProbeCatalogue>) {
    let task_id = match store.pop_from_queue().await {
        Ok(id) => id,
        Err(e) => {
            warn!("pop_from_queue failed: {e}");
            tokio::time::sleep(POP_RETRY_DELAY).await;
            return;
        }
    };

    let mut task = match store.get_task(task_id).await {
        Ok(task) => task,
        Err(cortex_core::Error::TaskNotFound(_)) => return,
        Err(e) => {
            warn!("get_task({task_id}) failed: {e}");
            return;
        }
    };

    task.start();
    if let Err(e) = store.update_task(task.clone()).await {
        warn!("update_task({task_id}) failed transitioning to running: {e}");
        return;
    }

    let (start, end) = match parse_port_range(&task.ports) {
        Ok(range) => range,
        Err(e) => {
            task.fail(e.to_string());
            if let Err(e) = store.update_task(task).await {
                error!("update_task({task_id}) failed persisting failure: {e}");
            }
            return;
        }
    };

    let (worker_fn, worker_count) = match resolve_worker(task.mode) {
        Ok(pair) => pair,
        Err(init_error) => {
            task.fail(init_error);
            if let Err(e) = store.update_task(task).await {
                error!("update_task({task_id}) failed persisting mode-init failure: {e}");
            }
            return;
        }
    };

    let results = orchestrator::execute(
        &task.hosts,
        start,
        end,
        worker_fn,
        worker_count,
        Arc::clone(catalogue),
    )
    .await;

    task.complete(results);
    if let Err(e) = store.update_task(task).await {
        error!("update_task({task_id}) failed persisting completion: {e}");
    }
}
