//! Scan orchestrator (C2): fans `(host, port)` jobs out to a worker
//! pool and gathers the results.

use cortex_core::{ProbeCatalogue, ScanJob, ScanResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A worker: given a job and the shared probe catalogue, produces a
/// result. Connect workers consult the catalogue; SYN and UDP workers
/// ignore it.
pub type WorkerFn = Arc<
    dyn Fn(ScanJob, Arc<ProbeCatalogue>) -> Pin<Box<dyn Future<Output = ScanResult> + Send>>
        + Send
        + Sync,
>;

const JOB_CHANNEL_CAPACITY: usize = 1000;

/// Fans every `(host, port)` pair out to `worker_count` concurrent
/// workers and collects their results with no ordering guarantee.
pub async fn execute(
    hosts: &[String],
    start: u16,
    end: u16,
    worker_fn: WorkerFn,
    worker_count: usize,
    catalogue: Arc<ProbeCatalogue>,
) -> Vec<ScanResult> {
    let port_count = (end - start) as usize + 1;
    let total_jobs = hosts.len() * port_count;

    let (job_tx, job_rx) = tokio::sync::mpsc::channel::<ScanJob>(JOB_CHANNEL_CAPACITY);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, mut result_rx) = tokio::sync::mpsc::channel::<ScanResult>(total_jobs.max(1));

    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let worker_fn = Arc::clone(&worker_fn);
        let catalogue = Arc::clone(&catalogue);

        handles.push(tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = job_rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else {
                    break;
                };
                let result = worker_fn(job, Arc::clone(&catalogue)).await;
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }
    // Dropping our own sender means the result channel closes once every
    // worker has dropped its clone, i.e. once all jobs are accounted for.
    drop(result_tx);

    for host in hosts {
        for port in start..=end {
            if job_tx
                .send(ScanJob {
                    host: host.clone(),
                    port,
                })
                .await
                .is_err()
            {
                break;
            }
        }
    }
    drop(job_tx);

    let mut results = Vec::with_capacity(total_jobs);
    while let Some(result) = result_rx.recv().await {
        results.push(result);
    }

    for handle in handles {
        let _ = handle.await;
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::PortState;

    fn stub_worker() -> WorkerFn {
        Arc::new(|job, _catalogue| {
            Box::pin(async move { ScanResult::new(job.host, job.port, PortState::Open) })
        })
    }

    #[tokio::test]
    async fn executes_every_host_port_pair() {
        let hosts = vec!["127.0.0.1".to_string(), "127.0.0.2".to_string()];
        let catalogue = Arc::new(ProbeCatalogue::default());

        let results = execute(&hosts, 10, 12, stub_worker(), 4, catalogue).await;

        assert_eq!(results.len(), 2 * 3);
        for host in &hosts {
            for port in 10..=12 {
                assert!(results
                    .iter()
                    .any(|r| r.host == *host && r.port == port && r.state == PortState::Open));
            }
        }
    }

    #[tokio::test]
    async fn single_port_single_host() {
        let hosts = vec!["10.0.0.1".to_string()];
        let catalogue = Arc::new(ProbeCatalogue::default());

        let results = execute(&hosts, 80, 80, stub_worker(), 1, catalogue).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].port, 80);
    }

    #[tokio::test]
    async fn more_workers_than_jobs_does_not_hang() {
        let hosts = vec!["127.0.0.1".to_string()];
        let catalogue = Arc::new(ProbeCatalogue::default());

        let results = execute(&hosts, 1, 3, stub_worker(), 50, catalogue).await;
        assert_eq!(results.len(), 3);
    }
}
