//! Background workers for settlement imports.
//!
//! Uploads only enqueue a job id; a fixed pool of tasks pulls ids from a
//! bounded channel and runs them one at a time each.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::services::liquidation_service::LiquidationService;

#[derive(Clone)]
pub struct LiquidationQueue {
    sender: mpsc::Sender<Uuid>,
}

impl LiquidationQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub async fn enqueue(&self, job_id: Uuid) -> Result<()> {
        self.sender.send(job_id).await.map_err(|_| {
            AppError::Internal(anyhow::anyhow!("liquidation queue is closed"))
        })
    }
}

/// Starts `count` workers sharing one receiver.
pub fn spawn_workers(
    count: usize,
    receiver: mpsc::Receiver<Uuid>,
    service: Arc<LiquidationService>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));
    (0..count.max(1))
        .map(|worker| {
            let receiver = receiver.clone();
            let service = service.clone();
            tokio::spawn(async move {
                tracing::info!("Liquidation worker {} started", worker);
                loop {
                    // lock is held only while waiting for the next id
                    let next = receiver.lock().await.recv().await;
                    let Some(job_id) = next else {
                        tracing::info!("Liquidation worker {} stopping: queue closed", worker);
                        break;
                    };
                    run_job(&service, worker, job_id).await;
                }
            })
        })
        .collect()
}

async fn run_job(service: &LiquidationService, worker: usize, job_id: Uuid) {
    tracing::info!("Worker {} processing liquidation {}", worker, job_id);
    if let Err(e) = service.process_job(job_id).await {
        tracing::error!("Liquidation {} failed: {}", job_id, e);
        if let Err(mark_err) = service.fail_job(job_id, &e).await {
            tracing::error!("Could not mark liquidation {} as failed: {}", job_id, mark_err);
        }
    }
}

/// Puts jobs interrupted by a restart back on the queue.
pub async fn requeue_unfinished(service: &LiquidationService, queue: &LiquidationQueue) -> Result<usize> {
    let ids = service.unfinished_job_ids().await?;
    for id in &ids {
        queue.enqueue(*id).await?;
    }
    if !ids.is_empty() {
        tracing::info!("Requeued {} unfinished liquidation job(s)", ids.len());
    }
    Ok(ids.len())
}
