//! Background refresh of users who share a disease label
//!
//! Interactions refresh the acting user inline and hand peer refreshes to a small
//! pool of workers behind a bounded queue. The queue never blocks the request
//! path: when it is full the job is dropped and logged.
use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};

use crate::{error::AppResult, services::recommendations::RecommendationService};

/// Refresh every user whose disease label matches `disease`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationJob {
    /// User whose activity triggered the job, for logging
    pub origin_user_id: i64,
    pub disease: String,
}

/// Outcome of one propagation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    pub refreshed: usize,
    pub failed: usize,
}

/// Recomputes and stores recommendations for every peer with the job's disease
///
/// One peer failing never stops the others.
pub async fn refresh_peers(
    service: &RecommendationService,
    job: &PropagationJob,
) -> AppResult<PropagationReport> {
    let peers = service.peers(&job.disease).await?;
    let mut report = PropagationReport::default();

    for peer in peers {
        match service.recompute_and_store(peer).await {
            Ok(entries) => {
                report.refreshed += 1;
                tracing::debug!(peer, entries, "Peer recommendations refreshed");
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(error = %e, peer, disease = %job.disease, "Peer refresh failed");
            }
        }
    }

    tracing::info!(
        origin_user_id = job.origin_user_id,
        disease = %job.disease,
        refreshed = report.refreshed,
        failed = report.failed,
        "Propagation finished"
    );
    Ok(report)
}

/// Sending side of the propagation queue
#[derive(Clone)]
pub struct PropagationQueue {
    sender: mpsc::Sender<PropagationJob>,
}

/// Handle for graceful shutdown of the propagation workers
pub struct PropagationHandle {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl PropagationHandle {
    /// Signals the workers to drain queued jobs and waits for them to finish
    pub async fn shutdown(self) {
        tracing::info!("Shutting down propagation workers");
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Propagation worker panicked");
            }
        }
        tracing::info!("Propagation workers shut down");
    }
}

impl PropagationQueue {
    /// Spawns `workers` tasks sharing a queue of `capacity` jobs
    pub fn start(
        service: RecommendationService,
        workers: usize,
        capacity: usize,
    ) -> (Self, PropagationHandle) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    service.clone(),
                    receiver.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        (Self { sender }, PropagationHandle { shutdown_tx, workers })
    }

    /// Queues a job without waiting; returns false when it was dropped
    pub fn enqueue(&self, job: PropagationJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    origin_user_id = job.origin_user_id,
                    disease = %job.disease,
                    "Propagation queue full, dropping job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(
                    origin_user_id = job.origin_user_id,
                    "Propagation queue closed, dropping job"
                );
                false
            }
        }
    }
}

async fn worker_loop(
    worker: usize,
    service: RecommendationService,
    receiver: Arc<Mutex<mpsc::Receiver<PropagationJob>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                _ = shutdown_rx.changed() => None,
            }
        };

        match job {
            Some(job) => run_job(worker, &service, &job).await,
            None => break,
        }
    }

    // Drain whatever is still queued
    loop {
        let job = receiver.lock().await.try_recv();
        match job {
            Ok(job) => run_job(worker, &service, &job).await,
            Err(_) => break,
        }
    }

    tracing::debug!(worker, "Propagation worker stopped");
}

async fn run_job(worker: usize, service: &RecommendationService, job: &PropagationJob) {
    if let Err(e) = refresh_peers(service, job).await {
        tracing::error!(error = %e, worker, disease = %job.disease, "Propagation job failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Meal, User};
    use crate::services::recommendations::RecommenderSettings;

    fn user(user_id: i64, disease: &str) -> User {
        User {
            user_id,
            username: format!("user{}", user_id),
            height: None,
            weight: None,
            disease: Some(disease.to_string()),
            diet: Some("balanced".to_string()),
        }
    }

    async fn setup() -> (MemoryStore, RecommendationService) {
        let store = MemoryStore::new();
        store
            .insert_meal(Meal {
                meal_id: 1,
                name: "Oat Bowl".to_string(),
                nutrient: "fiber".to_string(),
                disease: "Diabetes".to_string(),
                diet: "low_sugar".to_string(),
            })
            .await;
        for id in 1..=5 {
            store.insert_user(user(id, "Diabetes")).await;
        }
        store.insert_user(user(6, "Gout")).await;

        let service = RecommendationService::new(Arc::new(store.clone()), RecommenderSettings::default());
        (store, service)
    }

    fn job(disease: &str) -> PropagationJob {
        PropagationJob {
            origin_user_id: 1,
            disease: disease.to_string(),
        }
    }

    #[tokio::test]
    async fn test_one_failing_peer_does_not_stop_the_rest() {
        let (store, service) = setup().await;
        store.fail_recommendation_writes(3).await;

        let report = refresh_peers(&service, &job("diabetes")).await.unwrap();
        assert_eq!(report, PropagationReport { refreshed: 4, failed: 1 });

        for peer in [1, 2, 4, 5] {
            assert!(!store.stored_recommendations(peer).await.is_empty());
        }
        assert!(store.stored_recommendations(3).await.is_empty());
    }

    #[tokio::test]
    async fn test_other_diseases_are_untouched() {
        let (store, service) = setup().await;
        refresh_peers(&service, &job("Diabetes")).await.unwrap();
        assert!(store.stored_recommendations(6).await.is_empty());
    }

    #[tokio::test]
    async fn test_queue_drains_on_shutdown() {
        let (store, service) = setup().await;
        let (queue, handle) = PropagationQueue::start(service, 2, 8);

        assert!(queue.enqueue(job("gout")));
        handle.shutdown().await;

        assert!(!store.stored_recommendations(6).await.is_empty());
        assert!(store.stored_recommendations(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let (_store, service) = setup().await;
        let (queue, handle) = PropagationQueue::start(service, 1, 1);
        handle.shutdown().await;

        assert!(!queue.enqueue(job("diabetes")));
    }
}
