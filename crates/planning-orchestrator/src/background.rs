//! Background Processor (§4.7, C7): a priority queue of [`BackgroundTask`]s
//! drained by N long-lived workers that invoke the AI Orchestrator.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use planning_core::{BackgroundTask, EsGateway, PlanningApplication, TaskStatus};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::orchestrator::AiOrchestrator;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_MAX_AGE_HOURS: i64 = 24;

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey(u32, i64, Uuid);

/// Moves `task` into a terminal status, satisfying "for every terminal
/// `BackgroundTask` T: `T.completed_at >= T.started_at >= T.created_at`"
/// even for a task cancelled before a worker ever picked it up.
fn mark_terminal(task: &mut BackgroundTask, status: TaskStatus) {
    let now = Utc::now();
    task.status = status;
    task.started_at.get_or_insert(now);
    task.completed_at = Some(now);
}

pub struct BackgroundProcessor {
    orchestrator: Arc<AiOrchestrator>,
    es: Arc<dyn EsGateway>,
    registry: Arc<DashMap<Uuid, BackgroundTask>>,
    queue: Arc<Mutex<BinaryHeap<Reverse<QueueKey>>>>,
    cancel_flags: Arc<DashMap<Uuid, Arc<AtomicBool>>>,
    notify: Arc<Notify>,
    http: reqwest::Client,
    max_retries: u32,
    max_age: ChronoDuration,
}

impl BackgroundProcessor {
    #[must_use]
    pub fn new(orchestrator: Arc<AiOrchestrator>, es: Arc<dyn EsGateway>) -> Self {
        Self {
            orchestrator,
            es,
            registry: Arc::new(DashMap::new()),
            queue: Arc::new(Mutex::new(BinaryHeap::new())),
            cancel_flags: Arc::new(DashMap::new()),
            notify: Arc::new(Notify::new()),
            http: reqwest::Client::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            max_age: ChronoDuration::hours(DEFAULT_MAX_AGE_HOURS),
        }
    }

    /// Enqueues a task in `Pending` state and returns its id.
    pub fn submit(&self, task: BackgroundTask) -> Uuid {
        let task_id = task.task_id;
        self.enqueue(&task);
        self.registry.insert(task_id, task);
        self.notify.notify_one();
        task_id
    }

    fn enqueue(&self, task: &BackgroundTask) {
        let key = QueueKey(task.queue_ordinal(), task.created_at.timestamp_nanos_opt().unwrap_or(0), task.task_id);
        self.queue.lock().push(Reverse(key));
    }

    /// Starts `worker_count` long-lived workers. Returns their join handles so
    /// the caller can await process shutdown.
    pub fn spawn_workers(self: &Arc<Self>, worker_count: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..worker_count.max(1))
            .map(|worker_id| {
                let processor = Arc::clone(self);
                tokio::spawn(async move { processor.worker_loop(worker_id).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize) {
        loop {
            let next = self.queue.lock().pop();
            let Some(Reverse(QueueKey(_, _, task_id))) = next else {
                self.notify.notified().await;
                continue;
            };

            let Some(mut task) = self.registry.get(&task_id).map(|r| r.clone()) else {
                continue;
            };
            if task.status != TaskStatus::Pending {
                continue;
            }

            let cancel_flag = self.cancel_flags.entry(task_id).or_insert_with(|| Arc::new(AtomicBool::new(false))).clone();
            if cancel_flag.load(Ordering::SeqCst) {
                mark_terminal(&mut task, TaskStatus::Cancelled);
                self.finalize(task).await;
                continue;
            }

            info!(worker_id, task_id = %task_id, "worker picked up task");
            task.status = TaskStatus::InProgress;
            task.started_at = Some(Utc::now());
            task.progress = 0.1;
            self.registry.insert(task_id, task.clone());

            self.run_task(&mut task, &cancel_flag).await;
            self.finalize(task).await;
        }
    }

    async fn run_task(&self, task: &mut BackgroundTask, cancel_flag: &Arc<AtomicBool>) {
        let mut applications = Vec::with_capacity(task.application_ids.len());
        for id in &task.application_ids {
            match self.es.get(id).await {
                Ok(json) => match serde_json::from_value::<PlanningApplication>(json) {
                    Ok(app) => applications.push(app),
                    Err(err) => warn!(task_id = %task.task_id, application_id = %id, error = %err, "could not parse stored application"),
                },
                Err(err) => warn!(task_id = %task.task_id, application_id = %id, error = %err, "application load failed"),
            }
        }
        task.progress = 0.2;

        let mut outcomes = Vec::with_capacity(applications.len());
        let total = applications.len().max(1) as f64;
        for (i, app) in applications.iter().enumerate() {
            if cancel_flag.load(Ordering::SeqCst) {
                mark_terminal(task, TaskStatus::Cancelled);
                return;
            }
            match self.orchestrator.process_application(app, task.processing_mode, Some(task.features.clone()), None).await {
                Ok(result) => outcomes.push(result),
                Err(err) => {
                    task.retry_count += 1;
                    task.error_message = Some(err.message().to_string());
                    if task.retry_count < self.max_retries {
                        task.status = TaskStatus::Pending;
                        task.progress = 0.0;
                        self.registry.insert(task.task_id, task.clone());
                        self.enqueue(task);
                        self.notify.notify_one();
                        return;
                    }
                    mark_terminal(task, TaskStatus::Failed);
                    return;
                }
            }
            task.progress = 0.2 + 0.6 * ((i + 1) as f64 / total);
        }

        task.progress = 0.9;
        task.result = Some(serde_json::json!({ "results": outcomes }));
        task.progress = 1.0;
        mark_terminal(task, TaskStatus::Completed);
    }

    async fn finalize(&self, task: BackgroundTask) {
        let task_id = task.task_id;
        let callback_url = task.callback_url.clone();
        self.registry.insert(task_id, task.clone());
        self.cancel_flags.remove(&task_id);

        if let Some(url) = callback_url {
            let http = self.http.clone();
            let summary = serde_json::json!({
                "task_id": task_id,
                "status": task.status,
                "progress": task.progress,
                "error_message": task.error_message,
            });
            tokio::spawn(async move {
                if let Err(err) = http.post(&url).json(&summary).send().await {
                    error!(task_id = %task_id, error = %err, "task callback delivery failed");
                }
            });
        }
    }

    /// `Cancel(task_id)` (§4.7): marks a pending task cancelled immediately, or
    /// flags an in-progress one for cooperative cancellation at the next
    /// suspension point.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        let Some(mut entry) = self.registry.get_mut(&task_id) else {
            return false;
        };
        match entry.status {
            TaskStatus::Pending => {
                mark_terminal(&mut entry, TaskStatus::Cancelled);
                true
            }
            TaskStatus::InProgress => {
                self.cancel_flags.entry(task_id).or_insert_with(|| Arc::new(AtomicBool::new(false))).store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get_task(&self, task_id: Uuid) -> Option<BackgroundTask> {
        self.registry.get(&task_id).map(|r| r.clone())
    }

    /// Removes terminal tasks older than `max_age_hours` (default 24h).
    pub fn sweep_expired(&self) -> u64 {
        let cutoff = Utc::now() - self.max_age;
        let mut removed = 0u64;
        self.registry.retain(|_, task| {
            let terminal = matches!(task.status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled);
            let expired = terminal && task.completed_at.map(|t| t < cutoff).unwrap_or(task.created_at < cutoff);
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    pub async fn run_cleanup_sweeper(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = self.sweep_expired();
            if removed > 0 {
                info!(removed, "background processor cleanup swept expired tasks");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planning_core::{ProcessingMode, TaskPriority};

    #[test]
    fn queue_key_orders_by_ordinal_then_time_then_id() {
        let a = QueueKey(1, 100, Uuid::nil());
        let b = QueueKey(1, 200, Uuid::nil());
        let c = QueueKey(2, 50, Uuid::nil());
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn mark_terminal_sets_completed_at_and_backfills_started_at() {
        let mut task = BackgroundTask::new("scoring", TaskPriority::Urgent, vec!["APP-1".to_string()], ProcessingMode::Fast, Default::default(), None);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());

        mark_terminal(&mut task, TaskStatus::Cancelled);

        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
        assert!(task.completed_at.unwrap() >= task.started_at.unwrap());
        assert!(task.started_at.unwrap() >= task.created_at);
    }

    #[test]
    fn mark_terminal_preserves_an_already_set_started_at() {
        let mut task = BackgroundTask::new("scoring", TaskPriority::Urgent, vec!["APP-1".to_string()], ProcessingMode::Fast, Default::default(), None);
        let started = Utc::now();
        task.started_at = Some(started);

        mark_terminal(&mut task, TaskStatus::Failed);

        assert_eq!(task.started_at, Some(started));
        assert!(task.completed_at.unwrap() >= started);
    }
}
