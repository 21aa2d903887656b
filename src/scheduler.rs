use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task_id: String,
    pub label: String,
    pub queued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
}

/// Deferred one-shot tasks on the tokio runtime, each individually cancellable.
#[derive(Clone, Default)]
pub struct TaskScheduler {
    pending: Arc<Mutex<HashMap<String, ScheduledTask>>>,
}

#[derive(Debug, Clone)]
pub struct TaskHandle {
    task_id: String,
    cancel: Arc<Notify>,
    settled: Arc<AtomicBool>,
    pending: Arc<Mutex<HashMap<String, ScheduledTask>>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns false when the task already ran or was cancelled before.
    pub fn cancel(&self) -> bool {
        if self.settled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.notify_one();
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.task_id);
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, label: &str, delay: Duration, action: F) -> AppResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AppError::Internal("no async runtime available for scheduled task".to_string()))?;

        let now = Utc::now();
        let task_id = Uuid::new_v4().to_string();
        let not_before = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        {
            let mut pending = self.pending.lock().map_err(|_| AppError::Internal("scheduler mutex poisoned".to_string()))?;
            pending.insert(
                task_id.clone(),
                ScheduledTask {
                    task_id: task_id.clone(),
                    label: label.to_string(),
                    queued_at: now,
                    not_before,
                },
            );
        }

        let handle = TaskHandle {
            task_id: task_id.clone(),
            cancel: Arc::new(Notify::new()),
            settled: Arc::new(AtomicBool::new(false)),
            pending: self.pending.clone(),
        };

        let task = handle.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if task.settled.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    if let Ok(mut pending) = task.pending.lock() {
                        pending.remove(&task.task_id);
                    }
                    action();
                }
                _ = task.cancel.notified() => {
                    tracing::debug!(task_id = %task.task_id, "scheduled task cancelled");
                }
            }
        });

        Ok(handle)
    }

    pub fn pending(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self
            .pending
            .lock()
            .map(|pending| pending.values().cloned().collect())
            .unwrap_or_default();
        tasks.sort_by_key(|task| task.not_before);
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::TaskScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Duration;

    #[test]
    fn scheduling_without_runtime_fails() {
        let scheduler = TaskScheduler::new();
        assert!(scheduler.schedule("noop", Duration::from_secs(1), || {}).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn task_runs_after_delay() {
        let scheduler = TaskScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handle = scheduler
            .schedule("count", Duration::from_secs(30), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("schedule");
        assert_eq!(scheduler.pending().len(), 1);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(handle.is_settled());
        assert!(scheduler.pending().is_empty());
        assert!(!handle.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_runs() {
        let scheduler = TaskScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handle = scheduler
            .schedule("count", Duration::from_secs(5), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("schedule");

        assert!(handle.cancel());
        assert!(scheduler.pending().is_empty());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!handle.cancel());
    }
}
