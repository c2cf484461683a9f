use tokio::task::JoinHandle;
use std::collections::HashMap;
use std::time::Duration;
use crate::error::{Error, Result};
use tracing::{info, error, warn};

/// Task Supervisor - Owns the background tasks of a running service
///
/// ## Purpose
/// Tracks the feed manager and update forwarder spawned by
/// `PriceService::start` so that `stop` can tear them down and `health`
/// can report tasks that died on their own.
///
/// ## Usage
/// ```rust,ignore
/// let mut supervisor = TaskSupervisor::new();
/// supervisor.spawn("feed_forwarder", async move {
///     // task logic
/// });
///
/// if let Err(e) = supervisor.check_health() {
///     error!("Task failure detected: {:?}", e);
/// }
/// ```
pub struct TaskSupervisor {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a new background task and register it for monitoring
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F) -> &mut Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.adopt(name, tokio::spawn(future))
    }

    /// Register a task that was spawned elsewhere
    pub fn adopt(&mut self, name: impl Into<String>, handle: JoinHandle<()>) -> &mut Self {
        let name = name.into();
        info!("Supervising background task: {}", name);
        if let Some(previous) = self.tasks.insert(name, handle) {
            previous.abort();
        }
        self
    }

    /// Returns error if any task has terminated unexpectedly
    pub fn check_health(&mut self) -> Result<()> {
        let failed_tasks: Vec<String> = self.tasks.iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        if !failed_tasks.is_empty() {
            let error_msg = format!("Tasks terminated unexpectedly: {:?}", failed_tasks);
            error!("{}", error_msg);

            for name in &failed_tasks {
                self.tasks.remove(name);
            }

            return Err(Error::TaskFailed(error_msg));
        }

        Ok(())
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.values().filter(|h| !h.is_finished()).count()
    }

    /// Wait for a specific task to finish on its own, aborting it after `timeout`
    pub async fn wait_for_task(&mut self, name: &str, timeout: Duration) -> Result<()> {
        let Some(mut handle) = self.tasks.remove(name) else {
            return Err(Error::TaskFailed(format!("Task {} not found", name)));
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Task {} completed", name);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::TaskFailed(format!("Task {} failed: {}", name, e))),
            Err(_) => {
                warn!("Task {} did not finish within {:?}, aborting", name, timeout);
                handle.abort();
                Ok(())
            }
        }
    }

    /// Abort every task and wait for each to unwind
    pub async fn shutdown_all(&mut self) {
        info!("Shutting down {} background tasks", self.tasks.len());

        for (name, handle) in self.tasks.drain() {
            handle.abort();
            // Cancellation is the expected outcome here
            let _ = handle.await;
            info!("Stopped task: {}", name);
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
