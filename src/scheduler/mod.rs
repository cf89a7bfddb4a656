pub mod broadcast;
pub mod tasks;

use std::fmt;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

/// Background jobs the bot knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Heartbeat,
    Broadcast,
}

impl Task {
    pub fn name(self) -> &'static str {
        match self {
            Task::Heartbeat => "heartbeat",
            Task::Broadcast => "weather-broadcast",
        }
    }

    /// Config key the schedule is read from, if any
    fn config_key(self) -> Option<&'static str> {
        match self {
            Task::Heartbeat => None,
            Task::Broadcast => Some("broadcast.cron"),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cron runner for the heartbeat and the weather broadcast
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner })
    }

    /// Run `run` on every match of `cron_expr` (six fields, seconds first).
    pub async fn schedule<F>(&self, task: Task, cron_expr: &str, run: F) -> Result<()>
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let fut = run();
            Box::pin(async move {
                let started = Instant::now();
                debug!("Running {}", task);
                fut.await;
                debug!("{} finished in {:?}", task, started.elapsed());
            })
        })
        .with_context(|| match task.config_key() {
            Some(key) => format!("Invalid cron expression '{}' in {}", cron_expr, key),
            None => format!("Invalid cron expression '{}' for {}", cron_expr, task),
        })?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", task))?;

        info!("Scheduled {} with cron: {}", task, cron_expr);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }

    #[tokio::test]
    async fn test_bad_broadcast_cron_names_config_key() {
        let scheduler = Scheduler::new().await.unwrap();
        let err = scheduler
            .schedule(Task::Broadcast, "every half hour", noop)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broadcast.cron"));
    }

    #[tokio::test]
    async fn test_valid_cron_is_scheduled() {
        let scheduler = Scheduler::new().await.unwrap();
        scheduler
            .schedule(Task::Heartbeat, "0 0 * * * *", noop)
            .await
            .unwrap();
    }
}
