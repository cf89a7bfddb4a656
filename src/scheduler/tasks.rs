use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::poller::UpdatePoller;
use crate::scheduler::broadcast::Broadcaster;
use crate::scheduler::{Scheduler, Task};

/// Register built-in background tasks
pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    poller: Arc<UpdatePoller>,
    broadcast: Option<(Arc<Broadcaster>, String)>,
) -> anyhow::Result<()> {
    scheduler
        .schedule(Task::Heartbeat, "0 0 * * * *", move || {
            let poller = poller.clone();
            Box::pin(async move {
                info!("Heartbeat: bot is alive, last update {}", poller.offset());
            })
        })
        .await?;

    if let Some((broadcaster, cron)) = broadcast {
        scheduler
            .schedule(Task::Broadcast, &cron, move || {
                let broadcaster = broadcaster.clone();
                Box::pin(async move {
                    if let Err(e) = broadcaster.run_once(Utc::now()).await {
                        error!("Weather broadcast failed: {:#}", e);
                    }
                })
            })
            .await?;
    }

    Ok(())
}
