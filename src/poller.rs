use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::offset::OffsetStore;
use crate::platform::{InboundMessage, Messenger};
use crate::router::CommandRouter;

/// Something that consumes one inbound message
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, msg: &InboundMessage) -> Result<()>;
}

#[async_trait]
impl UpdateHandler for CommandRouter {
    async fn handle(&self, msg: &InboundMessage) -> Result<()> {
        CommandRouter::handle(self, msg).await
    }
}

/// Bounded FIFO set of update ids already dispatched
struct RecentlySeen {
    order: VecDeque<u64>,
    ids: HashSet<u64>,
    capacity: usize,
}

impl RecentlySeen {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    fn insert(&mut self, id: u64) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
    }
}

struct PollState {
    offset: u64,
    seen: RecentlySeen,
    /// Handler failures per update id, cleared once the update is settled
    failures: HashMap<u64, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous cycle is still running
    Busy,
    Completed { handled: usize },
    Failed,
}

pub struct UpdatePoller {
    messenger: Arc<dyn Messenger>,
    handler: Arc<dyn UpdateHandler>,
    offsets: Arc<dyn OffsetStore>,
    max_attempts: u32,
    /// Holding this lock is what "in flight" means
    state: Mutex<PollState>,
    /// Mirror of the durable offset readable without waiting for a cycle
    last_update_id: AtomicU64,
}

impl UpdatePoller {
    /// Build a poller resuming after the stored offset.
    pub async fn new(
        messenger: Arc<dyn Messenger>,
        handler: Arc<dyn UpdateHandler>,
        offsets: Arc<dyn OffsetStore>,
        seen_capacity: usize,
        max_attempts: u32,
    ) -> Self {
        let offset = offsets.load().await;
        info!("Resuming after update {}", offset);
        Self {
            messenger,
            handler,
            offsets,
            max_attempts: max_attempts.max(1),
            state: Mutex::new(PollState {
                offset,
                seen: RecentlySeen::new(seen_capacity),
                failures: HashMap::new(),
            }),
            last_update_id: AtomicU64::new(offset),
        }
    }

    pub fn offset(&self) -> u64 {
        self.last_update_id.load(Ordering::SeqCst)
    }

    /// One timer tick. Returns immediately when the previous cycle has not
    /// finished yet.
    pub async fn tick(&self) -> TickOutcome {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Previous polling cycle still running, skipping tick");
                return TickOutcome::Busy;
            }
        };

        match self.cycle(&mut state).await {
            Ok(handled) => TickOutcome::Completed { handled },
            Err(e) => {
                warn!("Polling cycle failed: {:#}", e);
                TickOutcome::Failed
            }
        }
    }

    async fn cycle(&self, state: &mut PollState) -> Result<usize> {
        let mut updates = self
            .messenger
            .fetch_updates(state.offset)
            .await
            .context("Failed to fetch updates")?;
        updates.sort_by_key(|m| m.update_id);

        let mut handled = 0;
        for msg in &updates {
            let id = msg.update_id;
            if id <= state.offset {
                debug!("Skipping update {} at or below offset {}", id, state.offset);
                continue;
            }

            if state.seen.contains(id) {
                // handled before but the offset write failed; only persist
                debug!("Update {} already dispatched", id);
            } else if msg.chat_id.is_none() {
                debug!("Discarding update {} without a chat", id);
                state.seen.insert(id);
            } else {
                match self.handler.handle(msg).await {
                    Ok(()) => {
                        state.failures.remove(&id);
                        state.seen.insert(id);
                    }
                    Err(e) => {
                        let attempts = state.failures.entry(id).or_insert(0);
                        *attempts += 1;
                        if *attempts < self.max_attempts {
                            warn!(
                                "Handler failed for update {} (attempt {}/{}): {:#}",
                                id, attempts, self.max_attempts, e
                            );
                            return Ok(handled);
                        }
                        error!(
                            "Giving up on update {} after {} attempts: {:#}",
                            id, attempts, e
                        );
                        state.failures.remove(&id);
                        state.seen.insert(id);
                    }
                }
            }

            self.offsets
                .save(id)
                .await
                .with_context(|| format!("Failed to persist offset {}", id))?;
            state.offset = id;
            self.last_update_id.store(id, Ordering::SeqCst);
            handled += 1;
        }

        Ok(handled)
    }

    /// Tick every `period` until `shutdown` resolves. Each tick runs on its
    /// own task so a slow cycle never delays the timer; overlapping ticks
    /// fall through as `Busy`.
    pub async fn run<F>(self: Arc<Self>, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Polling for updates every {:?}", period);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Update poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    let poller = self.clone();
                    tokio::spawn(async move {
                        poller.tick().await;
                    });
                }
            }
        }
    }
}
