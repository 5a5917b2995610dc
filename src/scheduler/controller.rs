use super::budget::TickBudget;
use super::entity::{EntityId, Priority, RateControlledEntity};
use super::stats::SchedulerStats;
use super::waiter::EventWaiter;
use crate::config::SchedulerConfig;
use crate::peer::PeerError;
use crossbeam::queue::SegQueue;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Outcome of one scheduling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Processing ops that moved at least one byte.
    pub ops: usize,
    /// Bytes debited against the budget.
    pub bytes: u64,
    /// The round stopped because the interval's allowance ran out.
    pub budget_exhausted: bool,
    /// Entities dropped after a failed op.
    pub removed: usize,
}

/// Notifications for the layer that owns the entities.
#[derive(Debug)]
pub enum EntityEvent {
    /// `do_processing` failed; the entity is no longer scheduled.
    Failed {
        id: EntityId,
        description: String,
        error: PeerError,
    },
}

enum Command {
    Register(EntityId, Arc<dyn RateControlledEntity>),
    Unregister(EntityId),
    SetRateLimit(u64),
}

struct Shared {
    commands: SegQueue<Command>,
    next_id: AtomicU64,
    waiter: Arc<EventWaiter>,
    shutdown: AtomicBool,
}

impl Shared {
    fn allocate_id(&self) -> EntityId {
        EntityId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Thread-safe front end to a scheduler owned by another thread.
///
/// Requests are queued and applied by the scheduling thread at the start of
/// its next round, so rotation order and budget have a single writer.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    pub fn register(&self, entity: Arc<dyn RateControlledEntity>) -> EntityId {
        let id = self.shared.allocate_id();
        self.shared.commands.push(Command::Register(id, entity));
        self.shared.waiter.signal();
        id
    }

    pub fn unregister(&self, id: EntityId) {
        self.shared.commands.push(Command::Unregister(id));
        self.shared.waiter.signal();
    }

    /// Takes effect at the next interval. 0 = unlimited.
    pub fn set_rate_limit(&self, bytes_per_sec: u64) {
        self.shared.commands.push(Command::SetRateLimit(bytes_per_sec));
        self.shared.waiter.signal();
    }

    pub fn waiter(&self) -> Arc<EventWaiter> {
        Arc::clone(&self.shared.waiter)
    }

    /// Asks the scheduling thread to stop after its current round.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.waiter.signal();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }
}

struct Registered {
    entity: Arc<dyn RateControlledEntity>,
    tier: Priority,
}

enum OpOutcome {
    Progress,
    Stalled,
    Removed,
}

/// Round-robin scheduler that shares a byte budget among entities.
///
/// High priority entities, and normal ones with their boost flag set, are
/// serviced first. Normal entities then take turns in strict rotation, each
/// getting up to `ready_connection_count` ops. The rotation survives across
/// intervals, so an entity deferred by an exhausted budget is first in line
/// next time.
pub struct RateControlScheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    entities: HashMap<EntityId, Registered>,
    high: VecDeque<EntityId>,
    normal: VecDeque<EntityId>,
    budget: TickBudget,
    events: mpsc::UnboundedSender<EntityEvent>,
    stats: Arc<SchedulerStats>,
}

impl RateControlScheduler {
    pub fn new(config: SchedulerConfig) -> (Self, mpsc::UnboundedReceiver<EntityEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let budget = TickBudget::new(config.rate_limit, config.tick_interval());
        let scheduler = Self {
            config,
            shared: Arc::new(Shared {
                commands: SegQueue::new(),
                next_id: AtomicU64::new(1),
                waiter: Arc::new(EventWaiter::new()),
                shutdown: AtomicBool::new(false),
            }),
            entities: HashMap::new(),
            high: VecDeque::new(),
            normal: VecDeque::new(),
            budget,
            events,
            stats: Arc::new(SchedulerStats::new()),
        };
        (scheduler, rx)
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn waiter(&self) -> Arc<EventWaiter> {
        Arc::clone(&self.shared.waiter)
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn budget(&self) -> &TickBudget {
        &self.budget
    }

    pub fn register(&mut self, entity: Arc<dyn RateControlledEntity>) -> EntityId {
        let id = self.shared.allocate_id();
        self.insert(id, entity);
        id
    }

    pub fn unregister(&mut self, id: EntityId) -> bool {
        if self.entities.remove(&id).is_none() {
            return false;
        }
        self.high.retain(|queued| *queued != id);
        self.normal.retain(|queued| *queued != id);
        debug!(%id, "entity unregistered");
        true
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Takes effect at the next interval. 0 = unlimited.
    pub fn set_rate_limit(&mut self, bytes_per_sec: u64) {
        self.config.rate_limit = bytes_per_sec;
    }

    pub fn rate_limit(&self) -> u64 {
        self.config.rate_limit
    }

    /// Starts a new interval with a fresh allowance and runs one round.
    pub fn tick(&mut self) -> TickReport {
        self.drain_commands();
        if let Some(started) = self.budget.started() {
            self.stats
                .record_interval(self.budget.consumed(), started.elapsed());
        }
        self.budget
            .reset(self.config.rate_limit, self.config.tick_interval());
        self.service()
    }

    /// Runs one round against whatever is left of the current allowance.
    pub fn service(&mut self) -> TickReport {
        self.drain_commands();
        self.rebalance();

        let waiter = Arc::clone(&self.shared.waiter);
        let mut report = TickReport::default();

        let high_len = self.high.len();
        for _ in 0..high_len {
            if self.budget.is_exhausted() {
                report.budget_exhausted = true;
                break;
            }
            let Some(id) = self.high.pop_front() else {
                break;
            };
            let Some(entity) = self.entity(id) else {
                continue;
            };
            if !self.service_high(id, &entity, &waiter, &mut report) {
                self.high.push_back(id);
            }
        }

        // Boosted normal entities keep their place in the normal rotation.
        let boosted: Vec<EntityId> = self
            .normal
            .iter()
            .copied()
            .filter(|id| {
                self.entities
                    .get(id)
                    .is_some_and(|r| r.entity.priority_boost())
            })
            .collect();
        let mut serviced_boosted = HashSet::with_capacity(boosted.len());
        for id in boosted {
            if self.budget.is_exhausted() {
                report.budget_exhausted = true;
                break;
            }
            let Some(entity) = self.entity(id) else {
                continue;
            };
            serviced_boosted.insert(id);
            self.service_high(id, &entity, &waiter, &mut report);
        }

        let normal_len = self.normal.len();
        for _ in 0..normal_len {
            if self.budget.is_exhausted() {
                report.budget_exhausted = true;
                break;
            }
            let Some(id) = self.normal.pop_front() else {
                break;
            };
            let Some(entity) = self.entity(id) else {
                continue;
            };
            if serviced_boosted.contains(&id) {
                self.normal.push_back(id);
                continue;
            }
            if !self.service_normal(id, &entity, &waiter, &mut report) {
                self.normal.push_back(id);
            }
        }

        if report.budget_exhausted {
            self.stats.record_deferral();
        }
        self.stats.record_ops(report.ops, report.bytes);
        report
    }

    /// Runs the tick loop on a dedicated thread until shut down.
    pub fn spawn(self, name: &str) -> io::Result<SchedulerThread> {
        let handle = self.handle();
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())?;
        Ok(SchedulerThread {
            handle,
            join: Some(join),
        })
    }

    fn run(mut self) {
        let interval = self.config.tick_interval();
        info!(
            rate_limit = self.config.rate_limit,
            tick_ms = interval.as_millis() as u64,
            "scheduler started"
        );

        while !self.shared.shutdown.load(Ordering::Acquire) {
            let mut report = self.tick();
            let deadline = self.budget.started().unwrap_or_else(Instant::now) + interval;

            loop {
                if self.shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                if report.budget_exhausted {
                    std::thread::sleep(deadline - now);
                    break;
                }
                if report.ops == 0 {
                    self.stats.record_idle_wait();
                    self.shared.waiter.wait(self.config.idle_wait());
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                report = self.service();
            }
        }

        info!(entities = self.entities.len(), "scheduler stopped");
    }

    fn entity(&self, id: EntityId) -> Option<Arc<dyn RateControlledEntity>> {
        self.entities.get(&id).map(|r| Arc::clone(&r.entity))
    }

    fn insert(&mut self, id: EntityId, entity: Arc<dyn RateControlledEntity>) {
        let tier = entity.priority();
        debug!(%id, ?tier, entity = %entity.description(), "entity registered");
        match tier {
            Priority::High => self.high.push_back(id),
            Priority::Normal => self.normal.push_back(id),
        }
        self.entities.insert(id, Registered { entity, tier });
    }

    fn drain_commands(&mut self) {
        while let Some(command) = self.shared.commands.pop() {
            match command {
                Command::Register(id, entity) => self.insert(id, entity),
                Command::Unregister(id) => {
                    self.unregister(id);
                }
                Command::SetRateLimit(limit) => self.set_rate_limit(limit),
            }
        }
    }

    /// Moves entities whose priority changed to the tail of their new tier.
    fn rebalance(&mut self) {
        let mut promoted = Vec::new();
        let mut demoted = Vec::new();

        for (id, registered) in self.entities.iter_mut() {
            let current = registered.entity.priority();
            if current != registered.tier {
                registered.tier = current;
                match current {
                    Priority::High => promoted.push(*id),
                    Priority::Normal => demoted.push(*id),
                }
            }
        }

        if !promoted.is_empty() {
            self.normal.retain(|id| !promoted.contains(id));
            promoted.sort();
            self.high.extend(promoted);
        }
        if !demoted.is_empty() {
            self.high.retain(|id| !demoted.contains(id));
            demoted.sort();
            self.normal.extend(demoted);
        }
    }

    /// Services an entity up to its need. Returns true if it was removed.
    fn service_high(
        &mut self,
        id: EntityId,
        entity: &Arc<dyn RateControlledEntity>,
        waiter: &EventWaiter,
        report: &mut TickReport,
    ) -> bool {
        for _ in 0..self.config.max_high_ops() {
            if self.budget.is_exhausted() {
                report.budget_exhausted = true;
                break;
            }
            if !entity.can_process(waiter) {
                break;
            }
            match self.process_once(id, entity, waiter, report) {
                OpOutcome::Progress => {}
                OpOutcome::Stalled => break,
                OpOutcome::Removed => return true,
            }
        }
        false
    }

    /// Gives a normal entity its turn. Returns true if it was removed.
    fn service_normal(
        &mut self,
        id: EntityId,
        entity: &Arc<dyn RateControlledEntity>,
        waiter: &EventWaiter,
        report: &mut TickReport,
    ) -> bool {
        if !entity.can_process(waiter) {
            return false;
        }

        let turns = entity.ready_connection_count(waiter).max(1);
        for turn in 0..turns {
            if self.budget.is_exhausted() {
                report.budget_exhausted = true;
                break;
            }
            if turn > 0 && !entity.can_process(waiter) {
                break;
            }
            match self.process_once(id, entity, waiter, report) {
                OpOutcome::Progress => {}
                OpOutcome::Stalled => break,
                OpOutcome::Removed => return true,
            }
        }
        false
    }

    fn process_once(
        &mut self,
        id: EntityId,
        entity: &Arc<dyn RateControlledEntity>,
        waiter: &EventWaiter,
        report: &mut TickReport,
    ) -> OpOutcome {
        let limit = self.budget.op_limit(self.config.op_size());
        match entity.do_processing(waiter, limit) {
            Ok(0) => OpOutcome::Stalled,
            Ok(bytes) => {
                trace!(%id, bytes, "processed");
                self.budget.debit(bytes);
                report.ops += 1;
                report.bytes += bytes as u64;
                OpOutcome::Progress
            }
            Err(error) => {
                self.remove_failed(id, entity, error);
                report.removed += 1;
                OpOutcome::Removed
            }
        }
    }

    fn remove_failed(
        &mut self,
        id: EntityId,
        entity: &Arc<dyn RateControlledEntity>,
        error: PeerError,
    ) {
        let description = entity.description();
        warn!(%id, entity = %description, %error, "entity failed, removing from scheduler");

        self.entities.remove(&id);
        self.high.retain(|queued| *queued != id);
        self.normal.retain(|queued| *queued != id);
        self.stats.record_removal();

        let _ = self.events.send(EntityEvent::Failed {
            id,
            description,
            error,
        });
    }
}

/// A scheduler running on its own thread.
///
/// Dropping it stops and joins the thread.
pub struct SchedulerThread {
    handle: SchedulerHandle,
    join: Option<JoinHandle<()>>,
}

impl SchedulerThread {
    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.shutdown();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.stop();
    }
}
