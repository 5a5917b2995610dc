use super::*;
use crate::config::SchedulerConfig;
use crate::peer::PeerError;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type ServiceLog = Arc<Mutex<Vec<&'static str>>>;

struct MockEntity {
    name: &'static str,
    priority: Mutex<Priority>,
    boost: AtomicBool,
    ready: AtomicBool,
    fail: AtomicBool,
    op_bytes: usize,
    honour_limit: bool,
    ready_connections: usize,
    polls: AtomicUsize,
    ops: AtomicUsize,
    log: ServiceLog,
}

impl MockEntity {
    fn new(name: &'static str, priority: Priority, op_bytes: usize, log: &ServiceLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            priority: Mutex::new(priority),
            boost: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            op_bytes,
            honour_limit: true,
            ready_connections: 1,
            polls: AtomicUsize::new(0),
            ops: AtomicUsize::new(0),
            log: Arc::clone(log),
        })
    }

    fn greedy(name: &'static str, op_bytes: usize, log: &ServiceLog) -> Arc<Self> {
        let mut entity = Self::new(name, Priority::Normal, op_bytes, log);
        Arc::get_mut(&mut entity).unwrap().honour_limit = false;
        entity
    }

    fn with_ready_connections(name: &'static str, count: usize, log: &ServiceLog) -> Arc<Self> {
        let mut entity = Self::new(name, Priority::Normal, 10, log);
        Arc::get_mut(&mut entity).unwrap().ready_connections = count;
        entity
    }

    fn ops(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl RateControlledEntity for MockEntity {
    fn can_process(&self, _waiter: &EventWaiter) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.ready.load(Ordering::SeqCst)
    }

    fn do_processing(&self, _waiter: &EventWaiter, max_bytes: usize) -> Result<usize, PeerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PeerError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset by peer",
            )));
        }
        self.ops.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(self.name);
        if self.honour_limit {
            Ok(self.op_bytes.min(max_bytes))
        } else {
            Ok(self.op_bytes)
        }
    }

    fn priority(&self) -> Priority {
        *self.priority.lock()
    }

    fn priority_boost(&self) -> bool {
        self.boost.load(Ordering::SeqCst)
    }

    fn bytes_ready_to_write(&self) -> u64 {
        0
    }

    fn connection_count(&self) -> usize {
        self.ready_connections
    }

    fn ready_connection_count(&self, _waiter: &EventWaiter) -> usize {
        self.ready_connections
    }

    fn description(&self) -> String {
        format!("mock {}", self.name)
    }
}

fn log() -> ServiceLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// One-second ticks so the rate limit equals the per-tick allowance.
fn config(bytes_per_tick: u64) -> SchedulerConfig {
    SchedulerConfig {
        rate_limit: bytes_per_tick,
        tick_interval_ms: 1000,
        ..SchedulerConfig::default()
    }
}

#[test]
fn test_event_waiter_coalesces_signals() {
    let waiter = EventWaiter::new();
    waiter.signal();
    waiter.signal();
    waiter.signal();
    assert!(waiter.is_signalled());

    assert!(waiter.wait(Duration::ZERO));
    assert!(!waiter.is_signalled());
    assert!(!waiter.wait(Duration::from_millis(10)));
}

#[test]
fn test_event_waiter_wakes_across_threads() {
    let waiter = Arc::new(EventWaiter::new());
    let signaller = Arc::clone(&waiter);

    let started = Instant::now();
    let thread = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        signaller.signal();
    });

    assert!(waiter.wait(Duration::from_secs(5)));
    assert!(started.elapsed() < Duration::from_secs(5));
    thread.join().unwrap();
}

#[test]
fn test_event_waiter_unbounded_timeout() {
    let waiter = Arc::new(EventWaiter::new());
    waiter.signal();
    assert!(waiter.wait(Duration::MAX));

    let signaller = Arc::clone(&waiter);
    let thread = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        signaller.signal();
    });
    assert!(waiter.wait(Duration::MAX));
    thread.join().unwrap();
}

#[test]
fn test_budget_allowance() {
    assert_eq!(TickBudget::allowance_for(1000, Duration::from_millis(50)), 50);
    assert_eq!(TickBudget::allowance_for(10, Duration::from_millis(50)), 0);
    assert_eq!(
        TickBudget::allowance_for(0, Duration::from_millis(50)),
        crate::constants::UNLIMITED_BUDGET
    );

    let mut budget = TickBudget::new(100, Duration::from_secs(1));
    budget.reset(100, Duration::from_secs(1));
    assert_eq!(budget.op_limit(64), 64);
    budget.debit(64);
    assert_eq!(budget.op_limit(64), 36);
    budget.debit(64);
    assert!(budget.is_exhausted());
    assert_eq!(budget.remaining(), 0);

    budget.reset(0, Duration::from_secs(1));
    assert!(budget.is_unlimited());
    assert!(!budget.is_exhausted());
}

#[test]
fn test_budget_carries_sub_byte_remainder() {
    let interval = Duration::from_millis(50);
    let mut budget = TickBudget::new(10, interval);
    let allowances: Vec<u64> = (0..4)
        .map(|_| {
            budget.reset(10, interval);
            budget.allowance()
        })
        .collect();
    assert_eq!(allowances, vec![0, 1, 0, 1]);

    budget.reset(10, interval);
    assert!(budget.is_exhausted());
    assert_eq!(budget.op_limit(64), 0);
}

#[test]
fn test_slow_rate_holds_over_one_second() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(SchedulerConfig {
        rate_limit: 10,
        tick_interval_ms: 50,
        ..SchedulerConfig::default()
    });
    let entity = MockEntity::new("slow", Priority::Normal, 100, &log);
    scheduler.register(entity.clone());

    let moved: u64 = (0..20).map(|_| scheduler.tick().bytes).sum();
    assert_eq!(moved, 10);
    assert_eq!(entity.ops(), 10);
}

#[test]
fn test_fair_rotation_over_ticks() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(config(100));
    let entities: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|name| MockEntity::new(name, Priority::Normal, 100, &log))
        .collect();
    for entity in &entities {
        scheduler.register(entity.clone());
    }

    for _ in 0..entities.len() {
        let report = scheduler.tick();
        assert_eq!(report.ops, 1);
        assert!(report.budget_exhausted);
    }

    for entity in &entities {
        assert_eq!(entity.ops(), 1, "{} starved", entity.name);
    }
    assert_eq!(*log.lock(), vec!["a", "b", "c", "d"]);
}

#[test]
fn test_all_ready_entities_serviced_with_sufficient_budget() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(SchedulerConfig::default());
    let entities: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| MockEntity::new(name, Priority::Normal, 1000, &log))
        .collect();
    for entity in &entities {
        scheduler.register(entity.clone());
    }

    let report = scheduler.tick();
    assert_eq!(report.ops, 3);
    assert!(!report.budget_exhausted);
    assert!(entities.iter().all(|e| e.ops() == 1));
}

#[test]
fn test_high_priority_serviced_first() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(config(100));
    let normal = MockEntity::new("normal", Priority::Normal, 100, &log);
    let high = MockEntity::new("high", Priority::High, 100, &log);
    scheduler.register(normal.clone());
    scheduler.register(high.clone());

    let report = scheduler.tick();
    assert_eq!(report.ops, 1);
    assert_eq!(*log.lock(), vec!["high"]);
    assert_eq!(normal.ops(), 0);
}

#[test]
fn test_high_priority_serviced_up_to_need() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(SchedulerConfig {
        max_high_ops: 3,
        ..SchedulerConfig::default()
    });
    let high = MockEntity::new("high", Priority::High, 10, &log);
    let normal = MockEntity::new("normal", Priority::Normal, 10, &log);
    scheduler.register(high.clone());
    scheduler.register(normal.clone());

    scheduler.tick();
    assert_eq!(high.ops(), 3);
    assert_eq!(normal.ops(), 1);
    assert_eq!(*log.lock(), vec!["high", "high", "high", "normal"]);
}

#[test]
fn test_budget_never_exceeded_when_limits_honoured() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(config(1000));
    for name in ["a", "b", "c"] {
        scheduler.register(MockEntity::new(name, Priority::Normal, 300, &log));
    }

    for _ in 0..5 {
        let report = scheduler.tick();
        assert!(report.bytes <= 1000);
        assert!(scheduler.budget().consumed() <= scheduler.budget().allowance());
    }
}

#[test]
fn test_budget_overrun_bounded_by_one_op() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(config(100));
    for name in ["a", "b", "c", "d", "e"] {
        scheduler.register(MockEntity::greedy(name, 30, &log));
    }

    let report = scheduler.tick();
    assert!(report.budget_exhausted);
    assert!(report.bytes >= 100);
    assert!(report.bytes <= 100 + 30);
    assert_eq!(report.ops, 4);
}

#[test]
fn test_deferred_entity_goes_first_next_tick() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(config(200));
    for name in ["a", "b", "c"] {
        scheduler.register(MockEntity::new(name, Priority::Normal, 100, &log));
    }

    let first = scheduler.tick();
    assert!(first.budget_exhausted);
    scheduler.tick();

    assert_eq!(*log.lock(), vec!["a", "b", "c", "a"]);
    assert!(scheduler.stats().snapshot().deferrals >= 2);
}

#[test]
fn test_normal_turn_weighted_by_ready_connections() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(SchedulerConfig::default());
    let wide = MockEntity::with_ready_connections("wide", 3, &log);
    let narrow = MockEntity::with_ready_connections("narrow", 1, &log);
    scheduler.register(wide.clone());
    scheduler.register(narrow.clone());

    scheduler.tick();
    assert_eq!(wide.ops(), 3);
    assert_eq!(narrow.ops(), 1);
}

#[test]
fn test_boosted_entity_serviced_as_high() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(config(100));
    let a = MockEntity::new("a", Priority::Normal, 100, &log);
    let b = MockEntity::new("b", Priority::Normal, 100, &log);
    scheduler.register(a.clone());
    scheduler.register(b.clone());

    b.boost.store(true, Ordering::SeqCst);
    scheduler.tick();
    assert_eq!(*log.lock(), vec!["b"]);

    b.boost.store(false, Ordering::SeqCst);
    scheduler.tick();
    scheduler.tick();
    assert_eq!(*log.lock(), vec!["b", "a", "b"]);
}

#[test]
fn test_priority_change_moves_entity_between_tiers() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(config(100));
    let a = MockEntity::new("a", Priority::Normal, 100, &log);
    let b = MockEntity::new("b", Priority::Normal, 100, &log);
    scheduler.register(a.clone());
    scheduler.register(b.clone());

    *b.priority.lock() = Priority::High;
    scheduler.tick();
    scheduler.tick();
    assert_eq!(*log.lock(), vec!["b", "b"]);
    assert_eq!(a.ops(), 0);
}

#[test]
fn test_failed_entity_removed_and_reported() {
    let log = log();
    let (mut scheduler, mut events) = RateControlScheduler::new(SchedulerConfig::default());
    let healthy = MockEntity::new("healthy", Priority::Normal, 10, &log);
    let broken = MockEntity::new("broken", Priority::Normal, 10, &log);
    scheduler.register(healthy.clone());
    let broken_id = scheduler.register(broken.clone());
    broken.fail.store(true, Ordering::SeqCst);

    let report = scheduler.tick();
    assert_eq!(report.removed, 1);
    assert!(!scheduler.contains(broken_id));
    assert_eq!(scheduler.len(), 1);

    match events.try_recv() {
        Ok(EntityEvent::Failed {
            id,
            description,
            error,
        }) => {
            assert_eq!(id, broken_id);
            assert_eq!(description, "mock broken");
            assert!(matches!(error, PeerError::Io(_)));
        }
        other => panic!("expected failure event, got {:?}", other),
    }

    let polls = broken.polls();
    scheduler.tick();
    scheduler.tick();
    assert_eq!(broken.polls(), polls);
    assert_eq!(healthy.ops(), 3);
    assert_eq!(scheduler.stats().snapshot().entities_removed, 1);
}

#[test]
fn test_unregister_skips_entity() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(SchedulerConfig::default());
    let a = MockEntity::new("a", Priority::Normal, 10, &log);
    let b = MockEntity::new("b", Priority::High, 10, &log);
    scheduler.register(a.clone());
    let b_id = scheduler.register(b.clone());

    assert!(scheduler.unregister(b_id));
    assert!(!scheduler.unregister(b_id));
    scheduler.tick();
    assert_eq!(b.polls(), 0);
    assert_eq!(a.ops(), 1);
}

#[test]
fn test_idle_entities_report_no_ops() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(SchedulerConfig::default());
    let idle = MockEntity::new("idle", Priority::Normal, 10, &log);
    idle.ready.store(false, Ordering::SeqCst);
    scheduler.register(idle.clone());

    let report = scheduler.tick();
    assert_eq!(report, TickReport::default());
    assert_eq!(idle.polls(), 1);
    assert_eq!(idle.ops(), 0);
}

#[test]
fn test_handle_commands_applied_by_scheduler() {
    let log = log();
    let (mut scheduler, _events) = RateControlScheduler::new(config(0));
    let handle = scheduler.handle();
    let entity = MockEntity::new("remote", Priority::Normal, 10, &log);

    let id = std::thread::spawn({
        let handle = handle.clone();
        let entity = entity.clone();
        move || {
            handle.set_rate_limit(500);
            handle.register(entity)
        }
    })
    .join()
    .unwrap();

    assert!(!scheduler.contains(id));
    assert!(scheduler.waiter().is_signalled());

    scheduler.tick();
    assert!(scheduler.contains(id));
    assert_eq!(scheduler.rate_limit(), 500);
    assert_eq!(scheduler.budget().allowance(), 500);
    assert_eq!(entity.ops(), 1);

    handle.unregister(id);
    scheduler.tick();
    assert!(scheduler.is_empty());
}

#[test]
fn test_spawned_scheduler_processes_and_shuts_down() {
    let log = log();
    let (scheduler, _events) = RateControlScheduler::new(SchedulerConfig {
        tick_interval_ms: 10,
        idle_wait_ms: 10,
        ..SchedulerConfig::default()
    });
    let stats = scheduler.stats();
    let thread = scheduler.spawn("test-scheduler").unwrap();

    let entity = MockEntity::new("a", Priority::Normal, 10, &log);
    thread.handle().register(entity.clone());

    let deadline = Instant::now() + Duration::from_secs(5);
    while entity.ops() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    entity.ready.store(false, Ordering::SeqCst);
    thread.shutdown();

    assert!(entity.ops() > 0);
    assert!(stats.bytes_processed() >= 10);
}
