//! Rate-controlled I/O scheduling.
//!
//! A [`RateControlScheduler`] owns a set of [`RateControlledEntity`] trait
//! objects and, once per interval, hands out a byte allowance derived from
//! its rate limit:
//!
//! - High priority entities (and boosted ones) are serviced first, each up
//!   to its need.
//! - Normal entities share what is left in strict round-robin order; an
//!   entity with several ready connections gets several ops per turn.
//! - When the allowance runs out the round stops and the first unserviced
//!   entity leads the next interval.
//! - When nothing is ready the scheduling thread parks on the
//!   [`EventWaiter`] instead of spinning.
//!
//! # Example
//!
//! ```no_run
//! use peerwire::config::SchedulerConfig;
//! use peerwire::scheduler::RateControlScheduler;
//!
//! # fn example() -> std::io::Result<()> {
//! // 1MB/s upload
//! let (scheduler, _events) =
//!     RateControlScheduler::new(SchedulerConfig::default().with_rate_limit(1_000_000));
//! let thread = scheduler.spawn("upload-scheduler")?;
//!
//! // Register entities through the handle from any thread
//! let _handle = thread.handle().clone();
//!
//! thread.shutdown();
//! # Ok(())
//! # }
//! ```

mod budget;
mod controller;
mod entity;
mod stats;
mod waiter;

pub use budget::TickBudget;
pub use controller::{
    EntityEvent, RateControlScheduler, SchedulerHandle, SchedulerThread, TickReport,
};
pub use entity::{EntityId, Priority, RateControlledEntity};
pub use stats::{SchedulerStats, StatsSnapshot};
pub use waiter::EventWaiter;

#[cfg(test)]
mod tests;
