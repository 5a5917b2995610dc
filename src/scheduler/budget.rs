use crate::constants::UNLIMITED_BUDGET;
use std::time::{Duration, Instant};

/// Byte allowance for one scheduling interval.
///
/// Accounting is check-after: callers test [`is_exhausted`](Self::is_exhausted)
/// before an op and [`debit`](Self::debit) what it actually moved, so an entity
/// that ignores its per-op limit can overrun by at most one op. Unused bytes
/// do not carry over into the next interval; only the sub-byte remainder of
/// the rate does, so rates below one byte per interval still average out.
#[derive(Debug, Clone)]
pub struct TickBudget {
    allowance: u64,
    consumed: u64,
    /// Fractional bytes owed from earlier intervals, in thousandths.
    remainder: u64,
    started: Option<Instant>,
}

impl TickBudget {
    pub fn new(rate_limit: u64, interval: Duration) -> Self {
        Self {
            allowance: Self::allowance_for(rate_limit, interval),
            consumed: 0,
            remainder: 0,
            started: None,
        }
    }

    /// Whole bytes allowed in one interval for a rate in bytes per second,
    /// ignoring any remainder. A rate of zero means unlimited.
    pub fn allowance_for(rate_limit: u64, interval: Duration) -> u64 {
        if rate_limit == 0 {
            return UNLIMITED_BUDGET;
        }
        let bytes = (rate_limit as u128).saturating_mul(interval.as_millis()) / 1000;
        bytes.min((UNLIMITED_BUDGET - 1) as u128) as u64
    }

    /// Starts a new interval.
    pub fn reset(&mut self, rate_limit: u64, interval: Duration) {
        if rate_limit == 0 {
            self.allowance = UNLIMITED_BUDGET;
            self.remainder = 0;
        } else {
            let scaled = (rate_limit as u128)
                .saturating_mul(interval.as_millis())
                .saturating_add(self.remainder as u128);
            self.allowance = (scaled / 1000).min((UNLIMITED_BUDGET - 1) as u128) as u64;
            self.remainder = (scaled % 1000) as u64;
        }
        self.consumed = 0;
        self.started = Some(Instant::now());
    }

    pub fn debit(&mut self, bytes: usize) {
        self.consumed = self.consumed.saturating_add(bytes as u64);
    }

    pub fn is_unlimited(&self) -> bool {
        self.allowance == UNLIMITED_BUDGET
    }

    pub fn is_exhausted(&self) -> bool {
        !self.is_unlimited() && self.consumed >= self.allowance
    }

    pub fn remaining(&self) -> u64 {
        if self.is_unlimited() {
            UNLIMITED_BUDGET
        } else {
            self.allowance.saturating_sub(self.consumed)
        }
    }

    /// Byte limit to hand to the next op.
    pub fn op_limit(&self, op_size: usize) -> usize {
        self.remaining().min(op_size as u64) as usize
    }

    pub fn allowance(&self) -> u64 {
        self.allowance
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// When the current interval began, `None` before the first reset.
    pub fn started(&self) -> Option<Instant> {
        self.started
    }
}
