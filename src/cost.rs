//! Cost governance
//!
//! Tracks cumulative spend in a shared atomic ledger and enforces the
//! per-request and daily ceilings before any backend dispatch.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{LimitScope, OrchestratorError};
use crate::thinking::ThinkingProfile;

/// Ledger granularity: one unit = one micro-dollar
const MICROS_PER_DOLLAR: u64 = 1_000_000;

fn to_micros(amount: Decimal) -> u64 {
    (amount * Decimal::from(MICROS_PER_DOLLAR))
        .round()
        .to_u64()
        .unwrap_or(0)
}

fn from_micros(micros: u64) -> Decimal {
    Decimal::from(micros) / Decimal::from(MICROS_PER_DOLLAR)
}

/// Outcome of a budget reservation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Allowed,
    Denied(CostDenial),
}

/// Denial detail carried by [`Reservation::Denied`]; convertible into a
/// full [`OrchestratorError`] at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostDenial {
    pub spent: Decimal,
    pub limit: Decimal,
    pub scope: LimitScope,
}

impl CostDenial {
    pub fn into_error(self) -> OrchestratorError {
        OrchestratorError::CostLimit {
            spent: self.spent,
            limit: self.limit,
            scope: self.scope,
        }
    }
}

/// Enforces spend ceilings and owns the running cost ledger.
///
/// The ledger is the only mutable state shared across concurrent backend
/// calls; [`CostGovernor::commit`] is its sole mutator and is a single
/// atomic add, so parallel completions can commit in any order.
#[derive(Clone)]
pub struct CostGovernor {
    per_request_limit: Decimal,
    daily_limit: Decimal,
    warning_threshold: Decimal,
    ledger_micros: Arc<AtomicU64>,
    warned: Arc<AtomicBool>,
}

impl CostGovernor {
    pub fn new(per_request_limit: Decimal, daily_limit: Decimal) -> Self {
        Self {
            per_request_limit,
            daily_limit,
            warning_threshold: dec!(0.8),
            ledger_micros: Arc::new(AtomicU64::new(0)),
            warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the fraction of the daily limit at which a warning is logged
    pub fn with_warning_threshold(mut self, fraction: Decimal) -> Self {
        self.warning_threshold = fraction;
        self
    }

    /// Check whether an estimated spend fits the budget.
    ///
    /// Denies when the ledger plus the estimate would cross the daily
    /// limit, and independently when the estimate alone exceeds the
    /// per-request limit. The per-request limit is scaled up with the
    /// active thinking profile, since deeper reasoning costs more.
    pub fn reserve(&self, estimated: Decimal, profile: &ThinkingProfile) -> Reservation {
        let spent = self.total_spent();

        let scaled_request_limit = self.per_request_limit
            * Decimal::from_f64(profile.cost_scale()).unwrap_or(Decimal::ONE);
        if estimated > scaled_request_limit {
            return Reservation::Denied(CostDenial {
                spent: estimated,
                limit: scaled_request_limit,
                scope: LimitScope::Request,
            });
        }

        if spent + estimated > self.daily_limit {
            return Reservation::Denied(CostDenial {
                spent,
                limit: self.daily_limit,
                scope: LimitScope::Daily,
            });
        }

        debug!(
            estimated = %estimated,
            spent = %spent,
            "cost reservation allowed"
        );
        Reservation::Allowed
    }

    /// Record realized spend. Atomic; safe under concurrent invocation from
    /// parallel backend completions.
    pub fn commit(&self, actual: Decimal) {
        if actual <= Decimal::ZERO {
            return;
        }
        let total = self
            .ledger_micros
            .fetch_add(to_micros(actual), Ordering::Relaxed)
            + to_micros(actual);

        let threshold = to_micros(self.daily_limit * self.warning_threshold);
        if total >= threshold && !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                spent = %from_micros(total),
                daily_limit = %self.daily_limit,
                "approaching daily cost limit"
            );
        }
    }

    /// Cumulative committed spend
    pub fn total_spent(&self) -> Decimal {
        from_micros(self.ledger_micros.load(Ordering::Relaxed))
    }

    /// Budget left before the daily ceiling
    pub fn remaining_today(&self) -> Decimal {
        (self.daily_limit - self.total_spent()).max(Decimal::ZERO)
    }

    pub fn per_request_limit(&self) -> Decimal {
        self.per_request_limit
    }

    pub fn daily_limit(&self) -> Decimal {
        self.daily_limit
    }
}
