//! APR period derivation.
//!
//! Rebuilt alongside the ledger: period boundaries sit at each distinct
//! event timestamp plus the rebuild cutoff, so the set always partitions
//! the position's lifetime with no gaps or overlaps.

use crate::domain::{Decimal, EventKind, LedgerEvent, TimeMs};
use serde::Serialize;

const MS_PER_YEAR: i64 = 365 * 24 * 60 * 60 * 1000;

/// One contiguous accrual window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AprPeriod {
    pub start_ms: TimeMs,
    pub end_ms: TimeMs,
    /// Cost basis in force during the window. Basis only changes at events,
    /// so the time-integral over the window is this value times its length.
    pub weighted_cost_basis: Decimal,
    /// Collect income realized at the window's closing boundary.
    pub yield_accrued: Decimal,
}

impl AprPeriod {
    pub fn length_ms(&self) -> i64 {
        self.end_ms.since(self.start_ms)
    }

    /// Annualized yield percentage for this window. Display only.
    pub fn apr_pct(&self) -> f64 {
        let length = self.length_ms();
        if length == 0 || !self.weighted_cost_basis.is_positive() {
            return 0.0;
        }
        let rate = self.yield_accrued.to_f64_lossy() / self.weighted_cost_basis.to_f64_lossy();
        rate * (MS_PER_YEAR as f64 / length as f64) * 100.0
    }
}

/// Whole-lifetime rollup over the period set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AprSummary {
    pub periods: Vec<AprPeriod>,
    pub total_yield: Decimal,
    /// Time-weighted average cost basis over the full span.
    pub weighted_cost_basis: Decimal,
    pub realized_apr_pct: f64,
}

/// Derive the period set from replayed ledger rows.
///
/// `cutoff` closes the final open window; pass the rebuild time. Events are
/// expected in replay (ascending) order. Returns an empty set for an empty
/// ledger.
pub fn build_apr_periods(events: &[LedgerEvent], cutoff: TimeMs) -> Vec<AprPeriod> {
    let mut periods: Vec<AprPeriod> = Vec::new();
    let Some(first) = events.first() else {
        return periods;
    };

    let mut window_start = first.time_ms;
    // Basis in force entering the current window: after all events at the
    // opening boundary.
    let mut window_basis = Decimal::zero();
    // Collect income at the genesis timestamp has no window behind it yet;
    // it attaches to the first window that closes.
    let mut genesis_yield = Decimal::zero();

    for event in events {
        if event.time_ms > window_start {
            let mut yield_accrued = if event.kind == EventKind::Collect {
                event.delta_pnl
            } else {
                Decimal::zero()
            };
            if periods.is_empty() {
                yield_accrued += genesis_yield;
                genesis_yield = Decimal::zero();
            }
            periods.push(AprPeriod {
                start_ms: window_start,
                end_ms: event.time_ms,
                weighted_cost_basis: window_basis,
                yield_accrued,
            });
            window_start = event.time_ms;
        } else if event.kind == EventKind::Collect {
            // Same timestamp as the window opening: belongs to the window
            // that just closed at this boundary, if one exists.
            match periods.last_mut() {
                Some(last) => last.yield_accrued += event.delta_pnl,
                None => genesis_yield += event.delta_pnl,
            }
        }
        window_basis = event.cost_basis_after;
    }

    if cutoff > window_start {
        periods.push(AprPeriod {
            start_ms: window_start,
            end_ms: cutoff,
            weighted_cost_basis: window_basis,
            yield_accrued: genesis_yield,
        });
    } else if let Some(last) = periods.last_mut() {
        last.yield_accrued += genesis_yield;
    }

    periods
}

/// Aggregate a period set into a lifetime summary.
pub fn summarize(periods: Vec<AprPeriod>) -> AprSummary {
    let mut total_yield = Decimal::zero();
    let mut weighted_sum = Decimal::zero();
    let mut total_ms: i64 = 0;
    for p in &periods {
        total_yield += p.yield_accrued;
        let len = p.length_ms();
        weighted_sum += p.weighted_cost_basis * Decimal::from_str_canonical(&len.to_string())
            .unwrap_or_else(|_| Decimal::zero());
        total_ms += len;
    }
    let weighted_cost_basis = if total_ms > 0 {
        weighted_sum
            .checked_div(Decimal::from_str_canonical(&total_ms.to_string()).unwrap_or_else(|_| Decimal::zero()))
            .unwrap_or_else(Decimal::zero)
    } else {
        Decimal::zero()
    };
    let realized_apr_pct = if total_ms > 0 && weighted_cost_basis.is_positive() {
        (total_yield.to_f64_lossy() / weighted_cost_basis.to_f64_lossy())
            * (MS_PER_YEAR as f64 / total_ms as f64)
            * 100.0
    } else {
        0.0
    };
    AprSummary {
        periods,
        total_yield,
        weighted_cost_basis,
        realized_apr_pct,
    }
}
