//! Time-weighted average over the committed history.
//!
//! ```text
//! TWAP = sum(price_i * dt_i) / sum(dt_i)
//! ```
//!
//! `dt_i` is the time point `i` stayed the newest, clipped to the window.
//! Sparse history degrades to the last committed price instead of failing.
//!
//! Each price is split as `q_i * T + r_i` with `T = sum(dt_i)`, so the
//! result is `sum(q_i * dt_i) + sum(r_i * dt_i) / T`. Both partial sums are
//! bounded by the largest price and by `T^2`, so no price can overflow it.

use crate::price_infra::history::PriceHistory;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;
use crate::TWAP_CENTER_WINDOW_SECS;

pub struct TwapCalculator<'a> {
    history: &'a PriceHistory,
    now: Timestamp,
}

impl<'a> TwapCalculator<'a> {
    pub fn new(history: &'a PriceHistory, now: Timestamp) -> Self {
        TwapCalculator { history, now }
    }

    /// Average of the points inside `[now - window, now]`, rounded down.
    ///
    /// Returns the newest price when no point lies inside the window and
    /// zero when the history is empty.
    pub fn twap(&self, window_secs: u64) -> Price {
        let cutoff = self.now.saturating_sub_secs(window_secs);

        let mut spans: Vec<(u128, u128)> = Vec::new();
        let mut points = self.history.iter_backward().peekable();
        while let Some(point) = points.next() {
            if point.timestamp <= cutoff {
                break;
            }

            let older = match points.peek() {
                Some(next) if next.timestamp > cutoff => next.timestamp,
                _ => cutoff,
            };
            let dt = match point.timestamp.as_secs().saturating_sub(older.as_secs()) {
                0 => 1,
                gap => gap,
            };
            spans.push((point.price.raw_value(), dt as u128));
        }

        let total_dt: u128 = spans.iter().map(|&(_, dt)| dt).sum();
        if total_dt == 0 {
            return self.history.latest().map(|p| p.price).unwrap_or_default();
        }

        let mut whole: u128 = 0;
        let mut remainder: u128 = 0;
        for &(price, dt) in &spans {
            whole = whole.saturating_add((price / total_dt).saturating_mul(dt));
            remainder = remainder.saturating_add((price % total_dt).saturating_mul(dt));
        }
        Price::from_raw(whole.saturating_add(remainder / total_dt))
    }

    /// Reference price for deviation checks. Zero only with an empty history.
    pub fn center(&self) -> Price {
        let twap = self.twap(TWAP_CENTER_WINDOW_SECS);
        if twap.is_zero() {
            return self.history.latest().map(|p| p.price).unwrap_or_default();
        }
        twap
    }
}
