use std::cmp::Reverse;

use rust_decimal::Decimal;

use crate::model::*;

/// Read-only view over one room's pricing periods, sorted by start night.
///
/// Built per query from the room's current periods; never cached across
/// queries.
pub struct PricingIndex<'a> {
    periods: Vec<&'a PricingPeriod>,
}

impl<'a> PricingIndex<'a> {
    pub fn build(periods: &'a [PricingPeriod]) -> Self {
        let mut periods: Vec<&PricingPeriod> = periods.iter().collect();
        periods.sort_by_key(|p| (p.start, p.end));
        Self { periods }
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Effective price for a night. When several periods cover it, the
    /// narrowest span wins; on equal spans the later start wins; the higher
    /// id breaks any remaining tie so the answer never depends on insertion
    /// order.
    pub fn price_for_night(&self, night: Night) -> Option<Decimal> {
        let right_bound = self.periods.partition_point(|p| p.start <= night);
        self.periods[..right_bound]
            .iter()
            .filter(|p| p.covers(night))
            .min_by_key(|p| (p.span_nights(), Reverse(p.start), Reverse(p.id)))
            .map(|p| p.price)
    }

    /// True iff every night of the stay has a price.
    pub fn coverage(&self, stay: &Stay) -> bool {
        self.maximal_prefix_coverage(stay.check_in) >= stay.check_out
    }

    /// Interval-merge walk from `from`: the exclusive end of the longest run
    /// of priced nights starting at `from`. Returns `from` itself when `from`
    /// is not priced.
    pub fn maximal_prefix_coverage(&self, from: Night) -> Night {
        let mut edge = from;
        for period in &self.periods {
            if period.start > edge {
                break;
            }
            edge = edge.max(period.end_exclusive());
        }
        edge
    }

    /// Effective price of every night in the stay, or `None` at the first gap.
    pub fn nightly_prices(&self, stay: &Stay) -> Option<Vec<NightPrice>> {
        stay.nights()
            .map(|night| self.price_for_night(night).map(|price| NightPrice { night, price }))
            .collect()
    }
}
