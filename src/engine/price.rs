use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::NightPrice;

/// Currency precision for charged amounts.
pub const CURRENCY_DP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Unrounded sum of nightly prices; `None` if it does not fit a `Decimal`.
pub fn sum_nights(nightly: &[NightPrice]) -> Option<Decimal> {
    nightly
        .iter()
        .try_fold(Decimal::ZERO, |acc, n| acc.checked_add(n.price))
}

/// Price `units` rooms for the given nights, optionally discounted by a
/// percentage. Rounding happens once, on the final figures. `None` on
/// overflow.
pub fn quote(nightly: &[NightPrice], units: u32, discount_percent: Option<Decimal>) -> Option<Quote> {
    let subtotal = sum_nights(nightly)?.checked_mul(Decimal::from(units))?;
    let total = match discount_percent {
        Some(pct) => subtotal.checked_mul(Decimal::ONE - pct / Decimal::ONE_HUNDRED)?,
        None => subtotal,
    };
    let subtotal = round_currency(subtotal);
    let total = round_currency(total);
    Some(Quote {
        subtotal,
        discount: subtotal - total,
        total,
    })
}

pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn nights(prices: &[Decimal]) -> Vec<NightPrice> {
        let start = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        prices
            .iter()
            .zip(start.iter_days())
            .map(|(price, night)| NightPrice { night, price: *price })
            .collect()
    }

    #[test]
    fn seventeen_nights_at_flat_rate() {
        let nightly = nights(&[dec!(100); 17]);
        let q = quote(&nightly, 1, None).unwrap();
        assert_eq!(q.subtotal, dec!(1700));
        assert_eq!(q.total, dec!(1700));
        assert_eq!(q.discount, Decimal::ZERO);
    }

    #[test]
    fn mixed_nightly_prices_sum() {
        let nightly = nights(&[dec!(100), dec!(250), dec!(99.99)]);
        assert_eq!(sum_nights(&nightly).unwrap(), dec!(449.99));
    }

    #[test]
    fn units_multiply_subtotal() {
        let nightly = nights(&[dec!(80), dec!(90)]);
        let q = quote(&nightly, 3, None).unwrap();
        assert_eq!(q.total, dec!(510));
    }

    #[test]
    fn percentage_discount_applied_to_subtotal() {
        let nightly = nights(&[dec!(100); 3]);
        let q = quote(&nightly, 1, Some(dec!(10))).unwrap();
        assert_eq!(q.subtotal, dec!(300));
        assert_eq!(q.total, dec!(270));
        assert_eq!(q.discount, dec!(30));
    }

    #[test]
    fn rounding_only_at_the_end() {
        // Three nights of 33.335: per-night rounding would charge 100.02,
        // summing first gives 100.005 -> 100.01.
        let nightly = nights(&[dec!(33.335); 3]);
        let q = quote(&nightly, 1, None).unwrap();
        assert_eq!(q.total, dec!(100.01));
    }

    #[test]
    fn fractional_discount_rounds_half_away_from_zero() {
        let nightly = nights(&[dec!(10.05)]);
        // 10.05 * 0.85 = 8.5425 -> 8.54
        let q = quote(&nightly, 1, Some(dec!(15))).unwrap();
        assert_eq!(q.total, dec!(8.54));
        assert_eq!(q.discount, dec!(1.51));
    }

    #[test]
    fn full_discount_is_free() {
        let nightly = nights(&[dec!(120)]);
        let q = quote(&nightly, 2, Some(dec!(100))).unwrap();
        assert_eq!(q.total, Decimal::ZERO);
        assert_eq!(q.discount, dec!(240));
    }

    #[test]
    fn overflowing_totals_are_refused() {
        let nightly = nights(&[Decimal::MAX, dec!(1)]);
        assert_eq!(sum_nights(&nightly), None);
        assert_eq!(quote(&nightly, 1, None), None);

        let one_night = nights(&[Decimal::MAX]);
        assert!(quote(&one_night, 1, None).is_some());
        assert_eq!(quote(&one_night, 2, None), None);
    }
}
