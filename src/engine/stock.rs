use crate::model::*;

// ── Stock ledger ─────────────────────────────────────────────────
//
// Remaining capacity is derived from the room's booking rows at call time.
// No running counter exists; a status change is visible to the next read.

/// `stock − Σ room_count` of active bookings occupying `night`.
pub fn remaining_capacity(room: &RoomState, night: Night) -> i64 {
    let query = Stay::new(night, next_night(night));
    let held: i64 = room
        .overlapping(&query)
        .filter(|b| b.status.is_active())
        .map(|b| i64::from(b.room_count))
        .sum();
    i64::from(room.stock) - held
}

pub fn is_night_bookable(room: &RoomState, night: Night) -> bool {
    remaining_capacity(room, night) > 0
}

/// Remaining capacity for every night of `stay`, index 0 = check-in.
///
/// Sweep over a difference array: +count where an active booking starts
/// inside the window, −count where it ends, so cost is linear in the number
/// of overlapping bookings plus nights rather than their product.
pub fn remaining_by_night(room: &RoomState, stay: &Stay) -> Vec<i64> {
    let len = stay.night_count().max(0) as usize;
    let mut delta = vec![0i64; len + 1];

    for booking in room.overlapping(stay).filter(|b| b.status.is_active()) {
        let from = booking.stay.check_in.max(stay.check_in);
        let to = booking.stay.check_out.min(stay.check_out);
        let start_idx = (from - stay.check_in).num_days() as usize;
        let end_idx = (to - stay.check_in).num_days() as usize;
        let count = i64::from(booking.room_count);
        delta[start_idx] += count;
        delta[end_idx] -= count;
    }

    let stock = i64::from(room.stock);
    let mut held = 0i64;
    delta[..len]
        .iter()
        .map(|d| {
            held += d;
            stock - held
        })
        .collect()
}

/// First night of `stay` on which fewer than `units` remain.
pub fn first_short_night(room: &RoomState, stay: &Stay, units: u32) -> Option<Night> {
    let need = i64::from(units);
    remaining_by_night(room, stay)
        .into_iter()
        .zip(stay.nights())
        .find(|(left, _)| *left < need)
        .map(|(_, night)| night)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use ulid::Ulid;

    fn d(s: &str) -> Night {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn stay(a: &str, b: &str) -> Stay {
        Stay::new(d(a), d(b))
    }

    fn booking(a: &str, b: &str, status: BookingStatus, room_count: u32) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: Ulid::nil(),
            stay: stay(a, b),
            status,
            room_count,
            guests: 1,
            guest_name: "g".into(),
            nightly_prices: Vec::new(),
            subtotal: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            coupon_id: None,
            created_at: 0,
        }
    }

    fn room(stock: u32, bookings: Vec<Booking>) -> RoomState {
        let mut rs = RoomState::new(Ulid::nil(), Ulid::nil(), None, stock, 2, true);
        for b in bookings {
            rs.insert_booking(b);
        }
        rs
    }

    #[test]
    fn empty_room_has_full_stock() {
        let rs = room(3, vec![]);
        assert_eq!(remaining_capacity(&rs, d("2026-04-01")), 3);
        assert_eq!(remaining_by_night(&rs, &stay("2026-04-01", "2026-04-04")), vec![3, 3, 3]);
    }

    #[test]
    fn zero_stock_never_bookable() {
        let rs = room(0, vec![]);
        assert!(!is_night_bookable(&rs, d("2026-04-01")));
    }

    #[test]
    fn check_out_night_is_released() {
        let rs = room(1, vec![booking("2026-04-01", "2026-04-05", BookingStatus::Confirmed, 1)]);
        assert!(!is_night_bookable(&rs, d("2026-04-01")));
        assert!(!is_night_bookable(&rs, d("2026-04-04")));
        assert!(is_night_bookable(&rs, d("2026-04-05")));
        assert!(is_night_bookable(&rs, d("2026-03-31")));
    }

    #[test]
    fn cancelled_and_refunded_do_not_hold_stock() {
        let rs = room(
            1,
            vec![
                booking("2026-04-01", "2026-04-05", BookingStatus::Cancelled, 1),
                booking("2026-04-01", "2026-04-05", BookingStatus::Refunded, 1),
            ],
        );
        assert_eq!(remaining_capacity(&rs, d("2026-04-02")), 1);
    }

    #[test]
    fn pending_and_completed_hold_stock() {
        let rs = room(
            3,
            vec![
                booking("2026-04-01", "2026-04-05", BookingStatus::Pending, 1),
                booking("2026-04-01", "2026-04-05", BookingStatus::Completed, 1),
            ],
        );
        assert_eq!(remaining_capacity(&rs, d("2026-04-02")), 1);
    }

    #[test]
    fn room_count_consumes_multiple_units() {
        let rs = room(5, vec![booking("2026-04-02", "2026-04-04", BookingStatus::Confirmed, 3)]);
        assert_eq!(
            remaining_by_night(&rs, &stay("2026-04-01", "2026-04-05")),
            vec![5, 2, 2, 5]
        );
    }

    #[test]
    fn sweep_matches_per_night_count() {
        let rs = room(
            4,
            vec![
                booking("2026-03-28", "2026-04-03", BookingStatus::Confirmed, 1),
                booking("2026-04-02", "2026-04-06", BookingStatus::Pending, 2),
                booking("2026-04-04", "2026-04-12", BookingStatus::Confirmed, 1),
                booking("2026-04-03", "2026-04-04", BookingStatus::Cancelled, 4),
            ],
        );
        let window = stay("2026-03-30", "2026-04-10");
        let swept = remaining_by_night(&rs, &window);
        let direct: Vec<i64> = window.nights().map(|n| remaining_capacity(&rs, n)).collect();
        assert_eq!(swept, direct);
    }

    #[test]
    fn overbooked_room_goes_negative() {
        // Stock lowered below current holdings: the ledger reports the deficit.
        let rs = room(
            1,
            vec![
                booking("2026-04-01", "2026-04-02", BookingStatus::Confirmed, 1),
                booking("2026-04-01", "2026-04-02", BookingStatus::Confirmed, 1),
            ],
        );
        assert_eq!(remaining_capacity(&rs, d("2026-04-01")), -1);
        assert!(!is_night_bookable(&rs, d("2026-04-01")));
    }

    #[test]
    fn first_short_night_respects_units() {
        let rs = room(3, vec![booking("2026-04-03", "2026-04-05", BookingStatus::Confirmed, 2)]);
        let window = stay("2026-04-01", "2026-04-06");
        assert_eq!(first_short_night(&rs, &window, 1), None);
        assert_eq!(first_short_night(&rs, &window, 2), Some(d("2026-04-03")));
    }

    #[test]
    fn cancelling_only_increases_bookability() {
        let mut rs = room(
            2,
            vec![
                booking("2026-04-01", "2026-04-04", BookingStatus::Confirmed, 1),
                booking("2026-04-02", "2026-04-03", BookingStatus::Pending, 1),
            ],
        );
        let window = stay("2026-04-01", "2026-04-05");
        let before: Vec<bool> = window.nights().map(|n| is_night_bookable(&rs, n)).collect();
        for b in rs.bookings.iter_mut() {
            b.status = BookingStatus::Cancelled;
        }
        for (night, was) in window.nights().zip(before) {
            assert!(is_night_bookable(&rs, night) || !was);
            assert!(is_night_bookable(&rs, night));
        }
    }
}
