use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A calendar night, the atomic unit of stock and pricing.
pub type Night = NaiveDate;

/// Unix milliseconds, used only for booking creation timestamps.
pub type Ms = i64;

/// The night after `night`. Saturates at the calendar maximum, which input
/// limits keep out of reach.
pub fn next_night(night: Night) -> Night {
    night.succ_opt().unwrap_or(NaiveDate::MAX)
}

/// Half-open night range `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: Night,
    pub check_out: Night,
}

impl Stay {
    pub fn new(check_in: Night, check_out: Night) -> Self {
        debug_assert!(check_in < check_out, "Stay check_in must be before check_out");
        Self { check_in, check_out }
    }

    pub fn night_count(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_night(&self, night: Night) -> bool {
        self.check_in <= night && night < self.check_out
    }

    /// Every night of the stay, in order.
    pub fn nights(&self) -> impl Iterator<Item = Night> + use<> {
        let end = self.check_out;
        self.check_in.iter_days().take_while(move |n| *n < end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    Refunded,
}

impl BookingStatus {
    /// Active bookings hold stock; cancelled and refunded ones do not.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::Refunded)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (Confirmed, Refunded)
                | (Completed, Refunded)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "COMPLETED" => Some(BookingStatus::Completed),
            "REFUNDED" => Some(BookingStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nightly price assignment for a room over the inclusive range `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPeriod {
    pub id: Ulid,
    pub room_id: Ulid,
    pub start: Night,
    pub end: Night,
    pub price: Decimal,
}

impl PricingPeriod {
    /// Number of nights covered, inclusive of both ends.
    pub fn span_nights(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn covers(&self, night: Night) -> bool {
        self.start <= night && night <= self.end
    }

    /// Exclusive upper bound of the covered nights.
    pub fn end_exclusive(&self) -> Night {
        next_night(self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightPrice {
    pub night: Night,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub stay: Stay,
    pub status: BookingStatus,
    /// Units of the room type held by this booking.
    pub room_count: u32,
    pub guests: u32,
    pub guest_name: String,
    /// Frozen at commit; later pricing edits never touch it.
    pub nightly_prices: Vec<NightPrice>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coupon_id: Option<Ulid>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Ulid,
    pub name: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Ulid,
    /// Stored trimmed and uppercased.
    pub code: String,
    pub discount_percent: Decimal,
    pub usage_limit: u32,
    pub used_count: u32,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub name: Option<String>,
    /// Units sellable per night.
    pub stock: u32,
    /// Max guests per unit.
    pub occupancy: u32,
    pub visible: bool,
    pub periods: Vec<PricingPeriod>,
    /// All bookings ever placed on the room, sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(
        id: Ulid,
        hotel_id: Ulid,
        name: Option<String>,
        stock: u32,
        occupancy: u32,
        visible: bool,
    ) -> Self {
        Self {
            id,
            hotel_id,
            name,
            stock,
            occupancy,
            visible,
            periods: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    pub fn remove_period(&mut self, id: Ulid) -> Option<PricingPeriod> {
        let pos = self.periods.iter().position(|p| p.id == id)?;
        Some(self.periods.remove(pos))
    }

    /// Bookings whose stay overlaps the query, regardless of status.
    /// Uses binary search to skip bookings checking in at or after `query.check_out`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        let start = query.check_in;
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > start)
    }

    pub fn has_active_bookings(&self) -> bool {
        self.bookings.iter().any(|b| b.status.is_active())
    }
}

/// The WAL record format. One event is one atomic state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    HotelCreated {
        hotel: Hotel,
    },
    RoomCreated {
        id: Ulid,
        hotel_id: Ulid,
        name: Option<String>,
        stock: u32,
        occupancy: u32,
        visible: bool,
    },
    RoomUpdated {
        id: Ulid,
        name: Option<String>,
        stock: u32,
        occupancy: u32,
        visible: bool,
    },
    RoomDeleted {
        id: Ulid,
    },
    PricingPeriodAdded {
        period: PricingPeriod,
    },
    PricingPeriodRemoved {
        id: Ulid,
        room_id: Ulid,
    },
    PricingPeriodsReplaced {
        room_id: Ulid,
        periods: Vec<PricingPeriod>,
    },
    /// Booking row plus, when present, the coupon whose used-count it consumes.
    BookingPlaced {
        booking: Booking,
        redeemed_coupon: Option<Ulid>,
    },
    BookingStatusChanged {
        id: Ulid,
        room_id: Ulid,
        status: BookingStatus,
    },
    CouponCreated {
        coupon: Coupon,
    },
    CouponUpdated {
        id: Ulid,
        code: String,
        discount_percent: Decimal,
        usage_limit: u32,
        active: bool,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityStatus {
    Full,
    Partial,
    None,
}

impl AvailabilityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AvailabilityStatus::Full => "FULL",
            AvailabilityStatus::Partial => "PARTIAL",
            AvailabilityStatus::None => "NONE",
        }
    }
}

/// Outcome of resolving a stay against one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: AvailabilityStatus,
    /// Set for FULL and PARTIAL.
    pub available_from: Option<Night>,
    pub available_to: Option<Night>,
    /// Prices for the bookable range (empty for NONE).
    pub nightly: Vec<NightPrice>,
    /// Per-unit sum of `nightly`.
    pub total: Decimal,
    /// Fewest units left on any bookable night.
    pub rooms_left: u32,
}

impl Resolution {
    pub fn none() -> Self {
        Self {
            status: AvailabilityStatus::None,
            available_from: None,
            available_to: None,
            nightly: Vec::new(),
            total: Decimal::ZERO,
            rooms_left: 0,
        }
    }

    /// The bookable sub-range, if any.
    pub fn bookable_stay(&self) -> Option<Stay> {
        match (self.available_from, self.available_to) {
            (Some(from), Some(to)) if from < to => Some(Stay::new(from, to)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub name: Option<String>,
    pub stock: u32,
    pub occupancy: u32,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomOffer {
    pub hotel_id: Ulid,
    pub room_id: Ulid,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelOffers {
    pub hotel: Hotel,
    pub rooms: Vec<RoomOffer>,
    /// Lowest average nightly price among the offered rooms.
    pub lowest_nightly: Option<Decimal>,
    pub has_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponCheck {
    pub code: String,
    pub discount_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingReceipt {
    pub id: Ulid,
    pub total: Decimal,
    pub status: BookingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> Night {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn booking(check_in: &str, check_out: &str) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: Ulid::new(),
            stay: Stay::new(d(check_in), d(check_out)),
            status: BookingStatus::Confirmed,
            room_count: 1,
            guests: 1,
            guest_name: "guest".into(),
            nightly_prices: Vec::new(),
            subtotal: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            coupon_id: None,
            created_at: 0,
        }
    }

    #[test]
    fn stay_basics() {
        let s = Stay::new(d("2026-04-01"), d("2026-04-05"));
        assert_eq!(s.night_count(), 4);
        assert!(s.contains_night(d("2026-04-01")));
        assert!(s.contains_night(d("2026-04-04")));
        assert!(!s.contains_night(d("2026-04-05"))); // check-out night is free
        let nights: Vec<_> = s.nights().collect();
        assert_eq!(nights.len(), 4);
        assert_eq!(nights[3], d("2026-04-04"));
    }

    #[test]
    fn stay_overlap() {
        let a = Stay::new(d("2026-04-01"), d("2026-04-05"));
        let b = Stay::new(d("2026-04-04"), d("2026-04-08"));
        let c = Stay::new(d("2026-04-05"), d("2026-04-06"));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // back-to-back stays share no night
    }

    #[test]
    fn stay_crosses_month_and_year() {
        let s = Stay::new(d("2026-12-30"), d("2027-01-02"));
        let nights: Vec<_> = s.nights().collect();
        assert_eq!(nights, vec![d("2026-12-30"), d("2026-12-31"), d("2027-01-01")]);
    }

    #[test]
    fn status_activity() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(BookingStatus::Completed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(!BookingStatus::Refunded.is_active());
    }

    #[test]
    fn status_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Refunded));
        assert!(Completed.can_transition_to(Refunded));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Refunded.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(BookingStatus::parse("confirmed"), Some(BookingStatus::Confirmed));
        assert_eq!(BookingStatus::parse(" Refunded "), Some(BookingStatus::Refunded));
        assert_eq!(BookingStatus::parse("EXPIRED"), None);
    }

    #[test]
    fn period_span_is_inclusive() {
        let p = PricingPeriod {
            id: Ulid::new(),
            room_id: Ulid::new(),
            start: d("2026-02-01"),
            end: d("2026-02-23"),
            price: dec!(100),
        };
        assert_eq!(p.span_nights(), 23);
        assert!(p.covers(d("2026-02-23")));
        assert!(!p.covers(d("2026-02-24")));
        assert_eq!(p.end_exclusive(), d("2026-02-24"));
    }

    #[test]
    fn bookings_stay_sorted() {
        let mut rs = RoomState::new(Ulid::new(), Ulid::new(), None, 1, 2, true);
        rs.insert_booking(booking("2026-05-10", "2026-05-12"));
        rs.insert_booking(booking("2026-05-01", "2026-05-03"));
        rs.insert_booking(booking("2026-05-05", "2026-05-06"));
        assert_eq!(rs.bookings[0].stay.check_in, d("2026-05-01"));
        assert_eq!(rs.bookings[1].stay.check_in, d("2026-05-05"));
        assert_eq!(rs.bookings[2].stay.check_in, d("2026-05-10"));
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = RoomState::new(Ulid::new(), Ulid::new(), None, 1, 2, true);
        rs.insert_booking(booking("2026-05-01", "2026-05-03"));
        rs.insert_booking(booking("2026-05-04", "2026-05-08"));
        rs.insert_booking(booking("2026-05-20", "2026-05-21"));

        let query = Stay::new(d("2026-05-03"), d("2026-05-10"));
        let hits: Vec<_> = rs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].stay.check_in, d("2026-05-04"));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut rs = RoomState::new(Ulid::new(), Ulid::new(), None, 1, 2, true);
        rs.insert_booking(booking("2026-05-01", "2026-05-03"));
        let query = Stay::new(d("2026-05-03"), d("2026-05-04"));
        assert_eq!(rs.overlapping(&query).count(), 0);
    }

    #[test]
    fn overlapping_long_stay_spanning_query() {
        let mut rs = RoomState::new(Ulid::new(), Ulid::new(), None, 1, 2, true);
        rs.insert_booking(booking("2026-01-01", "2026-12-31"));
        let query = Stay::new(d("2026-06-01"), d("2026-06-02"));
        assert_eq!(rs.overlapping(&query).count(), 1);
    }

    #[test]
    fn resolution_bookable_stay() {
        let mut r = Resolution::none();
        assert_eq!(r.bookable_stay(), None);
        r.available_from = Some(d("2026-04-01"));
        r.available_to = Some(d("2026-04-01"));
        assert_eq!(r.bookable_stay(), None);
        r.available_to = Some(d("2026-04-03"));
        assert_eq!(r.bookable_stay().unwrap().night_count(), 2);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingPlaced {
            booking: Booking {
                nightly_prices: vec![NightPrice { night: d("2026-04-01"), price: dec!(99.50) }],
                subtotal: dec!(99.50),
                total: dec!(89.55),
                discount: dec!(9.95),
                ..booking("2026-04-01", "2026-04-02")
            },
            redeemed_coupon: Some(Ulid::new()),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
