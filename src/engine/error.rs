use ulid::Ulid;

use crate::dates::DateError;
use crate::model::{BookingStatus, Night};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidDate(#[from] DateError),
    #[error("invalid date range: check-out {check_out} must be after check-in {check_in}")]
    InvalidDateRange { check_in: Night, check_out: Night },
    #[error("check-in {0} is in the past")]
    PastCheckIn(Night),
    #[error("room not found: {0}")]
    RoomNotFound(Ulid),
    #[error("hotel not found: {0}")]
    HotelNotFound(Ulid),
    #[error("pricing period not found: {0}")]
    PricingPeriodNotFound(Ulid),
    #[error("booking not found: {0}")]
    BookingNotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("stock exhausted on room {room_id} for night {night}")]
    StockExhausted { room_id: Ulid, night: Night },
    #[error("pricing no longer covers room {room_id} on night {night}")]
    PriceCoverageChanged { room_id: Ulid, night: Night },
    #[error("{guests} guests exceed room occupancy of {max}")]
    OccupancyExceeded { guests: u32, max: u32 },
    #[error("coupon not found: {0}")]
    CouponNotFound(String),
    #[error("coupon inactive: {0}")]
    CouponInactive(String),
    #[error("coupon usage limit reached: {0}")]
    CouponLimitReached(String),
    #[error("coupon code already in use: {0}")]
    DuplicateCouponCode(String),
    #[error("invalid coupon: {0}")]
    InvalidCoupon(&'static str),
    #[error("invalid room: {0}")]
    InvalidRoom(&'static str),
    #[error("invalid pricing period: {0}")]
    InvalidPricingPeriod(&'static str),
    #[error("cannot move booking from {from} to {to}")]
    InvalidStatusTransition { from: BookingStatus, to: BookingStatus },
    #[error("room {0} still has active bookings")]
    RoomHasActiveBookings(Ulid),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("room {0} is busy, try again")]
    Busy(Ulid),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Transient failures are retried by the booking path; everything else
    /// is a business-rule outcome and goes straight back to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Busy(_) | EngineError::WalError(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidDate(_) => "invalid_date",
            EngineError::InvalidDateRange { .. } => "invalid_date_range",
            EngineError::PastCheckIn(_) => "past_check_in",
            EngineError::RoomNotFound(_) => "room_not_found",
            EngineError::HotelNotFound(_) => "hotel_not_found",
            EngineError::PricingPeriodNotFound(_) => "pricing_period_not_found",
            EngineError::BookingNotFound(_) => "booking_not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::StockExhausted { .. } => "stock_exhausted",
            EngineError::PriceCoverageChanged { .. } => "price_coverage_changed",
            EngineError::OccupancyExceeded { .. } => "occupancy_exceeded",
            EngineError::CouponNotFound(_) => "coupon_not_found",
            EngineError::CouponInactive(_) => "coupon_inactive",
            EngineError::CouponLimitReached(_) => "coupon_limit_reached",
            EngineError::DuplicateCouponCode(_) => "duplicate_coupon_code",
            EngineError::InvalidCoupon(_) => "invalid_coupon",
            EngineError::InvalidRoom(_) => "invalid_room",
            EngineError::InvalidPricingPeriod(_) => "invalid_pricing_period",
            EngineError::InvalidStatusTransition { .. } => "invalid_status_transition",
            EngineError::RoomHasActiveBookings(_) => "room_has_active_bookings",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Busy(_) => "busy",
            EngineError::WalError(_) => "wal_error",
        }
    }
}
