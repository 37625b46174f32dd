//! Hard caps on tenant input. Anything beyond these is rejected with
//! `EngineError::LimitExceeded` before touching state.

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 256;

pub const MAX_HOTELS_PER_TENANT: usize = 100_000;
pub const MAX_ROOMS_PER_TENANT: usize = 1_000_000;
pub const MAX_PERIODS_PER_ROOM: usize = 4_096;
pub const MAX_BOOKINGS_PER_ROOM: usize = 1_000_000;
pub const MAX_COUPONS_PER_TENANT: usize = 100_000;

pub const MAX_NAME_LEN: usize = 512;
pub const MAX_COUPON_CODE_LEN: usize = 64;

/// Longest stay (and widest availability query) in nights.
pub const MAX_STAY_NIGHTS: i64 = 366;
pub const MAX_ROOM_COUNT: u32 = 100;
pub const MAX_STOCK: u32 = 100_000;
/// Highest accepted nightly price, in whole currency units.
pub const MAX_NIGHTLY_PRICE: i64 = 1_000_000_000;

pub const MIN_VALID_YEAR: i32 = 1970;
pub const MAX_VALID_YEAR: i32 = 2200;

/// Statement-level cap for `search` result rooms.
pub const MAX_SEARCH_ROOMS: usize = 10_000;
