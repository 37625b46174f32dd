use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "innkeep_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "innkeep_query_duration_seconds";

/// Counter: booking attempts. Labels: outcome (committed or an error kind).
pub const BOOKINGS_TOTAL: &str = "innkeep_bookings_total";

/// Counter: booking attempts retried after a transient failure.
pub const BOOKING_RETRIES_TOTAL: &str = "innkeep_booking_retries_total";

/// Counter: coupon redemptions committed with a booking.
pub const COUPON_REDEMPTIONS_TOTAL: &str = "innkeep_coupon_redemptions_total";

/// Counter: PENDING bookings cancelled by the reaper.
pub const PENDING_EXPIRED_TOTAL: &str = "innkeep_pending_expired_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "innkeep_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "innkeep_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "innkeep_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "innkeep_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!(error = %e, "failed to install Prometheus metrics exporter"),
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertHotel { .. } => "insert_hotel",
        Command::InsertRoom { .. } => "insert_room",
        Command::UpdateRoom { .. } => "update_room",
        Command::DeleteRoom { .. } => "delete_room",
        Command::InsertPricingPeriod(_) => "insert_pricing_period",
        Command::ReplacePricingPeriods { .. } => "replace_pricing_periods",
        Command::DeletePricingPeriod { .. } => "delete_pricing_period",
        Command::InsertBooking { .. } => "insert_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SetBookingStatus { .. } => "set_booking_status",
        Command::InsertCoupon(_) => "insert_coupon",
        Command::UpdateCoupon(_) => "update_coupon",
        Command::DeleteCoupon { .. } => "delete_coupon",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectSearch { .. } => "select_search",
        Command::SelectCouponCheck { .. } => "select_coupon_check",
        Command::SelectBookingById { .. } => "select_booking",
        Command::SelectBookingsByRoom { .. } => "select_bookings",
        Command::SelectHotels => "select_hotels",
        Command::SelectRooms { .. } => "select_rooms",
        Command::SelectPricingPeriods { .. } => "select_pricing_periods",
        Command::SelectCoupons => "select_coupons",
    }
}
