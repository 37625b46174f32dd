use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{first_blocker, Blocker};
use super::price::quote;
use super::pricing::PricingIndex;
use super::{forget_room_entities, Engine, EngineError, EntityClaim, WalCommand};

/// Input to `create_booking`. Dates are raw caller input; they are
/// normalized in the engine's zone.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub id: Ulid,
    pub room_id: Ulid,
    pub check_in: String,
    pub check_out: String,
    pub guest_name: String,
    pub guests: u32,
    /// Units of the room type to reserve.
    pub room_count: u32,
    pub coupon_code: Option<String>,
}

fn validate_name(name: &str, what: &'static str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn validate_period(period: &PricingPeriod) -> Result<(), EngineError> {
    if period.start > period.end {
        return Err(EngineError::InvalidPricingPeriod("start must not be after end"));
    }
    if period.price < Decimal::ZERO {
        return Err(EngineError::InvalidPricingPeriod("price must not be negative"));
    }
    if period.price > Decimal::from(MAX_NIGHTLY_PRICE) {
        return Err(EngineError::LimitExceeded("nightly price too large"));
    }
    Ok(())
}

fn validate_room_terms(stock: u32, occupancy: u32) -> Result<(), EngineError> {
    if stock > MAX_STOCK {
        return Err(EngineError::LimitExceeded("stock too large"));
    }
    if occupancy == 0 {
        return Err(EngineError::InvalidRoom("occupancy must be at least 1"));
    }
    Ok(())
}

/// Linear backoff between transient booking retries.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(10 * u64::from(attempt))
}

impl Engine {
    // ── Hotels & rooms ───────────────────────────────────────

    pub async fn create_hotel(&self, id: Ulid, name: String, city: String) -> Result<(), EngineError> {
        validate_name(&name, "hotel name too long")?;
        validate_name(&city, "city too long")?;
        if self.hotels.len() >= MAX_HOTELS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many hotels"));
        }
        let _gate = self.commit_gate.read().await;
        if self.hotels.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let hotel = Hotel { id, name, city };
        self.wal_append(&Event::HotelCreated { hotel: hotel.clone() }).await?;
        self.hotels.insert(id, hotel);
        Ok(())
    }

    pub async fn create_room(
        &self,
        id: Ulid,
        hotel_id: Ulid,
        name: Option<String>,
        stock: u32,
        occupancy: u32,
        visible: bool,
    ) -> Result<(), EngineError> {
        if let Some(ref n) = name {
            validate_name(n, "room name too long")?;
        }
        validate_room_terms(stock, occupancy)?;
        if self.rooms.len() >= MAX_ROOMS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::HotelNotFound(hotel_id));
        }
        let _gate = self.commit_gate.read().await;
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomCreated { id, hotel_id, name: name.clone(), stock, occupancy, visible };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, hotel_id, name, stock, occupancy, visible);
        self.rooms.insert(id, Arc::new(RwLock::new(rs)));
        Ok(())
    }

    /// Change a room's sellable stock, occupancy, visibility or name.
    /// Lowering stock below what is already held is allowed; the room simply
    /// stops accepting bookings on those nights.
    pub async fn update_room(
        &self,
        id: Ulid,
        name: Option<String>,
        stock: u32,
        occupancy: u32,
        visible: bool,
    ) -> Result<(), EngineError> {
        if let Some(ref n) = name {
            validate_name(n, "room name too long")?;
        }
        validate_room_terms(stock, occupancy)?;
        let _gate = self.commit_gate.read().await;
        let mut guard = self.write_room(id).await?;
        let event = Event::RoomUpdated { id, name, stock, occupancy, visible };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Delete a room. Refused while any active booking references it.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let guard = self.write_room(id).await?;
        if guard.has_active_bookings() {
            return Err(EngineError::RoomHasActiveBookings(id));
        }
        self.wal_append(&Event::RoomDeleted { id }).await?;
        forget_room_entities(&guard, &self.entity_to_room);
        self.rooms.remove(&id);
        info!(room_id = %id, "room deleted");
        Ok(())
    }

    // ── Pricing periods ──────────────────────────────────────

    pub async fn add_pricing_period(&self, period: PricingPeriod) -> Result<(), EngineError> {
        validate_period(&period)?;
        let _gate = self.commit_gate.read().await;
        let claim = self.claim_entity(period.id, period.room_id)?;
        let mut guard = self.write_room(period.room_id).await?;
        if guard.periods.len() >= MAX_PERIODS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many pricing periods on room"));
        }
        let event = Event::PricingPeriodAdded { period };
        self.persist_and_apply(&mut guard, &event).await?;
        claim.keep();
        Ok(())
    }

    /// Remove a pricing period. Returns the room it belonged to.
    pub async fn remove_pricing_period(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let _gate = self.commit_gate.read().await;
        let (room_id, mut guard) = self
            .resolve_entity_write(&id, EngineError::PricingPeriodNotFound)
            .await?;
        if !guard.periods.iter().any(|p| p.id == id) {
            return Err(EngineError::PricingPeriodNotFound(id));
        }
        let event = Event::PricingPeriodRemoved { id, room_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(room_id)
    }

    /// Replace every pricing period of a room in one step.
    pub async fn replace_pricing_periods(
        &self,
        room_id: Ulid,
        mut periods: Vec<PricingPeriod>,
    ) -> Result<(), EngineError> {
        if periods.len() > MAX_PERIODS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many pricing periods on room"));
        }
        for period in &mut periods {
            period.room_id = room_id;
            validate_period(period)?;
        }
        let _gate = self.commit_gate.read().await;
        let mut guard = self.write_room(room_id).await?;
        // Ids the room already owns are reused; every other id is claimed.
        let mut seen = HashSet::new();
        let mut claims: Vec<EntityClaim<'_>> = Vec::new();
        for period in &periods {
            if !seen.insert(period.id) {
                return Err(EngineError::AlreadyExists(period.id));
            }
            if !guard.periods.iter().any(|p| p.id == period.id) {
                claims.push(self.claim_entity(period.id, room_id)?);
            }
        }
        let event = Event::PricingPeriodsReplaced { room_id, periods };
        self.persist_and_apply(&mut guard, &event).await?;
        claims.into_iter().for_each(EntityClaim::keep);
        Ok(())
    }

    // ── Booking transaction ──────────────────────────────────

    /// Reserve `room_count` units of a room for a stay.
    ///
    /// Validation that cannot change between attempts (dates, past check-in,
    /// limits) runs once. The commit itself re-checks pricing and stock under
    /// the room's write lock and is retried a bounded number of times on
    /// transient failures only.
    pub async fn create_booking(&self, req: BookingRequest) -> Result<BookingReceipt, EngineError> {
        let result = self.create_booking_inner(&req).await;
        let outcome = match &result {
            Ok(_) => "committed",
            Err(e) => e.kind(),
        };
        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        match &result {
            Ok(receipt) => info!(
                booking_id = %receipt.id,
                room_id = %req.room_id,
                total = %receipt.total,
                coupon = req.coupon_code.as_deref().unwrap_or(""),
                "booking committed"
            ),
            Err(e) => debug!(booking_id = %req.id, room_id = %req.room_id, error = %e, "booking rejected"),
        }
        result
    }

    async fn create_booking_inner(&self, req: &BookingRequest) -> Result<BookingReceipt, EngineError> {
        let stay = self.normalize_stay(&req.check_in, &req.check_out)?;
        let today = self.today();
        if stay.check_in < today {
            return Err(EngineError::PastCheckIn(stay.check_in));
        }
        if req.room_count == 0 || req.room_count > MAX_ROOM_COUNT {
            return Err(EngineError::LimitExceeded("room count out of range"));
        }
        if req.guests == 0 {
            return Err(EngineError::LimitExceeded("at least one guest required"));
        }
        validate_name(&req.guest_name, "guest name too long")?;

        let mut attempt = 0;
        loop {
            match self.commit_booking(req, stay).await {
                Err(e) if e.is_transient() && attempt < self.settings.booking_retries => {
                    attempt += 1;
                    metrics::counter!(observability::BOOKING_RETRIES_TOTAL).increment(1);
                    warn!(booking_id = %req.id, attempt, error = %e, "retrying booking");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
                result => return result,
            }
        }
    }

    /// One attempt at the atomic commit. Either the booking row and the
    /// coupon redemption land together in a single WAL record, or nothing
    /// changes.
    ///
    /// Lock order: commit gate, booking id claim, coupon, room. The room is
    /// write-locked only for the re-check, the append and the apply.
    async fn commit_booking(&self, req: &BookingRequest, stay: Stay) -> Result<BookingReceipt, EngineError> {
        let _gate = self.commit_gate.read().await;
        let claim = self.claim_entity(req.id, req.room_id)?;
        let redemption = match &req.coupon_code {
            Some(code) => Some(self.begin_redemption(code).await?),
            None => None,
        };

        let mut room = self.write_room(req.room_id).await?;
        if !room.visible {
            return Err(EngineError::RoomNotFound(req.room_id));
        }
        if req.guests > room.occupancy {
            return Err(EngineError::OccupancyExceeded { guests: req.guests, max: room.occupancy });
        }
        if room.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        // Live re-validation: the search-time answer is only a hint.
        match first_blocker(&room, &stay, req.room_count) {
            Some(Blocker::Price(night)) => {
                return Err(EngineError::PriceCoverageChanged { room_id: req.room_id, night });
            }
            Some(Blocker::Stock(night)) => {
                return Err(EngineError::StockExhausted { room_id: req.room_id, night });
            }
            None => {}
        }
        let nightly = PricingIndex::build(&room.periods)
            .nightly_prices(&stay)
            .ok_or(EngineError::PriceCoverageChanged { room_id: req.room_id, night: stay.check_in })?;

        let coupon = redemption.as_ref().map(|r| r.coupon());
        let q = quote(&nightly, req.room_count, coupon.map(|c| c.discount_percent))
            .ok_or(EngineError::LimitExceeded("price total too large"))?;
        let coupon_id = coupon.map(|c| c.id);

        let booking = Booking {
            id: req.id,
            room_id: req.room_id,
            stay,
            status: BookingStatus::Pending,
            room_count: req.room_count,
            guests: req.guests,
            guest_name: req.guest_name.clone(),
            nightly_prices: nightly,
            subtotal: q.subtotal,
            discount: q.discount,
            total: q.total,
            coupon_id,
            created_at: self.now_ms(),
        };
        let event = Event::BookingPlaced { booking, redeemed_coupon: coupon_id };
        self.persist_and_apply(&mut room, &event).await?;
        drop(room);
        claim.keep();
        if let Some(redemption) = redemption {
            let c = redemption.finish(&event).await;
            metrics::counter!(observability::COUPON_REDEMPTIONS_TOTAL).increment(1);
            debug!(code = %c.code, used = c.used_count, limit = c.usage_limit, "coupon redeemed");
        }

        Ok(BookingReceipt {
            id: req.id,
            total: q.total,
            status: BookingStatus::Pending,
        })
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Move a booking along its lifecycle. Returns the room id.
    pub async fn set_booking_status(&self, id: Ulid, status: BookingStatus) -> Result<Ulid, EngineError> {
        let _gate = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_entity_write(&id, EngineError::BookingNotFound).await?;
        let current = guard
            .bookings
            .iter()
            .find(|b| b.id == id)
            .map(|b| b.status)
            .ok_or(EngineError::BookingNotFound(id))?;
        if !current.can_transition_to(status) {
            return Err(EngineError::InvalidStatusTransition { from: current, to: status });
        }
        let event = Event::BookingStatusChanged { id, room_id, status };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(booking_id = %id, %room_id, from = %current, to = %status, "booking status changed");
        Ok(room_id)
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        self.set_booking_status(id, BookingStatus::Cancelled).await
    }

    /// PENDING bookings created at or before `now - pending_ttl`.
    pub fn collect_stale_pending(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let Some(ttl) = self.settings.pending_ttl else {
            return Vec::new();
        };
        let cutoff = now - i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let mut stale = Vec::new();
        for entry in self.rooms.iter() {
            let rs = entry.value().clone();
            // Busy rooms are picked up on the next sweep.
            if let Ok(guard) = rs.try_read() {
                for booking in &guard.bookings {
                    if booking.status == BookingStatus::Pending && booking.created_at <= cutoff {
                        stale.push((booking.id, guard.id));
                    }
                }
            }
        }
        stale
    }

    /// Cancel every stale PENDING booking. Returns how many were cancelled.
    pub async fn expire_stale_pending(&self) -> usize {
        let now = self.now_ms();
        let mut expired = 0;
        for (booking_id, room_id) in self.collect_stale_pending(now) {
            match self.set_booking_status(booking_id, BookingStatus::Cancelled).await {
                Ok(_) => {
                    expired += 1;
                    info!(%booking_id, %room_id, "expired stale pending booking");
                }
                // Confirmed or cancelled in the meantime
                Err(e) => debug!(%booking_id, error = %e, "pending expiry skipped"),
            }
        }
        if expired > 0 {
            metrics::counter!(observability::PENDING_EXPIRED_TOTAL).increment(expired as u64);
        }
        expired
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let mut events = Vec::new();

        let mut hotels: Vec<Hotel> = self.hotels.iter().map(|e| e.value().clone()).collect();
        hotels.sort_by_key(|h| h.id);
        events.extend(hotels.into_iter().map(|hotel| Event::HotelCreated { hotel }));

        // Coupon snapshots carry their used count; bookings below are
        // emitted without re-redeeming.
        let slots: Vec<_> = self.coupons.iter().map(|e| e.value().clone()).collect();
        for slot in slots {
            events.push(Event::CouponCreated { coupon: slot.snapshot().await });
        }

        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in rooms {
            let guard = rs.read().await;
            events.push(Event::RoomCreated {
                id: guard.id,
                hotel_id: guard.hotel_id,
                name: guard.name.clone(),
                stock: guard.stock,
                occupancy: guard.occupancy,
                visible: guard.visible,
            });
            if !guard.periods.is_empty() {
                events.push(Event::PricingPeriodsReplaced {
                    room_id: guard.id,
                    periods: guard.periods.clone(),
                });
            }
            for booking in &guard.bookings {
                events.push(Event::BookingPlaced { booking: booking.clone(), redeemed_coupon: None });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
