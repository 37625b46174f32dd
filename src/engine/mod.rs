mod availability;
mod coupons;
mod error;
mod mutations;
mod price;
mod pricing;
mod queries;
mod stock;

pub use availability::resolve;
pub use coupons::{normalize_code, CouponSlot};
pub use error::EngineError;
pub use mutations::BookingRequest;
pub use price::{quote, round_currency, Quote, CURRENCY_DP};
pub use pricing::PricingIndex;
pub use stock::{is_night_bookable, remaining_by_night, remaining_capacity};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::dates;
use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;
pub type SharedCoupon = Arc<CouponSlot>;

/// Per-tenant knobs the engine needs at runtime.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Zone in which dates are normalized and "today" is computed.
    pub timezone: Tz,
    /// PENDING bookings older than this are cancelled by the reaper. `None` disables.
    pub pending_ttl: Option<Duration>,
    /// Longest wait for a room's write lock before giving up with `Busy`.
    pub lock_timeout: Duration,
    /// Extra attempts for a booking that failed transiently.
    pub booking_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            pending_ttl: Some(Duration::from_secs(900)),
            lock_timeout: Duration::from_millis(2000),
            booking_retries: 3,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch outcome.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        // Non-append commands observe every append queued before them.
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(error = %e, batch = batch.len(), "WAL flush failed");
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so buffered bytes don't leak into the
    // next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            commit_batch(wal, &mut vec![(event, response)]);
        }
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub rooms: DashMap<Ulid, SharedRoomState>,
    pub hotels: DashMap<Ulid, Hotel>,
    pub(super) coupons: DashMap<Ulid, SharedCoupon>,
    /// Normalized coupon code → coupon id.
    pub(super) coupon_codes: DashMap<String, Ulid>,
    /// Reverse lookup: pricing period or booking id → room id.
    pub(super) entity_to_room: DashMap<Ulid, Ulid>,
    /// Serializes coupon create/update so codes stay unique.
    pub(super) coupon_admin: Mutex<()>,
    /// Mutations hold this shared for their whole append+apply; compaction
    /// takes it exclusively so its snapshot never misses an event.
    pub(super) commit_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub settings: EngineSettings,
    pub(super) clock: Arc<dyn Clock>,
}

/// Apply a room-scoped event (caller holds the room's write lock).
fn apply_to_room(rs: &mut RoomState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::RoomUpdated { name, stock, occupancy, visible, .. } => {
            rs.name = name.clone();
            rs.stock = *stock;
            rs.occupancy = *occupancy;
            rs.visible = *visible;
        }
        Event::PricingPeriodAdded { period } => {
            rs.periods.push(period.clone());
            entity_map.insert(period.id, rs.id);
        }
        Event::PricingPeriodRemoved { id, .. } => {
            rs.remove_period(*id);
            entity_map.remove(id);
        }
        Event::PricingPeriodsReplaced { periods, .. } => {
            for old in &rs.periods {
                entity_map.remove(&old.id);
            }
            rs.periods = periods.clone();
            for period in &rs.periods {
                entity_map.insert(period.id, rs.id);
            }
        }
        Event::BookingPlaced { booking, .. } => {
            rs.insert_booking(booking.clone());
            entity_map.insert(booking.id, rs.id);
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(booking) = rs.booking_mut(*id) {
                booking.status = *status;
            }
        }
        // Map-level events are handled by the caller
        Event::HotelCreated { .. }
        | Event::RoomCreated { .. }
        | Event::RoomDeleted { .. }
        | Event::CouponCreated { .. }
        | Event::CouponUpdated { .. } => {}
    }
}

/// Apply a coupon-scoped event (caller holds the coupon's lock).
fn apply_to_coupon(coupon: &mut Coupon, event: &Event) {
    match event {
        Event::CouponUpdated { code, discount_percent, usage_limit, active, .. } => {
            coupon.code = code.clone();
            coupon.discount_percent = *discount_percent;
            coupon.usage_limit = *usage_limit;
            coupon.active = *active;
        }
        Event::BookingPlaced { redeemed_coupon: Some(id), .. } if *id == coupon.id => {
            coupon.used_count = coupon.used_count.saturating_add(1);
        }
        _ => {}
    }
}

/// An id reserved in the reverse index by `Engine::claim_entity`. Released on
/// drop unless `keep` is called once the owning event has been applied.
pub(super) struct EntityClaim<'a> {
    map: &'a DashMap<Ulid, Ulid>,
    id: Ulid,
    kept: bool,
}

impl EntityClaim<'_> {
    pub(super) fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for EntityClaim<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.map.remove(&self.id);
        }
    }
}

/// Drop every period and booking of a deleted room from the reverse index.
fn forget_room_entities(rs: &RoomState, entity_map: &DashMap<Ulid, Ulid>) {
    for period in &rs.periods {
        entity_map.remove(&period.id);
    }
    for booking in &rs.bookings {
        entity_map.remove(&booking.id);
    }
}

/// Room touched by a room-scoped event.
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomUpdated { id, .. } => Some(*id),
        Event::PricingPeriodAdded { period } => Some(period.room_id),
        Event::PricingPeriodRemoved { room_id, .. }
        | Event::PricingPeriodsReplaced { room_id, .. }
        | Event::BookingStatusChanged { room_id, .. } => Some(*room_id),
        Event::BookingPlaced { booking, .. } => Some(booking.room_id),
        Event::HotelCreated { .. }
        | Event::RoomCreated { .. }
        | Event::RoomDeleted { .. }
        | Event::CouponCreated { .. }
        | Event::CouponUpdated { .. } => None,
    }
}

/// Coupon touched by a coupon-scoped event.
fn event_coupon_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::CouponUpdated { id, .. } => Some(*id),
        Event::BookingPlaced { redeemed_coupon, .. } => *redeemed_coupon,
        _ => None,
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        Self::with_settings(wal_path, EngineSettings::default(), Arc::new(SystemClock))
    }

    pub fn with_settings(
        wal_path: PathBuf,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let hotels = DashMap::new();
        let entity_to_room = DashMap::new();
        let mut rooms: HashMap<Ulid, RoomState> = HashMap::new();
        let mut coupons: HashMap<Ulid, Coupon> = HashMap::new();

        // Replay into plain maps first; locks are only wrapped around the
        // final state.
        for event in &events {
            match event {
                Event::HotelCreated { hotel } => {
                    hotels.insert(hotel.id, hotel.clone());
                }
                Event::RoomCreated { id, hotel_id, name, stock, occupancy, visible } => {
                    let rs = RoomState::new(*id, *hotel_id, name.clone(), *stock, *occupancy, *visible);
                    rooms.insert(*id, rs);
                }
                Event::RoomDeleted { id } => {
                    if let Some(rs) = rooms.remove(id) {
                        forget_room_entities(&rs, &entity_to_room);
                    }
                }
                Event::CouponCreated { coupon } => {
                    coupons.insert(coupon.id, coupon.clone());
                }
                // A retried append can land twice; the first copy wins.
                Event::BookingPlaced { booking, .. } if entity_to_room.contains_key(&booking.id) => {}
                other => {
                    if let Some(room_id) = event_room_id(other)
                        && let Some(rs) = rooms.get_mut(&room_id)
                    {
                        apply_to_room(rs, other, &entity_to_room);
                    }
                    if let Some(coupon_id) = event_coupon_id(other)
                        && let Some(coupon) = coupons.get_mut(&coupon_id)
                    {
                        apply_to_coupon(coupon, other);
                    }
                }
            }
        }

        let coupon_codes = DashMap::new();
        let coupon_map = DashMap::new();
        for (id, coupon) in coupons {
            coupon_codes.insert(coupon.code.clone(), id);
            coupon_map.insert(id, Arc::new(CouponSlot::new(coupon)));
        }
        let room_map = DashMap::new();
        for (id, rs) in rooms {
            room_map.insert(id, Arc::new(RwLock::new(rs)));
        }

        tracing::debug!(
            events = events.len(),
            rooms = room_map.len(),
            coupons = coupon_map.len(),
            path = %wal_path.display(),
            "replayed WAL"
        );

        Ok(Self {
            rooms: room_map,
            hotels,
            coupons: coupon_map,
            coupon_codes,
            entity_to_room,
            coupon_admin: Mutex::new(()),
            commit_gate: RwLock::new(()),
            wal_tx,
            settings,
            clock,
        })
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply to a locked room.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.entity_to_room);
        Ok(())
    }

    pub fn get_room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn get_room_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_room.get(entity_id).map(|e| *e.value())
    }

    /// Acquire a room's write lock, waiting at most `lock_timeout`.
    pub(super) async fn write_room(
        &self,
        room_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = tokio::time::timeout(self.settings.lock_timeout, rs.write_owned())
            .await
            .map_err(|_| EngineError::Busy(room_id))?;
        // The room may have been deleted while we queued for its lock.
        if !self.rooms.contains_key(&room_id) {
            return Err(EngineError::RoomNotFound(room_id));
        }
        Ok(guard)
    }

    /// Lookup entity → room, then acquire the room's write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
        not_found: impl FnOnce(Ulid) -> EngineError,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .get_room_for_entity(entity_id)
            .ok_or_else(|| not_found(*entity_id))?;
        let guard = self.write_room(room_id).await?;
        Ok((room_id, guard))
    }

    pub(super) fn coupon_slot(&self, id: Ulid) -> Option<SharedCoupon> {
        self.coupons.get(&id).map(|e| e.value().clone())
    }

    /// Reserve a booking or pricing-period id for `room_id` in the reverse
    /// index. Fails if the id is taken or already claimed by a commit in
    /// flight.
    pub(super) fn claim_entity(&self, id: Ulid, room_id: Ulid) -> Result<EntityClaim<'_>, EngineError> {
        match self.entity_to_room.entry(id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(room_id);
                Ok(EntityClaim { map: &self.entity_to_room, id, kept: false })
            }
        }
    }

    pub fn timezone(&self) -> Tz {
        self.settings.timezone
    }

    /// Today's night in the engine's zone, per the injected clock.
    pub fn today(&self) -> Night {
        dates::night_of(self.clock.now(), self.settings.timezone)
    }

    pub(super) fn now_ms(&self) -> Ms {
        self.clock.now().timestamp_millis()
    }

    /// Normalize one date-like input in the engine's zone.
    pub fn normalize_date(&self, input: &str) -> Result<Night, EngineError> {
        Ok(dates::normalize(input, self.settings.timezone)?)
    }

    /// Normalize both ends and reject empty, inverted or over-long stays.
    pub fn normalize_stay(&self, check_in: &str, check_out: &str) -> Result<Stay, EngineError> {
        let check_in = self.normalize_date(check_in)?;
        let check_out = self.normalize_date(check_out)?;
        if check_out <= check_in {
            return Err(EngineError::InvalidDateRange { check_in, check_out });
        }
        let stay = Stay::new(check_in, check_out);
        if stay.night_count() > crate::limits::MAX_STAY_NIGHTS {
            return Err(EngineError::LimitExceeded("stay too long"));
        }
        Ok(stay)
    }
}
