use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::resolve;
use super::{Engine, EngineError};

impl Engine {
    /// Classify a stay for one room and price its bookable part.
    pub async fn resolve_availability(
        &self,
        room_id: Ulid,
        check_in: &str,
        check_out: &str,
    ) -> Result<Resolution, EngineError> {
        let stay = self.normalize_stay(check_in, check_out)?;
        self.resolve_stay(room_id, stay, 1).await
    }

    /// Same as `resolve_availability`, for an already normalized stay and
    /// any number of units.
    pub async fn resolve_stay(&self, room_id: Ulid, stay: Stay, units: u32) -> Result<Resolution, EngineError> {
        if units == 0 || units > MAX_ROOM_COUNT {
            return Err(EngineError::LimitExceeded("room count out of range"));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        if !guard.visible {
            return Err(EngineError::RoomNotFound(room_id));
        }
        resolve(&guard, &stay, units)
    }

    /// Offers for every visible room in `city` that fits `guests` and is at
    /// least partly bookable. Hotels are ordered by their lowest average
    /// nightly price, then name.
    pub async fn search(
        &self,
        city: &str,
        check_in: &str,
        check_out: &str,
        guests: u32,
    ) -> Result<Vec<HotelOffers>, EngineError> {
        let stay = self.normalize_stay(check_in, check_out)?;
        let city = city.trim().to_lowercase();

        let hotel_ids: HashSet<Ulid> = self
            .hotels
            .iter()
            .filter(|e| e.value().city.trim().to_lowercase() == city)
            .map(|e| *e.key())
            .collect();
        if hotel_ids.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut by_hotel: HashMap<Ulid, Vec<RoomOffer>> = HashMap::new();
        let mut scanned = 0usize;
        for rs in candidates {
            let guard = rs.read().await;
            if !hotel_ids.contains(&guard.hotel_id) || !guard.visible || guard.occupancy < guests {
                continue;
            }
            scanned += 1;
            if scanned > MAX_SEARCH_ROOMS {
                return Err(EngineError::LimitExceeded("too many rooms in city"));
            }
            let resolution = resolve(&guard, &stay, 1)?;
            if resolution.status == AvailabilityStatus::None {
                continue;
            }
            by_hotel.entry(guard.hotel_id).or_default().push(RoomOffer {
                hotel_id: guard.hotel_id,
                room_id: guard.id,
                resolution,
            });
        }

        let mut out: Vec<HotelOffers> = by_hotel
            .into_iter()
            .filter_map(|(hotel_id, mut rooms)| {
                let hotel = self.hotels.get(&hotel_id)?.value().clone();
                rooms.sort_by_key(|r| r.room_id);
                let lowest_nightly = rooms.iter().filter_map(|r| average_nightly(&r.resolution)).min();
                let has_partial = rooms
                    .iter()
                    .any(|r| r.resolution.status == AvailabilityStatus::Partial);
                Some(HotelOffers { hotel, rooms, lowest_nightly, has_partial })
            })
            .collect();
        out.sort_by(|a, b| {
            a.lowest_nightly
                .cmp(&b.lowest_nightly)
                .then_with(|| a.hotel.name.cmp(&b.hotel.name))
        });
        Ok(out)
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let room_id = self.get_room_for_entity(&id)?;
        let rs = self.get_room_state(&room_id)?;
        let guard = rs.read().await;
        guard.bookings.iter().find(|b| b.id == id).cloned()
    }

    /// All bookings of a room, ordered by check-in.
    pub async fn list_bookings(&self, room_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.bookings.clone())
    }

    pub async fn get_room(&self, id: Ulid) -> Option<RoomInfo> {
        let rs = self.get_room_state(&id)?;
        let guard = rs.read().await;
        Some(room_info(&guard))
    }

    pub async fn list_rooms(&self, hotel_id: Option<Ulid>) -> Vec<RoomInfo> {
        let handles: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in handles {
            let guard = rs.read().await;
            if hotel_id.is_none_or(|h| h == guard.hotel_id) {
                out.push(room_info(&guard));
            }
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn list_pricing_periods(&self, room_id: Ulid) -> Result<Vec<PricingPeriod>, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        let mut periods = guard.periods.clone();
        periods.sort_by_key(|p| (p.start, p.end));
        Ok(periods)
    }

    pub fn list_hotels(&self) -> Vec<Hotel> {
        let mut out: Vec<Hotel> = self.hotels.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }
}

fn room_info(rs: &RoomState) -> RoomInfo {
    RoomInfo {
        id: rs.id,
        hotel_id: rs.hotel_id,
        name: rs.name.clone(),
        stock: rs.stock,
        occupancy: rs.occupancy,
        visible: rs.visible,
    }
}

/// Mean nightly price over the bookable part of a resolution.
pub(crate) fn average_nightly(resolution: &Resolution) -> Option<Decimal> {
    let nights = resolution.nightly.len();
    if nights == 0 {
        return None;
    }
    Some(resolution.total / Decimal::from(nights))
}
