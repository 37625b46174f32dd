use crate::model::*;

use super::price::sum_nights;
use super::EngineError;
use super::pricing::PricingIndex;
use super::stock::remaining_by_night;

// ── Availability Algorithm ────────────────────────────────────────

/// Classify `stay` for one room, asking for `units` rooms on every night.
///
/// FULL: every night is priced and has `units` left.
/// PARTIAL: the run of nights from check-in that is both priced and
/// stocked is at least one night long but shorter than the stay. It always
/// starts at check-in.
/// NONE: check-in itself fails either test.
///
/// Fails only when the bookable part's total does not fit a `Decimal`.
pub fn resolve(room: &RoomState, stay: &Stay, units: u32) -> Result<Resolution, EngineError> {
    let index = PricingIndex::build(&room.periods);
    let remaining = remaining_by_night(room, stay);
    let need = i64::from(units);

    // Step 1: price coverage edge (exclusive), clamped to the stay
    let price_edge = index.maximal_prefix_coverage(stay.check_in).min(stay.check_out);

    // Step 2: walk nights until the first one that fails price or stock
    let mut available_to = stay.check_in;
    let mut rooms_left = i64::MAX;
    for (night, left) in stay.nights().zip(remaining.iter().copied()) {
        if night >= price_edge || left < need {
            break;
        }
        rooms_left = rooms_left.min(left);
        available_to = next_night(night);
    }

    if available_to == stay.check_in {
        return Ok(Resolution::none());
    }

    let bookable = Stay::new(stay.check_in, available_to);
    // Every night before price_edge is priced, so this only comes back empty
    // if the period list is inconsistent with the merge walk.
    let Some(nightly) = index.nightly_prices(&bookable) else {
        return Ok(Resolution::none());
    };
    let total = sum_nights(&nightly).ok_or(EngineError::LimitExceeded("price total too large"))?;

    let status = if available_to == stay.check_out {
        AvailabilityStatus::Full
    } else {
        AvailabilityStatus::Partial
    };

    Ok(Resolution {
        status,
        available_from: Some(stay.check_in),
        available_to: Some(available_to),
        total,
        nightly,
        rooms_left: u32::try_from(rooms_left.max(0)).unwrap_or(u32::MAX),
    })
}

/// First night of `stay` that blocks a commit, with the reason.
pub(crate) enum Blocker {
    Price(Night),
    Stock(Night),
}

/// Commit-time check: report why `stay` is no longer fully bookable, or
/// `None` when it is. A pricing gap takes precedence over a stock shortfall
/// on the same night.
pub(crate) fn first_blocker(room: &RoomState, stay: &Stay, units: u32) -> Option<Blocker> {
    let index = PricingIndex::build(&room.periods);
    let remaining = remaining_by_night(room, stay);
    let need = i64::from(units);
    stay.nights()
        .zip(remaining)
        .find_map(|(night, left)| {
            if index.price_for_night(night).is_none() {
                Some(Blocker::Price(night))
            } else if left < need {
                Some(Blocker::Stock(night))
            } else {
                None
            }
        })
}
