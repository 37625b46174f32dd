use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{apply_to_coupon, Engine, EngineError, SharedCoupon};

/// Canonical form of a coupon code: trimmed and uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// One coupon: its current terms, readable at any time, and the redemption
/// mutex a booking holds from its redeemability check until its commit lands.
#[derive(Debug)]
pub struct CouponSlot {
    pub(super) redeem: Arc<Mutex<()>>,
    state: RwLock<Coupon>,
}

impl CouponSlot {
    pub fn new(coupon: Coupon) -> Self {
        Self {
            redeem: Arc::new(Mutex::new(())),
            state: RwLock::new(coupon),
        }
    }

    pub async fn snapshot(&self) -> Coupon {
        self.state.read().await.clone()
    }
}

/// A coupon held for one booking commit. Nobody else can redeem or edit the
/// coupon until this is dropped.
pub(super) struct Redemption {
    slot: SharedCoupon,
    coupon: Coupon,
    _held: OwnedMutexGuard<()>,
}

impl Redemption {
    pub(super) fn coupon(&self) -> &Coupon {
        &self.coupon
    }

    /// Apply the committed booking to the coupon's live state.
    pub(super) async fn finish(self, event: &Event) -> Coupon {
        let mut state = self.slot.state.write().await;
        apply_to_coupon(&mut state, event);
        state.clone()
    }
}

/// Redeemability checks, in the order callers see them.
pub(super) fn check_redeemable(coupon: &Coupon) -> Result<(), EngineError> {
    if !coupon.active {
        return Err(EngineError::CouponInactive(coupon.code.clone()));
    }
    if coupon.used_count >= coupon.usage_limit {
        return Err(EngineError::CouponLimitReached(coupon.code.clone()));
    }
    Ok(())
}

fn validate_terms(code: &str, discount_percent: Decimal, usage_limit: u32) -> Result<(), EngineError> {
    if code.is_empty() {
        return Err(EngineError::InvalidCoupon("code must not be empty"));
    }
    if code.len() > MAX_COUPON_CODE_LEN {
        return Err(EngineError::LimitExceeded("coupon code too long"));
    }
    if discount_percent <= Decimal::ZERO || discount_percent > Decimal::ONE_HUNDRED {
        return Err(EngineError::InvalidCoupon("discount must be in (0, 100]"));
    }
    if usage_limit == 0 {
        return Err(EngineError::InvalidCoupon("usage limit must be at least 1"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_coupon(
        &self,
        id: Ulid,
        code: &str,
        discount_percent: Decimal,
        usage_limit: u32,
        active: bool,
    ) -> Result<(), EngineError> {
        let code = normalize_code(code);
        validate_terms(&code, discount_percent, usage_limit)?;
        if self.coupons.len() >= MAX_COUPONS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many coupons"));
        }

        let _gate = self.commit_gate.read().await;
        let _admin = self.coupon_admin.lock().await;
        if self.coupons.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.coupon_codes.contains_key(&code) {
            return Err(EngineError::DuplicateCouponCode(code));
        }

        let coupon = Coupon {
            id,
            code: code.clone(),
            discount_percent,
            usage_limit,
            used_count: 0,
            active,
        };
        let event = Event::CouponCreated { coupon: coupon.clone() };
        self.wal_append(&event).await?;
        self.coupon_codes.insert(code.clone(), id);
        self.coupons.insert(id, Arc::new(CouponSlot::new(coupon)));
        info!(%id, %code, %discount_percent, usage_limit, "coupon created");
        Ok(())
    }

    /// Replace a coupon's terms. `used_count` is kept as is.
    pub async fn update_coupon(
        &self,
        id: Ulid,
        code: &str,
        discount_percent: Decimal,
        usage_limit: u32,
        active: bool,
    ) -> Result<(), EngineError> {
        let code = normalize_code(code);
        validate_terms(&code, discount_percent, usage_limit)?;

        let _gate = self.commit_gate.read().await;
        let _admin = self.coupon_admin.lock().await;
        if let Some(owner) = self.coupon_codes.get(&code)
            && *owner.value() != id
        {
            return Err(EngineError::DuplicateCouponCode(code));
        }
        let slot = self
            .coupon_slot(id)
            .ok_or_else(|| EngineError::CouponNotFound(id.to_string()))?;
        // Terms never change under a booking that is redeeming the coupon.
        let _held = slot.redeem.lock().await;

        let event = Event::CouponUpdated {
            id,
            code: code.clone(),
            discount_percent,
            usage_limit,
            active,
        };
        self.wal_append(&event).await?;
        let mut state = slot.state.write().await;
        if state.code != code {
            self.coupon_codes.remove(&state.code);
            self.coupon_codes.insert(code, id);
        }
        apply_to_coupon(&mut state, &event);
        Ok(())
    }

    pub async fn deactivate_coupon(&self, id: Ulid) -> Result<(), EngineError> {
        let current = self
            .get_coupon(id)
            .await
            .ok_or_else(|| EngineError::CouponNotFound(id.to_string()))?;
        if !current.active {
            return Ok(());
        }
        self.update_coupon(id, &current.code, current.discount_percent, current.usage_limit, false)
            .await?;
        info!(%id, code = %current.code, "coupon deactivated");
        Ok(())
    }

    /// Check a code without consuming it. Reads the coupon's current terms
    /// and never waits on a booking that is redeeming it.
    pub async fn verify_coupon(&self, code: &str) -> Result<CouponCheck, EngineError> {
        let (_, slot) = self.coupon_by_code(code)?;
        let coupon = slot.snapshot().await;
        check_redeemable(&coupon)?;
        Ok(CouponCheck {
            code: coupon.code,
            discount_percent: coupon.discount_percent,
        })
    }

    /// Hold a coupon for one booking commit, waiting at most `lock_timeout`
    /// for another redemption of the same coupon to finish.
    pub(super) async fn begin_redemption(&self, code: &str) -> Result<Redemption, EngineError> {
        let (id, slot) = self.coupon_by_code(code)?;
        let held = tokio::time::timeout(self.settings.lock_timeout, slot.redeem.clone().lock_owned())
            .await
            .map_err(|_| EngineError::Busy(id))?;
        let coupon = slot.snapshot().await;
        check_redeemable(&coupon)?;
        Ok(Redemption { slot, coupon, _held: held })
    }

    fn coupon_by_code(&self, code: &str) -> Result<(Ulid, SharedCoupon), EngineError> {
        let code = normalize_code(code);
        let id = self
            .coupon_codes
            .get(&code)
            .map(|e| *e.value())
            .ok_or_else(|| EngineError::CouponNotFound(code.clone()))?;
        let slot = self.coupon_slot(id).ok_or(EngineError::CouponNotFound(code))?;
        Ok((id, slot))
    }

    pub async fn get_coupon(&self, id: Ulid) -> Option<Coupon> {
        let slot = self.coupon_slot(id)?;
        Some(slot.snapshot().await)
    }

    pub async fn list_coupons(&self) -> Vec<Coupon> {
        let slots: Vec<_> = self.coupons.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.snapshot().await);
        }
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn coupon(active: bool, used: u32, limit: u32) -> Coupon {
        Coupon {
            id: Ulid::new(),
            code: "SAVE10".into(),
            discount_percent: dec!(10),
            usage_limit: limit,
            used_count: used,
            active,
        }
    }

    #[test]
    fn codes_are_trimmed_and_uppercased() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
        assert_eq!(normalize_code("Summer-2026"), "SUMMER-2026");
    }

    #[test]
    fn redeemable_when_active_and_under_limit() {
        assert!(check_redeemable(&coupon(true, 0, 1)).is_ok());
        assert!(check_redeemable(&coupon(true, 4, 5)).is_ok());
    }

    #[test]
    fn inactive_checked_before_limit() {
        assert!(matches!(
            check_redeemable(&coupon(false, 1, 1)),
            Err(EngineError::CouponInactive(_))
        ));
    }

    #[test]
    fn limit_reached_at_used_equals_limit() {
        assert!(matches!(
            check_redeemable(&coupon(true, 1, 1)),
            Err(EngineError::CouponLimitReached(_))
        ));
    }

    #[test]
    fn terms_validation() {
        assert!(validate_terms("X", dec!(100), 1).is_ok());
        assert!(validate_terms("X", dec!(0.5), 1).is_ok());
        assert!(validate_terms("", dec!(10), 1).is_err());
        assert!(validate_terms("X", dec!(0), 1).is_err());
        assert!(validate_terms("X", dec!(100.01), 1).is_err());
        assert!(validate_terms("X", dec!(10), 0).is_err());
        assert!(validate_terms(&"X".repeat(MAX_COUPON_CODE_LEN + 1), dec!(10), 1).is_err());
    }
}
