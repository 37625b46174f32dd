use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::engine::{Engine, EngineSettings};
use crate::limits::*;
use crate::reaper;

/// File stem of a tenant's WAL: the database name with everything but
/// alphanumerics, `_` and `-` removed, so it cannot escape the data dir.
pub fn tenant_file_stem(tenant: &str) -> std::io::Result<String> {
    if tenant.len() > MAX_TENANT_NAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "tenant name too long",
        ));
    }
    let stem: String = tenant
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if stem.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty tenant name",
        ));
    }
    Ok(stem)
}

/// Manages per-tenant engines. Each tenant gets its own Engine + WAL + reaper.
/// Tenant = database name from the pgwire connection.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, settings: EngineSettings) -> Self {
        Self::with_clock(data_dir, compact_threshold, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        data_dir: PathBuf,
        compact_threshold: u64,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            settings,
            clock,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        let safe_name = tenant_file_stem(tenant)?;

        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // The entry lock keeps two first connections from opening the same WAL twice.
        let entry = self.engines.entry(tenant.to_string());
        if let dashmap::mapref::entry::Entry::Occupied(existing) = &entry {
            return Ok(existing.get().clone());
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::with_settings(
            wal_path,
            self.settings.clone(),
            self.clock.clone(),
        )?);

        let reaper_engine = engine.clone();
        tokio::spawn(async move {
            reaper::run_reaper(reaper_engine).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            reaper::run_compactor(compactor_engine, threshold).await;
        });

        entry.insert(engine.clone());
        info!(tenant = %safe_name, "tenant loaded");
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BookingRequest;
    use crate::model::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::fs;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> TenantManager {
        TenantManager::new(dir, 1000, EngineSettings::default())
    }

    async fn seed(engine: &Engine, room_id: Ulid, stock: u32) {
        let hotel_id = Ulid::new();
        engine.create_hotel(hotel_id, "Nakheel".into(), "Riyadh".into()).await.unwrap();
        engine.create_room(room_id, hotel_id, None, stock, 2, true).await.unwrap();
        engine
            .add_pricing_period(PricingPeriod {
                id: Ulid::new(),
                room_id,
                start: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
                price: dec!(100),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let dir = test_data_dir("isolation");
        let tm = manager(dir);

        let eng_a = tm.get_or_create("tenant_a").unwrap();
        let eng_b = tm.get_or_create("tenant_b").unwrap();

        // Same room id in both tenants
        let room_id = Ulid::new();
        seed(&eng_a, room_id, 1).await;
        seed(&eng_b, room_id, 1).await;

        eng_a
            .create_booking(BookingRequest {
                id: Ulid::new(),
                room_id,
                check_in: "2099-03-01".into(),
                check_out: "2099-03-03".into(),
                guest_name: "Noor".into(),
                guests: 1,
                room_count: 1,
                coupon_code: None,
            })
            .await
            .unwrap();

        let a = eng_a.resolve_availability(room_id, "2099-03-01", "2099-03-03").await.unwrap();
        let b = eng_b.resolve_availability(room_id, "2099-03-01", "2099-03-03").await.unwrap();
        assert_eq!(a.status, AvailabilityStatus::None);
        assert_eq!(b.status, AvailabilityStatus::Full);
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = manager(dir.clone());

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert!(entries.is_empty());

        let _eng = tm.get_or_create("my_db").unwrap();
        assert!(dir.join("my_db.wal").exists());
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let dir = test_data_dir("same_eng");
        let tm = manager(dir);

        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_settings_propagate() {
        let dir = test_data_dir("settings");
        let settings = EngineSettings {
            timezone: chrono_tz::Asia::Riyadh,
            pending_ttl: None,
            ..EngineSettings::default()
        };
        let tm = TenantManager::new(dir, 1000, settings);
        let engine = tm.get_or_create("riyadh").unwrap();
        assert_eq!(engine.timezone(), chrono_tz::Asia::Riyadh);
        assert_eq!(engine.settings.pending_ttl, None);
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = manager(dir.clone());

        let _eng = tm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());

        let result = tm.get_or_create("../..");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let dir = test_data_dir("name_too_long");
        let tm = manager(dir);

        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let err = tm.get_or_create(&long_name).err().unwrap();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let dir = test_data_dir("count_limit");
        let tm = manager(dir);

        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let err = tm.get_or_create("one_more").err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
    }
}
