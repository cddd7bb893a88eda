//! Persistence of the usage record.

use crate::models::UsageRecord;
use chrono::NaiveDate;
use std::sync::Arc;
use studio_core::error::AppError;
use studio_core::store::KeyValueStore;

/// Storage key for the serialized usage record.
pub const USAGE_STORAGE_KEY: &str = "genai_usage";

#[derive(Clone)]
pub struct UsageRepository {
    store: Arc<dyn KeyValueStore>,
}

impl UsageRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The record as of `today`: persisted and rolled over, or fresh.
    ///
    /// An unreadable document is replaced rather than blocking the user.
    pub fn load(&self, today: NaiveDate) -> Result<UsageRecord, AppError> {
        let Some(raw) = self.store.get(USAGE_STORAGE_KEY)? else {
            return Ok(UsageRecord::new(today));
        };

        match serde_json::from_str::<UsageRecord>(&raw) {
            Ok(record) => Ok(record.rolled_over(today)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable usage record");
                Ok(UsageRecord::new(today))
            }
        }
    }

    pub fn save(&self, record: &UsageRecord) -> Result<(), AppError> {
        let json = serde_json::to_string(record)?;
        self.store.set(USAGE_STORAGE_KEY, &json)?;
        tracing::debug!(
            credits_used = record.credits_used_today,
            entitled = record.is_entitled,
            "Saved usage record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::store::MemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
    }

    #[test]
    fn load_creates_fresh_record_on_first_launch() {
        let repo = UsageRepository::new(Arc::new(MemoryStore::new()));
        let record = repo.load(day(1)).unwrap();
        assert_eq!(record, UsageRecord::new(day(1)));
    }

    #[test]
    fn save_then_load_on_next_day_resets_counter() {
        let repo = UsageRepository::new(Arc::new(MemoryStore::new()));
        let mut record = UsageRecord::new(day(1));
        record.credits_used_today = 4;
        record.is_entitled = true;
        repo.save(&record).unwrap();

        assert_eq!(repo.load(day(1)).unwrap().credits_used_today, 4);

        let next_day = repo.load(day(2)).unwrap();
        assert_eq!(next_day.credits_used_today, 0);
        assert_eq!(next_day.last_reset_date, day(2));
        assert!(next_day.is_entitled);
    }

    #[test]
    fn corrupt_document_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.set(USAGE_STORAGE_KEY, "{broken").unwrap();

        let repo = UsageRepository::new(store);
        assert_eq!(repo.load(day(3)).unwrap(), UsageRecord::new(day(3)));
    }
}
