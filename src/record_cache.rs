use crate::errors::StoreError;
use crate::models::{DailyRecordMark, TodayRecord, WeightOption};
use crate::storage::LocalStore;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use tracing::debug;

pub const GUEST_KEY: &str = "guest";

/// Asia/Shanghai has had no daylight saving since 1991.
const SHANGHAI_OFFSET: FixedOffset = match FixedOffset::east_opt(8 * 3600) {
    Some(offset) => offset,
    None => panic!("UTC+8 is a valid offset"),
};

pub fn user_key(user_id: Option<i64>) -> String {
    match user_id {
        Some(id) => id.to_string(),
        None => GUEST_KEY.to_string(),
    }
}

pub fn shanghai_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&SHANGHAI_OFFSET).date_naive()
}

pub fn today() -> NaiveDate {
    shanghai_date(Utc::now())
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Per-user mirror of "already recorded today", so callers can show a
/// result before the backend answers.
#[derive(Clone)]
pub struct RecordCache {
    store: Arc<LocalStore>,
}

impl RecordCache {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub async fn has_recorded_today(&self, user_id: Option<i64>) -> bool {
        self.has_recorded_today_on(user_id, today()).await
    }

    pub async fn has_recorded_today_on(&self, user_id: Option<i64>, today: NaiveDate) -> bool {
        self.today_option_on(user_id, today).await.is_some()
    }

    pub async fn today_option(&self, user_id: Option<i64>) -> Option<WeightOption> {
        self.today_option_on(user_id, today()).await
    }

    pub async fn today_option_on(
        &self,
        user_id: Option<i64>,
        today: NaiveDate,
    ) -> Option<WeightOption> {
        let key = user_key(user_id);
        let today = date_key(today);
        self.store
            .read(|data| {
                data.marks
                    .get(&key)
                    .filter(|mark| mark.date == today)
                    .map(|mark| mark.option)
            })
            .await
    }

    pub async fn save(&self, user_id: Option<i64>, option: WeightOption) -> Result<(), StoreError> {
        self.save_on(user_id, option, today()).await
    }

    pub async fn save_on(
        &self,
        user_id: Option<i64>,
        option: WeightOption,
        today: NaiveDate,
    ) -> Result<(), StoreError> {
        let key = user_key(user_id);
        let mark = DailyRecordMark {
            date: date_key(today),
            option,
        };
        debug!(user = %key, date = %mark.date, option = option.label(), "saving daily mark");
        self.store
            .update(|data| {
                data.marks.insert(key, mark);
            })
            .await
    }

    pub async fn clear(&self, user_id: Option<i64>) -> Result<(), StoreError> {
        let key = user_key(user_id);
        if !self.store.read(|data| data.marks.contains_key(&key)).await {
            return Ok(());
        }
        self.store
            .update(|data| {
                data.marks.remove(&key);
            })
            .await
    }

    pub async fn clear_all(&self) -> Result<(), StoreError> {
        self.store.update(|data| data.marks.clear()).await
    }

    /// Drops a mark left over from an earlier day. Returns whether one was
    /// dropped.
    pub async fn reconcile_if_stale(&self, user_id: Option<i64>) -> Result<bool, StoreError> {
        self.reconcile_if_stale_on(user_id, today()).await
    }

    pub async fn reconcile_if_stale_on(
        &self,
        user_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<bool, StoreError> {
        let key = user_key(user_id);
        let today = date_key(today);
        let stale = self
            .store
            .read(|data| data.marks.get(&key).is_some_and(|mark| mark.date != today))
            .await;
        if stale {
            debug!(user = %key, "clearing stale daily mark");
            self.clear(user_id).await?;
        }
        Ok(stale)
    }

    /// Adopts the backend's answer for today: a remote option overwrites
    /// the local mark, no remote record removes it. A record without a
    /// weight type leaves the local mark alone.
    pub async fn reconcile_with_remote(
        &self,
        user_id: Option<i64>,
        remote: Option<&TodayRecord>,
    ) -> Result<Option<WeightOption>, StoreError> {
        self.reconcile_with_remote_on(user_id, remote, today()).await
    }

    pub async fn reconcile_with_remote_on(
        &self,
        user_id: Option<i64>,
        remote: Option<&TodayRecord>,
        today: NaiveDate,
    ) -> Result<Option<WeightOption>, StoreError> {
        let Some(record) = remote else {
            self.clear(user_id).await?;
            return Ok(None);
        };

        match record.option() {
            Some(option) => {
                self.save_on(user_id, option, today).await?;
                Ok(Some(option))
            }
            None => {
                debug!(user = %user_key(user_id), "remote record has no weight type, keeping local mark");
                Ok(self.today_option_on(user_id, today).await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::unique_data_path;
    use chrono::TimeZone;

    async fn open_cache(tag: &str) -> (RecordCache, std::path::PathBuf) {
        let path = unique_data_path(tag);
        let store = Arc::new(LocalStore::open(&path).await.unwrap());
        (RecordCache::new(store), path)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn shanghai_date_rolls_over_at_utc_sixteen() {
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 15, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 16, 0, 0).unwrap();
        assert_eq!(shanghai_date(before), day(2024, 1, 1));
        assert_eq!(shanghai_date(after), day(2024, 1, 2));

        let new_year = Utc.with_ymd_and_hms(2023, 12, 31, 16, 0, 0).unwrap();
        assert_eq!(shanghai_date(new_year), day(2024, 1, 1));
    }

    #[tokio::test]
    async fn save_then_read_on_same_day() {
        let (cache, path) = open_cache("cache_save").await;
        let today = day(2024, 1, 1);
        for (user, option) in [
            (Some(1), WeightOption::Gained),
            (Some(2), WeightOption::NotGained),
            (None, WeightOption::Gained),
        ] {
            cache.save_on(user, option, today).await.unwrap();
            assert!(cache.has_recorded_today_on(user, today).await);
            assert_eq!(cache.today_option_on(user, today).await, Some(option));
        }
        assert!(!cache.has_recorded_today_on(Some(3), today).await);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn clear_forgets_only_that_user() {
        let (cache, path) = open_cache("cache_clear").await;
        let today = day(2024, 1, 1);
        cache.save_on(Some(1), WeightOption::Gained, today).await.unwrap();
        cache.save_on(Some(2), WeightOption::Gained, today).await.unwrap();

        cache.clear(Some(1)).await.unwrap();
        assert!(!cache.has_recorded_today_on(Some(1), today).await);
        assert_eq!(cache.today_option_on(Some(1), today).await, None);
        assert!(cache.has_recorded_today_on(Some(2), today).await);

        // Clearing an absent mark is a no-op.
        cache.clear(Some(1)).await.unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn previous_day_mark_is_not_today() {
        let (cache, path) = open_cache("cache_rollover").await;
        cache
            .save_on(Some(1), WeightOption::NotGained, day(2024, 1, 1))
            .await
            .unwrap();
        assert!(!cache.has_recorded_today_on(Some(1), day(2024, 1, 2)).await);
        assert_eq!(cache.today_option_on(Some(1), day(2024, 1, 2)).await, None);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn reconcile_if_stale_clears_old_mark_and_is_idempotent() {
        let (cache, path) = open_cache("cache_reconcile").await;
        cache
            .save_on(Some(1), WeightOption::Gained, day(2024, 1, 1))
            .await
            .unwrap();

        let today = day(2024, 1, 2);
        assert!(cache.reconcile_if_stale_on(Some(1), today).await.unwrap());
        let after_first = cache.store.read(|data| data.clone()).await;
        assert!(!cache.reconcile_if_stale_on(Some(1), today).await.unwrap());
        let after_second = cache.store.read(|data| data.clone()).await;

        assert_eq!(after_first, after_second);
        assert!(!cache.has_recorded_today_on(Some(1), today).await);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn reconcile_if_stale_keeps_todays_mark() {
        let (cache, path) = open_cache("cache_keep").await;
        let today = day(2024, 1, 2);
        cache.save_on(Some(1), WeightOption::Gained, today).await.unwrap();
        assert!(!cache.reconcile_if_stale_on(Some(1), today).await.unwrap());
        assert_eq!(
            cache.today_option_on(Some(1), today).await,
            Some(WeightOption::Gained)
        );
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn clear_all_drops_every_user() {
        let (cache, path) = open_cache("cache_clear_all").await;
        let today = day(2024, 1, 1);
        cache.save_on(Some(1), WeightOption::Gained, today).await.unwrap();
        cache.save_on(None, WeightOption::NotGained, today).await.unwrap();

        cache.clear_all().await.unwrap();
        assert!(!cache.has_recorded_today_on(Some(1), today).await);
        assert!(!cache.has_recorded_today_on(None, today).await);
        let _ = std::fs::remove_file(path);
    }

    fn remote_record(weight_type: Option<i64>) -> TodayRecord {
        TodayRecord {
            id: Some(5),
            user_id: Some(1),
            weight_type,
            record_date: Some("2024-01-01".to_string()),
            create_time: None,
        }
    }

    #[tokio::test]
    async fn remote_answer_is_authoritative() {
        let (cache, path) = open_cache("cache_remote").await;
        let today = day(2024, 1, 1);
        cache.save_on(Some(1), WeightOption::Gained, today).await.unwrap();

        let adopted = cache
            .reconcile_with_remote_on(Some(1), Some(&remote_record(Some(2))), today)
            .await
            .unwrap();
        assert_eq!(adopted, Some(WeightOption::NotGained));
        assert_eq!(
            cache.today_option_on(Some(1), today).await,
            Some(WeightOption::NotGained)
        );

        cache.reconcile_with_remote_on(Some(1), None, today).await.unwrap();
        assert!(!cache.has_recorded_today_on(Some(1), today).await);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn remote_record_without_weight_type_keeps_local_mark() {
        let (cache, path) = open_cache("cache_remote_untyped").await;
        let today = day(2024, 1, 1);
        cache.save_on(Some(1), WeightOption::Gained, today).await.unwrap();

        let kept = cache
            .reconcile_with_remote_on(Some(1), Some(&remote_record(None)), today)
            .await
            .unwrap();

        assert_eq!(kept, Some(WeightOption::Gained));
        assert_eq!(
            cache.today_option_on(Some(1), today).await,
            Some(WeightOption::Gained)
        );
        let _ = std::fs::remove_file(path);
    }
}
