use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::daily_log::{ActivityEntry, DailyLog, TotalsDelta};
use crate::store::feed::ChangeFeed;
use crate::store::{DailyLogStore, LogSubscription, StoreError};

/// In-process store with the same semantics as the Postgres backend,
/// including revision conflicts. Backs the test suite and database-less
/// local runs.
#[derive(Default)]
pub struct MemoryLogStore {
    records: RwLock<HashMap<(Uuid, NaiveDate), DailyLog>>,
    feed: ChangeFeed,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DailyLogStore for MemoryLogStore {
    async fn fetch(&self, user_id: Uuid, date: NaiveDate) -> Result<Option<DailyLog>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&(user_id, date)).cloned())
    }

    async fn fetch_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyLog>, StoreError> {
        let records = self.records.read().await;
        let mut logs: Vec<DailyLog> = records
            .values()
            .filter(|l| l.user_id == user_id && l.log_date >= start && l.log_date <= end)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.log_date);
        Ok(logs)
    }

    async fn upsert_append(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        deltas: &TotalsDelta,
        entry: &ActivityEntry,
    ) -> Result<DailyLog, StoreError> {
        let mut records = self.records.write().await;
        let now = Utc::now();

        let log = records
            .entry((user_id, date))
            .and_modify(|log| {
                deltas.apply_to(log);
                log.activities.push(entry.clone());
                log.revision += 1;
                log.updated_at = now;
            })
            .or_insert_with(|| DailyLog {
                user_id,
                log_date: date,
                calories: deltas.calories,
                protein: deltas.protein,
                carbs: deltas.carbs,
                fat: deltas.fat,
                water: deltas.water,
                activities: vec![entry.clone()],
                revision: 1,
                created_at: now,
                updated_at: now,
            })
            .clone();

        self.feed.publish(&log);
        Ok(log)
    }

    async fn rewrite_activities(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        expected_revision: i64,
        activities: &[ActivityEntry],
        deltas: &TotalsDelta,
    ) -> Result<DailyLog, StoreError> {
        let mut records = self.records.write().await;

        let log = records
            .get_mut(&(user_id, date))
            .filter(|log| log.revision == expected_revision)
            .ok_or(StoreError::Conflict)?;

        log.activities = activities.to_vec();
        deltas.apply_to(log);
        log.revision += 1;
        log.updated_at = Utc::now();

        let log = log.clone();
        drop(records);

        self.feed.publish(&log);
        Ok(log)
    }

    async fn subscribe(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<LogSubscription, StoreError> {
        let updates = self.feed.subscribe(user_id, date);
        let current = self.fetch(user_id, date).await?;

        Ok(LogSubscription { current, updates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::daily_log::ActivityType;

    fn water_entry(id: &str, liters: f64) -> ActivityEntry {
        ActivityEntry {
            id: id.into(),
            kind: ActivityType::Water,
            name: "Glass of water".into(),
            time: "09:00".into(),
            calories: 0.0,
            water_amount: Some(liters),
            protein: None,
            carbs: None,
            fat: None,
            intensity: None,
            duration_minutes: None,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn fetch_of_unwritten_day_is_repeatably_absent() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        // Absence must be a normal result, not an error, on every call.
        assert!(store.fetch(user, day()).await.unwrap().is_none());
        assert!(store.fetch(user, day()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_append_seeds_then_accumulates() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        let first = store
            .upsert_append(user, day(), &TotalsDelta::water(0.25), &water_entry("a", 0.25))
            .await
            .unwrap();
        assert_eq!(first.water, 0.25);
        assert_eq!(first.revision, 1);

        let second = store
            .upsert_append(user, day(), &TotalsDelta::water(0.25), &water_entry("b", 0.25))
            .await
            .unwrap();
        assert_eq!(second.water, 0.5);
        assert_eq!(second.revision, 2);
        let ids: Vec<&str> = second.activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn rewrite_with_stale_revision_conflicts() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        let log = store
            .upsert_append(user, day(), &TotalsDelta::water(0.25), &water_entry("a", 0.25))
            .await
            .unwrap();

        // A second writer bumps the revision out from under us.
        store
            .upsert_append(user, day(), &TotalsDelta::water(0.25), &water_entry("b", 0.25))
            .await
            .unwrap();

        let err = store
            .rewrite_activities(user, day(), log.revision, &[], &TotalsDelta::water(-0.25))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn rewrite_against_missing_record_conflicts() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        let err = store
            .rewrite_activities(user, day(), 1, &[], &TotalsDelta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn subscribe_snapshots_then_streams_every_write() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        store
            .upsert_append(user, day(), &TotalsDelta::water(0.25), &water_entry("a", 0.25))
            .await
            .unwrap();

        let mut sub = store.subscribe(user, day()).await.unwrap();
        assert_eq!(sub.current.as_ref().unwrap().water, 0.25);

        store
            .upsert_append(user, day(), &TotalsDelta::water(0.25), &water_entry("b", 0.25))
            .await
            .unwrap();
        store
            .upsert_append(user, day(), &TotalsDelta::water(0.5), &water_entry("c", 0.5))
            .await
            .unwrap();

        assert_eq!(sub.updates.recv().await.unwrap().water, 0.5);
        assert_eq!(sub.updates.recv().await.unwrap().water, 1.0);
    }

    #[tokio::test]
    async fn subscribe_to_absent_day_reports_no_current_state() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        let sub = store.subscribe(user, day()).await.unwrap();
        assert!(sub.current.is_none());
    }
}
