use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::daily_log::{ActivityEntry, DailyLog, TotalsDelta};
use crate::store::feed::ChangeFeed;
use crate::store::{DailyLogStore, LogSubscription, StoreError};

pub struct PgLogStore {
    db: PgPool,
    feed: ChangeFeed,
}

impl PgLogStore {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            feed: ChangeFeed::new(),
        }
    }
}

#[async_trait]
impl DailyLogStore for PgLogStore {
    async fn fetch(&self, user_id: Uuid, date: NaiveDate) -> Result<Option<DailyLog>, StoreError> {
        let log = sqlx::query_as::<_, DailyLog>(
            "SELECT * FROM daily_logs WHERE user_id = $1 AND log_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.db)
        .await?;

        Ok(log)
    }

    async fn fetch_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyLog>, StoreError> {
        let logs = sqlx::query_as::<_, DailyLog>(
            r#"
            SELECT * FROM daily_logs
            WHERE user_id = $1 AND log_date BETWEEN $2 AND $3
            ORDER BY log_date ASC
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;

        Ok(logs)
    }

    async fn upsert_append(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        deltas: &TotalsDelta,
        entry: &ActivityEntry,
    ) -> Result<DailyLog, StoreError> {
        let entry_json = serde_json::to_value(entry)?;

        // Increments and the list append share one statement; Postgres
        // applies all SET clauses of the upsert together.
        let log = sqlx::query_as::<_, DailyLog>(
            r#"
            INSERT INTO daily_logs (user_id, log_date, calories, protein, carbs, fat, water, activities)
            VALUES ($1, $2, $3, $4, $5, $6, $7, jsonb_build_array($8::jsonb))
            ON CONFLICT (user_id, log_date) DO UPDATE SET
                calories = daily_logs.calories + EXCLUDED.calories,
                protein = daily_logs.protein + EXCLUDED.protein,
                carbs = daily_logs.carbs + EXCLUDED.carbs,
                fat = daily_logs.fat + EXCLUDED.fat,
                water = daily_logs.water + EXCLUDED.water,
                activities = daily_logs.activities || EXCLUDED.activities,
                revision = daily_logs.revision + 1,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(deltas.calories)
        .bind(deltas.protein)
        .bind(deltas.carbs)
        .bind(deltas.fat)
        .bind(deltas.water)
        .bind(&entry_json)
        .fetch_one(&self.db)
        .await?;

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
        let activities_json = serde_json::to_value(activities)?;

        let log = sqlx::query_as::<_, DailyLog>(
            r#"
            UPDATE daily_logs SET
                activities = $4,
                calories = calories + $5,
                protein = protein + $6,
                carbs = carbs + $7,
                fat = fat + $8,
                water = water + $9,
                revision = revision + 1,
                updated_at = NOW()
            WHERE user_id = $1 AND log_date = $2 AND revision = $3
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(expected_revision)
        .bind(&activities_json)
        .bind(deltas.calories)
        .bind(deltas.protein)
        .bind(deltas.carbs)
        .bind(deltas.fat)
        .bind(deltas.water)
        .fetch_optional(&self.db)
        .await?;

        // No row matched: either the revision moved or the record is gone.
        // Both mean the caller's read is stale.
        let log = log.ok_or(StoreError::Conflict)?;

        self.feed.publish(&log);
        Ok(log)
    }

    async fn subscribe(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<LogSubscription, StoreError> {
        // Register before the snapshot read so a write landing in between is
        // not lost (it may be delivered as a duplicate, which consumers
        // already tolerate).
        let updates = self.feed.subscribe(user_id, date);
        let current = self.fetch(user_id, date).await?;

        Ok(LogSubscription { current, updates })
    }
}
