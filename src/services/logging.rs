//! Aggregation operations for the daily log.
//!
//! This is the only place where running totals and the activity list are
//! mutated together. Append rides a single atomic upsert; remove and update
//! are read-rewrite cycles guarded by the record's revision, retried a
//! bounded number of times when a concurrent writer gets there first.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::daily_log::{
    ActivityEntry, ActivityPatch, ContributionKind, DailyLog, TotalsDelta,
};
use crate::store::{DailyLogStore, StoreError};

/// Attempts per remove/update before surfacing the conflict to the caller.
const REWRITE_RETRIES: u32 = 3;

/// Append one activity, adjusting the running totals by the caller-supplied
/// deltas. Creates the day's record when absent, seeded with the deltas as
/// its initial totals and the activity as the sole entry.
pub async fn append_activity(
    store: &dyn DailyLogStore,
    user_id: Uuid,
    date: NaiveDate,
    deltas: TotalsDelta,
    activity: ActivityEntry,
) -> AppResult<DailyLog> {
    let log = store.upsert_append(user_id, date, &deltas, &activity).await?;

    tracing::debug!(
        user_id = %user_id,
        date = %date,
        activity_id = %activity.id,
        "Activity appended"
    );
    Ok(log)
}

/// Remove an activity and reverse its contribution. `amount` is the
/// pre-computed magnitude of the entry's contribution and `kind` its
/// normalized type (`meal` has already been folded into food).
///
/// The totals reversal is applied even when no entry matches `activity_id`;
/// the operation trusts the caller's amount and does not cross-check the
/// list. Food removal reverses calories only, never the macros.
pub async fn remove_activity(
    store: &dyn DailyLogStore,
    user_id: Uuid,
    date: NaiveDate,
    activity_id: &str,
    amount: f64,
    kind: ContributionKind,
) -> AppResult<DailyLog> {
    let deltas = match kind {
        // Exercise entries had subtracted from calories; give it back.
        ContributionKind::Exercise => TotalsDelta::calories(amount),
        ContributionKind::Food => TotalsDelta::calories(-amount),
        ContributionKind::Water => TotalsDelta::water(-amount),
    };

    for attempt in 0..REWRITE_RETRIES {
        let log = store
            .fetch(user_id, date)
            .await?
            .ok_or_else(|| AppError::NotFound("No log exists for this day".into()))?;

        let next: Vec<ActivityEntry> = log
            .activities
            .iter()
            .filter(|a| a.id != activity_id)
            .cloned()
            .collect();

        match store
            .rewrite_activities(user_id, date, log.revision, &next, &deltas)
            .await
        {
            Ok(updated) => {
                tracing::debug!(
                    user_id = %user_id,
                    date = %date,
                    activity_id = %activity_id,
                    removed = log.activities.len() != next.len(),
                    "Activity removed"
                );
                return Ok(updated);
            }
            Err(StoreError::Conflict) if attempt + 1 < REWRITE_RETRIES => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(StoreError::Conflict.into())
}

/// Edit an activity in place and apply the delta between its old and new
/// contribution. Fails cleanly, without writing, when the entry is missing.
pub async fn update_activity(
    store: &dyn DailyLogStore,
    user_id: Uuid,
    date: NaiveDate,
    activity_id: &str,
    patch: ActivityPatch,
) -> AppResult<DailyLog> {
    for attempt in 0..REWRITE_RETRIES {
        let log = store
            .fetch(user_id, date)
            .await?
            .ok_or_else(|| AppError::NotFound("No log exists for this day".into()))?;

        let position = log
            .activities
            .iter()
            .position(|a| a.id == activity_id)
            .ok_or_else(|| AppError::NotFound("Activity not found in this day's log".into()))?;

        let old = &log.activities[position];
        let new = patch.merged_into(old);
        let deltas = contribution_delta(old, &new);

        let mut next = log.activities.clone();
        next[position] = new;

        match store
            .rewrite_activities(user_id, date, log.revision, &next, &deltas)
            .await
        {
            Ok(updated) => {
                tracing::debug!(
                    user_id = %user_id,
                    date = %date,
                    activity_id = %activity_id,
                    "Activity updated"
                );
                return Ok(updated);
            }
            Err(StoreError::Conflict) if attempt + 1 < REWRITE_RETRIES => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(StoreError::Conflict.into())
}

/// Old→new totals delta for an in-place edit, by the entry's contribution
/// kind: water moves the water total, exercise moves calories with the sign
/// flipped, food moves calories and each provided macro independently.
fn contribution_delta(old: &ActivityEntry, new: &ActivityEntry) -> TotalsDelta {
    match old.kind.contribution() {
        ContributionKind::Water => TotalsDelta::water(
            new.water_amount.unwrap_or(0.0) - old.water_amount.unwrap_or(0.0),
        ),
        ContributionKind::Exercise => TotalsDelta::calories(-(new.calories - old.calories)),
        ContributionKind::Food => TotalsDelta {
            calories: new.calories - old.calories,
            protein: new.protein.unwrap_or(0.0) - old.protein.unwrap_or(0.0),
            carbs: new.carbs.unwrap_or(0.0) - old.carbs.unwrap_or(0.0),
            fat: new.fat.unwrap_or(0.0) - old.fat.unwrap_or(0.0),
            water: 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::daily_log::ActivityType;
    use crate::store::MemoryLogStore;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn food_entry(id: &str, calories: f64, protein: f64, carbs: f64, fat: f64) -> ActivityEntry {
        ActivityEntry {
            id: id.into(),
            kind: ActivityType::Meal,
            name: "Chicken bowl".into(),
            time: "12:30".into(),
            calories,
            water_amount: None,
            protein: Some(protein),
            carbs: Some(carbs),
            fat: Some(fat),
            intensity: None,
            duration_minutes: None,
        }
    }

    fn exercise_entry(id: &str, calories: f64) -> ActivityEntry {
        ActivityEntry {
            id: id.into(),
            kind: ActivityType::Exercise,
            name: "Morning run".into(),
            time: "07:00".into(),
            calories,
            water_amount: None,
            protein: None,
            carbs: None,
            fat: None,
            intensity: Some("moderate".into()),
            duration_minutes: Some(30),
        }
    }

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

    fn food_delta(calories: f64, protein: f64, carbs: f64, fat: f64) -> TotalsDelta {
        TotalsDelta {
            calories,
            protein,
            carbs,
            fat,
            water: 0.0,
        }
    }

    #[tokio::test]
    async fn append_creates_record_when_absent() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        let log = append_activity(
            &store,
            user,
            day(),
            food_delta(500.0, 30.0, 50.0, 10.0),
            food_entry("a", 500.0, 30.0, 50.0, 10.0),
        )
        .await
        .unwrap();

        assert_eq!(log.calories, 500.0);
        assert_eq!(log.protein, 30.0);
        assert_eq!(log.carbs, 50.0);
        assert_eq!(log.fat, 10.0);
        assert_eq!(log.water, 0.0);
        assert_eq!(log.activities.len(), 1);
        assert_eq!(log.activities[0].id, "a");
    }

    #[tokio::test]
    async fn append_accumulates_field_wise_in_order() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            food_delta(400.0, 25.0, 40.0, 12.0),
            food_entry("a", 400.0, 25.0, 40.0, 12.0),
        )
        .await
        .unwrap();

        let log = append_activity(
            &store,
            user,
            day(),
            food_delta(300.0, 15.0, 30.0, 8.0),
            food_entry("b", 300.0, 15.0, 30.0, 8.0),
        )
        .await
        .unwrap();

        assert_eq!(log.calories, 700.0);
        assert_eq!(log.protein, 40.0);
        assert_eq!(log.carbs, 70.0);
        assert_eq!(log.fat, 20.0);
        let ids: Vec<&str> = log.activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn remove_reverses_exercise_by_adding_calories_back() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            food_delta(500.0, 30.0, 50.0, 10.0),
            food_entry("a", 500.0, 30.0, 50.0, 10.0),
        )
        .await
        .unwrap();

        // Exercise is appended with a negative calories delta.
        append_activity(
            &store,
            user,
            day(),
            TotalsDelta::calories(-200.0),
            exercise_entry("b", 200.0),
        )
        .await
        .unwrap();

        let log = remove_activity(&store, user, day(), "b", 200.0, ContributionKind::Exercise)
            .await
            .unwrap();

        assert_eq!(log.calories, 500.0);
        assert_eq!(log.activities.len(), 1);
        assert_eq!(log.activities[0].id, "a");
    }

    #[tokio::test]
    async fn remove_food_reverses_calories_only() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            food_delta(500.0, 30.0, 50.0, 10.0),
            food_entry("a", 500.0, 30.0, 50.0, 10.0),
        )
        .await
        .unwrap();

        let log = remove_activity(&store, user, day(), "a", 500.0, ContributionKind::Food)
            .await
            .unwrap();

        // The remove contract reverses the calories amount; macros stay.
        assert_eq!(log.calories, 0.0);
        assert_eq!(log.protein, 30.0);
        assert_eq!(log.carbs, 50.0);
        assert_eq!(log.fat, 10.0);
        assert!(log.activities.is_empty());
    }

    #[tokio::test]
    async fn remove_water_reverses_water_total() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            TotalsDelta::water(0.25),
            water_entry("w1", 0.25),
        )
        .await
        .unwrap();

        let log = remove_activity(&store, user, day(), "w1", 0.25, ContributionKind::Water)
            .await
            .unwrap();

        assert_eq!(log.water, 0.0);
        assert!(log.activities.is_empty());
    }

    #[tokio::test]
    async fn update_water_glass_resize_applies_the_difference() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            TotalsDelta::water(0.125),
            water_entry("w1", 0.125),
        )
        .await
        .unwrap();

        let patch = ActivityPatch {
            water_amount: Some(0.25),
            ..ActivityPatch::default()
        };
        let log = update_activity(&store, user, day(), "w1", patch).await.unwrap();

        // 0.125 -> 0.25 must move the total by +0.125, not +0.25.
        assert_eq!(log.water, 0.25);
        assert_eq!(log.activities[0].water_amount, Some(0.25));
    }

    #[tokio::test]
    async fn update_exercise_applies_negated_calorie_delta() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            food_delta(500.0, 30.0, 50.0, 10.0),
            food_entry("a", 500.0, 30.0, 50.0, 10.0),
        )
        .await
        .unwrap();
        append_activity(
            &store,
            user,
            day(),
            TotalsDelta::calories(-200.0),
            exercise_entry("b", 200.0),
        )
        .await
        .unwrap();

        let patch = ActivityPatch {
            calories: Some(300.0),
            ..ActivityPatch::default()
        };
        let log = update_activity(&store, user, day(), "b", patch).await.unwrap();

        // Burning 100 more calories lowers net consumption by 100.
        assert_eq!(log.calories, 200.0);
    }

    #[tokio::test]
    async fn update_food_applies_independent_macro_deltas() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            food_delta(500.0, 30.0, 50.0, 10.0),
            food_entry("a", 500.0, 30.0, 50.0, 10.0),
        )
        .await
        .unwrap();

        let patch = ActivityPatch {
            calories: Some(600.0),
            protein: Some(40.0),
            ..ActivityPatch::default()
        };
        let log = update_activity(&store, user, day(), "a", patch).await.unwrap();

        assert_eq!(log.calories, 600.0);
        assert_eq!(log.protein, 40.0);
        // Untouched macros keep their totals.
        assert_eq!(log.carbs, 50.0);
        assert_eq!(log.fat, 10.0);
    }

    #[tokio::test]
    async fn update_of_missing_entry_fails_without_writing() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            TotalsDelta::water(0.25),
            water_entry("w1", 0.25),
        )
        .await
        .unwrap();

        let patch = ActivityPatch {
            water_amount: Some(0.5),
            ..ActivityPatch::default()
        };
        let err = update_activity(&store, user, day(), "nope", patch)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let log = store.fetch(user, day()).await.unwrap().unwrap();
        assert_eq!(log.water, 0.25);
        assert_eq!(log.revision, 1);
    }

    #[tokio::test]
    async fn remove_on_nonexistent_record_is_a_clean_failure() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        let err = remove_activity(&store, user, day(), "a", 100.0, ContributionKind::Food)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.fetch(user, day()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_with_unmatched_id_still_adjusts_totals() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            food_delta(500.0, 30.0, 50.0, 10.0),
            food_entry("a", 500.0, 30.0, 50.0, 10.0),
        )
        .await
        .unwrap();

        // Inherited contract: the list filter is a no-op but the reversal is
        // applied anyway; the operation trusts the caller's amount.
        let log = remove_activity(&store, user, day(), "ghost", 100.0, ContributionKind::Food)
            .await
            .unwrap();

        assert_eq!(log.calories, 400.0);
        assert_eq!(log.activities.len(), 1);
    }

    #[tokio::test]
    async fn food_then_exercise_then_remove_scenario() {
        let store = MemoryLogStore::new();
        let user = Uuid::new_v4();

        append_activity(
            &store,
            user,
            day(),
            food_delta(500.0, 30.0, 50.0, 10.0),
            food_entry("a", 500.0, 30.0, 50.0, 10.0),
        )
        .await
        .unwrap();

        let log = append_activity(
            &store,
            user,
            day(),
            TotalsDelta::calories(-200.0),
            exercise_entry("b", 200.0),
        )
        .await
        .unwrap();

        assert_eq!(log.calories, 300.0);
        assert_eq!(log.protein, 30.0);
        assert_eq!(log.carbs, 50.0);
        assert_eq!(log.fat, 10.0);
        let ids: Vec<&str> = log.activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let log = remove_activity(&store, user, day(), "b", 200.0, ContributionKind::Exercise)
            .await
            .unwrap();
        assert_eq!(log.calories, 500.0);
    }

    #[tokio::test]
    async fn remove_retries_past_a_concurrent_append() {
        use std::sync::atomic::{AtomicBool, Ordering};

        /// Wraps the memory store and sneaks one concurrent append in after
        /// the service's first read, forcing exactly one revision conflict.
        struct RacingStore {
            inner: MemoryLogStore,
            raced: AtomicBool,
            user: Uuid,
        }

        #[async_trait::async_trait]
        impl DailyLogStore for RacingStore {
            async fn fetch(
                &self,
                user_id: Uuid,
                date: NaiveDate,
            ) -> Result<Option<DailyLog>, StoreError> {
                let log = self.inner.fetch(user_id, date).await?;
                if log.is_some() && !self.raced.swap(true, Ordering::SeqCst) {
                    self.inner
                        .upsert_append(
                            self.user,
                            date,
                            &TotalsDelta::water(0.25),
                            &water_entry("late", 0.25),
                        )
                        .await?;
                }
                Ok(log)
            }

            async fn fetch_range(
                &self,
                user_id: Uuid,
                start: NaiveDate,
                end: NaiveDate,
            ) -> Result<Vec<DailyLog>, StoreError> {
                self.inner.fetch_range(user_id, start, end).await
            }

            async fn upsert_append(
                &self,
                user_id: Uuid,
                date: NaiveDate,
                deltas: &TotalsDelta,
                entry: &ActivityEntry,
            ) -> Result<DailyLog, StoreError> {
                self.inner.upsert_append(user_id, date, deltas, entry).await
            }

            async fn rewrite_activities(
                &self,
                user_id: Uuid,
                date: NaiveDate,
                expected_revision: i64,
                activities: &[ActivityEntry],
                deltas: &TotalsDelta,
            ) -> Result<DailyLog, StoreError> {
                self.inner
                    .rewrite_activities(user_id, date, expected_revision, activities, deltas)
                    .await
            }

            async fn subscribe(
                &self,
                user_id: Uuid,
                date: NaiveDate,
            ) -> Result<LogSubscription, StoreError> {
                self.inner.subscribe(user_id, date).await
            }
        }

        let user = Uuid::new_v4();
        let store = RacingStore {
            inner: MemoryLogStore::new(),
            raced: AtomicBool::new(false),
            user,
        };

        store
            .inner
            .upsert_append(user, day(), &TotalsDelta::water(0.25), &water_entry("w1", 0.25))
            .await
            .unwrap();

        // First rewrite hits the stale revision; the retry sees the raced
        // append and both edits survive.
        let log = remove_activity(&store, user, day(), "w1", 0.25, ContributionKind::Water)
            .await
            .unwrap();

        assert_eq!(log.water, 0.25);
        let ids: Vec<&str> = log.activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["late"]);
    }
}
