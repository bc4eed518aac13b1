use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// One aggregate record per (user, calendar day). Totals are maintained by
/// incremental deltas, not recomputed from `activities`; the two can drift if
/// a caller supplies a delta inconsistent with its entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyLog {
    pub user_id: Uuid,
    pub log_date: NaiveDate,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    /// Liters.
    pub water: f64,
    #[sqlx(json)]
    pub activities: Vec<ActivityEntry>,
    /// Bumped on every write; rewrites are conditional on the value they read.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One logged event. Ids are caller-assigned (time-derived on the client);
/// there is no collision detection.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ActivityEntry {
    #[validate(length(min = 1, max = 64, message = "Activity id must be 1-64 characters"))]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: ActivityType,

    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    /// Display time, e.g. "08:30".
    #[validate(length(max = 16))]
    pub time: String,

    /// Positive in the entry for both food and exercise; exercise entries
    /// are subtracted from the running calories total.
    #[serde(default)]
    pub calories: f64,

    /// Liters, water entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_amount: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,

    /// Exercise display metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i32>,
}

/// `meal` and `food` are synonyms for the food case; both are kept as-is so
/// stored entries round-trip under the name the client wrote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Meal,
    Food,
    Water,
    Exercise,
}

/// How an entry contributes to the running totals. This is the normalized
/// form the aggregation operations work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionKind {
    Food,
    Water,
    Exercise,
}

impl ActivityType {
    pub fn contribution(self) -> ContributionKind {
        match self {
            ActivityType::Meal | ActivityType::Food => ContributionKind::Food,
            ActivityType::Water => ContributionKind::Water,
            ActivityType::Exercise => ContributionKind::Exercise,
        }
    }
}

/// Partial set of totals deltas; absent fields apply as zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TotalsDelta {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub water: f64,
}

impl TotalsDelta {
    pub fn calories(amount: f64) -> Self {
        Self {
            calories: amount,
            ..Self::default()
        }
    }

    pub fn water(amount: f64) -> Self {
        Self {
            water: amount,
            ..Self::default()
        }
    }

    pub fn apply_to(&self, log: &mut DailyLog) {
        log.calories += self.calories;
        log.protein += self.protein;
        log.carbs += self.carbs;
        log.fat += self.fat;
        log.water += self.water;
    }
}

/// POST /api/logs/{date}/activities. Mirrors the append write shape: the
/// caller supplies both the totals deltas and the entry.
#[derive(Debug, Deserialize, Validate)]
pub struct LogActivityRequest {
    #[serde(default)]
    pub totals: TotalsDelta,
    #[validate]
    pub activity: ActivityEntry,
}

/// DELETE /api/logs/{date}/activities/{id}. The caller passes the
/// pre-computed magnitude of the entry's contribution and its type.
#[derive(Debug, Deserialize, Validate)]
pub struct RemoveActivityRequest {
    #[validate(range(min = 0.0, message = "Amount must be non-negative"))]
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: ActivityType,
}

/// PATCH /api/logs/{date}/activities/{id}. Partial edit; `id` and `type`
/// are immutable.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ActivityPatch {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 16))]
    pub time: Option<String>,
    pub calories: Option<f64>,
    pub water_amount: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub intensity: Option<String>,
    pub duration_minutes: Option<i32>,
}

impl ActivityPatch {
    /// Merge this patch over an existing entry. Provided fields overwrite;
    /// absent fields keep the old value.
    pub fn merged_into(&self, old: &ActivityEntry) -> ActivityEntry {
        ActivityEntry {
            id: old.id.clone(),
            kind: old.kind,
            name: self.name.clone().unwrap_or_else(|| old.name.clone()),
            time: self.time.clone().unwrap_or_else(|| old.time.clone()),
            calories: self.calories.unwrap_or(old.calories),
            water_amount: self.water_amount.or(old.water_amount),
            protein: self.protein.or(old.protein),
            carbs: self.carbs.or(old.carbs),
            fat: self.fat.or(old.fat),
            intensity: self.intensity.clone().or_else(|| old.intensity.clone()),
            duration_minutes: self.duration_minutes.or(old.duration_minutes),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DailyLogQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}
