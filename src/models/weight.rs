use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WeightLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub log_date: NaiveDate,
    pub weight_kg: f64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertWeightRequest {
    /// Defaults to today (UTC) when absent.
    pub log_date: Option<NaiveDate>,
    #[validate(range(min = 1.0, max = 500.0, message = "Weight must be 1-500 kg"))]
    pub weight_kg: f64,
    #[validate(length(max = 2000, message = "Note must be under 2000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeightQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}
