use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub name: String,
    pub timezone: String,
    pub calorie_goal: f64,
    pub protein_goal: f64,
    pub carb_goal: f64,
    pub fat_goal: f64,
    /// Liters per day.
    pub water_goal: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The goal bundle clients use to render consumed/remaining displays. The
/// aggregation core never reads these.
#[derive(Debug, Clone, Serialize)]
pub struct DailyGoals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub water: f64,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: String,
    pub timezone: String,
    pub goals: DailyGoals,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            timezone: u.timezone,
            goals: DailyGoals {
                calories: u.calorie_goal,
                protein: u.protein_goal,
                carbs: u.carb_goal,
                fat: u.fat_goal,
                water: u.water_goal,
            },
            created_at: u.created_at,
        }
    }
}

/// PUT /api/me/goals (partial update, all fields optional)
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGoalsRequest {
    #[validate(range(min = 0.0, max = 20000.0, message = "Calorie goal must be 0-20000"))]
    pub calories: Option<f64>,
    #[validate(range(min = 0.0, max = 1000.0, message = "Protein goal must be 0-1000"))]
    pub protein: Option<f64>,
    #[validate(range(min = 0.0, max = 2000.0, message = "Carb goal must be 0-2000"))]
    pub carbs: Option<f64>,
    #[validate(range(min = 0.0, max = 1000.0, message = "Fat goal must be 0-1000"))]
    pub fat: Option<f64>,
    #[validate(range(min = 0.0, max = 20.0, message = "Water goal must be 0-20 liters"))]
    pub water: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[allow(dead_code)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}
