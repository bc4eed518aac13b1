use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::weight::{UpsertWeightRequest, WeightLog, WeightQuery};
use crate::AppState;

/// One weight entry per (user, day); logging the same day again overwrites it.
pub async fn upsert_weight(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpsertWeightRequest>,
) -> AppResult<Json<WeightLog>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let log_date = body.log_date.unwrap_or_else(|| Utc::now().date_naive());

    let log = sqlx::query_as::<_, WeightLog>(
        r#"
        INSERT INTO weight_logs (id, user_id, log_date, weight_kg, note)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, log_date) DO UPDATE SET
            weight_kg = EXCLUDED.weight_kg,
            note = COALESCE(EXCLUDED.note, weight_logs.note),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(log_date)
    .bind(body.weight_kg)
    .bind(&body.note)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(log))
}

pub async fn list_weight(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<WeightQuery>,
) -> AppResult<Json<Vec<WeightLog>>> {
    let end = query.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let start = query
        .start_date
        .unwrap_or_else(|| end - chrono::Duration::days(90));

    let logs = sqlx::query_as::<_, WeightLog>(
        r#"
        SELECT * FROM weight_logs
        WHERE user_id = $1 AND log_date BETWEEN $2 AND $3
        ORDER BY log_date ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(logs))
}
