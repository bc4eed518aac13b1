use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::daily_log::{
    ActivityPatch, DailyLog, DailyLogQuery, LogActivityRequest, RemoveActivityRequest,
};
use crate::services::logging;
use crate::AppState;

/// Fetch one day's log. A day that was never written is a normal outcome and
/// serializes as `null`, not a 404.
pub async fn get_daily_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(date): Path<NaiveDate>,
) -> AppResult<Json<Option<DailyLog>>> {
    let log = state.store.fetch(auth_user.id, date).await?;
    Ok(Json(log))
}

pub async fn list_daily_logs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DailyLogQuery>,
) -> AppResult<Json<Vec<DailyLog>>> {
    let end = query.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let start = query
        .start_date
        .unwrap_or_else(|| end - chrono::Duration::days(30));

    if start > end {
        return Err(AppError::Validation(
            "start_date must not be after end_date".into(),
        ));
    }

    let logs = state.store.fetch_range(auth_user.id, start, end).await?;
    Ok(Json(logs))
}

pub async fn log_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(date): Path<NaiveDate>,
    Json(body): Json<LogActivityRequest>,
) -> AppResult<Json<DailyLog>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let log = logging::append_activity(
        state.store.as_ref(),
        auth_user.id,
        date,
        body.totals,
        body.activity,
    )
    .await?;

    Ok(Json(log))
}

pub async fn remove_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((date, activity_id)): Path<(NaiveDate, String)>,
    Json(body): Json<RemoveActivityRequest>,
) -> AppResult<Json<DailyLog>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    // `meal` folds into the food contribution before the core sees it.
    let kind = body.kind.contribution();

    let log = logging::remove_activity(
        state.store.as_ref(),
        auth_user.id,
        date,
        &activity_id,
        body.amount,
        kind,
    )
    .await?;

    Ok(Json(log))
}

pub async fn update_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((date, activity_id)): Path<(NaiveDate, String)>,
    Json(body): Json<ActivityPatch>,
) -> AppResult<Json<DailyLog>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let log = logging::update_activity(
        state.store.as_ref(),
        auth_user.id,
        date,
        &activity_id,
        body,
    )
    .await?;

    Ok(Json(log))
}
