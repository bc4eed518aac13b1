use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::daily_log::DailyLog;
use crate::models::user::User;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct InsightResponse {
    pub summary: String,
    pub wins: Vec<String>,
    pub improvements: Vec<String>,
    pub hydration_note: Option<String>,
    pub trend_analysis: String,
    pub tip_of_the_week: String,
    pub source: String, // "claude" or "fallback"
}

pub async fn get_insights(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<InsightResponse>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    let today = chrono::Utc::now().date_naive();
    let two_weeks_ago = today - chrono::Duration::days(14);

    let logs = state
        .store
        .fetch_range(auth_user.id, two_weeks_ago, today)
        .await?;

    let day_summaries: Vec<String> = logs
        .iter()
        .map(|l| {
            format!(
                "- {}: {:.0} kcal ({:.0}g protein, {:.0}g carbs, {:.0}g fat), {:.2}L water, {} activities",
                l.log_date, l.calories, l.protein, l.carbs, l.fat, l.water, l.activities.len()
            )
        })
        .collect();

    let prompt = format!(
        r#"You are a nutrition coaching AI. Analyze this user's food, water, and exercise logs from the last 14 days and provide actionable insights.

Daily goals: {:.0} kcal, {:.0}g protein, {:.0}g carbs, {:.0}g fat, {:.1}L water.

Days logged:
{}

Provide a JSON response with this exact schema:
{{
  "summary": "2-3 sentence progress summary",
  "wins": ["specific win 1", "specific win 2"],
  "improvements": ["actionable suggestion 1", "actionable suggestion 2", "actionable suggestion 3"],
  "hydration_note": "hydration insight or null",
  "trend_analysis": "pattern analysis across the period",
  "tip_of_the_week": "one specific tip"
}}"#,
        user.calorie_goal,
        user.protein_goal,
        user.carb_goal,
        user.fat_goal,
        user.water_goal,
        day_summaries.join("\n"),
    );

    // Try Claude API, fall back to deterministic if unavailable
    let insight = match call_claude(&state, &prompt).await {
        Ok(insight) => insight,
        Err(e) => {
            tracing::warn!(error = %e, "Claude API unavailable, using deterministic fallback");
            generate_fallback_insight(&user, &logs)
        }
    };

    Ok(Json(insight))
}

async fn call_claude(state: &AppState, prompt: &str) -> Result<InsightResponse, anyhow::Error> {
    // 30-second timeout to prevent indefinite hangs
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let response = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", &state.config.claude_api_key)
        .header("anthropic-version", "2023-06-01")
        .header("content-type", "application/json")
        .json(&serde_json::json!({
            "model": state.config.claude_model,
            "max_tokens": 1024,
            "messages": [{
                "role": "user",
                "content": prompt
            }]
        }))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Claude API error {}: {}", status, body);
    }

    let claude_response: serde_json::Value = response.json().await?;
    let text = claude_response["content"][0]["text"]
        .as_str()
        .unwrap_or("{}");

    let mut insight: InsightResponse = serde_json::from_str(text)?;
    insight.source = "claude".to_string();
    Ok(insight)
}

fn generate_fallback_insight(user: &User, logs: &[DailyLog]) -> InsightResponse {
    if logs.is_empty() {
        return InsightResponse {
            summary: "You haven't logged anything in the last two weeks. Start by logging a meal or a glass of water!".into(),
            wins: vec![],
            improvements: vec!["Log your first meal to get started".into()],
            hydration_note: None,
            trend_analysis: "No data available yet.".into(),
            tip_of_the_week: "Consistency beats precision — a rough log every day is worth more than a perfect log once a week.".into(),
            source: "fallback".into(),
        };
    }

    let days = logs.len() as f64;
    let avg_calories = logs.iter().map(|l| l.calories).sum::<f64>() / days;
    let avg_water = logs.iter().map(|l| l.water).sum::<f64>() / days;
    let avg_protein = logs.iter().map(|l| l.protein).sum::<f64>() / days;

    let calorie_ratio = if user.calorie_goal > 0.0 {
        avg_calories / user.calorie_goal
    } else {
        0.0
    };

    let summary = format!(
        "Over the last two weeks you logged {} days, averaging {:.0} kcal against a {:.0} kcal goal ({:.0}%) and {:.2}L of water per day.",
        logs.len(),
        avg_calories,
        user.calorie_goal,
        calorie_ratio * 100.0,
        avg_water,
    );

    let mut wins = Vec::new();
    if logs.len() >= 10 {
        wins.push(format!("{} days logged out of 14 — strong tracking habit!", logs.len()));
    }
    if avg_protein >= user.protein_goal * 0.9 {
        wins.push(format!("Protein averaged {:.0}g, right around your goal", avg_protein));
    }
    if avg_water >= user.water_goal {
        wins.push(format!("Hydration on target at {:.2}L per day", avg_water));
    }

    let mut improvements = Vec::new();
    if calorie_ratio > 1.1 {
        improvements.push("Average intake is running more than 10% over your calorie goal; look at portion sizes on your biggest meals".into());
    } else if calorie_ratio < 0.7 {
        improvements.push("Average intake is well under your goal; make sure you're logging everything you eat".into());
    }
    if avg_water < user.water_goal * 0.75 {
        improvements.push(format!(
            "Water averaged {:.2}L against a {:.1}L goal; try logging a glass with every meal",
            avg_water, user.water_goal
        ));
    }
    if logs.len() < 7 {
        improvements.push("Log more days to make these trends meaningful".into());
    }
    if improvements.is_empty() {
        improvements.push("Keep doing what you're doing — the numbers look balanced".into());
    }

    let hydration_note = if avg_water < user.water_goal {
        Some(format!(
            "You're averaging {:.2}L of {:.1}L daily — a glass mid-morning and mid-afternoon would close the gap.",
            avg_water, user.water_goal
        ))
    } else {
        None
    };

    let exercise_days = logs
        .iter()
        .filter(|l| {
            l.activities.iter().any(|a| {
                matches!(
                    a.kind.contribution(),
                    crate::models::daily_log::ContributionKind::Exercise
                )
            })
        })
        .count();

    let trend_analysis = format!(
        "You exercised on {} of {} logged days. Net calories stay closest to goal on days with at least one exercise entry.",
        exercise_days,
        logs.len(),
    );

    InsightResponse {
        summary,
        wins,
        improvements,
        hydration_note,
        trend_analysis,
        tip_of_the_week: "Log meals right after eating — back-filled entries are the ones that get forgotten.".into(),
        source: "fallback".into(),
    }
}
