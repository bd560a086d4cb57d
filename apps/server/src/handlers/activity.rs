use axum::{extract::State, Json};
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;

use super::{internal_error, ApiError};
use crate::{
    calendar,
    models::{ActivityEntry, ActivityRequest, SuccessResponse},
    AppState,
};

/// Only the newest entries are kept.
pub const ACTIVITY_LOG_LIMIT: usize = 100;

/// Put a new entry at the front of the log and drop the overflow.
pub fn push_entry(log: &mut Vec<ActivityEntry>, entry: ActivityEntry) {
    log.insert(0, entry);
    log.truncate(ACTIVITY_LOG_LIMIT);
}

fn entry_at(now: DateTime<FixedOffset>, message: String, user: String) -> ActivityEntry {
    ActivityEntry {
        time: now.format("%H:%M:%S").to_string(),
        message,
        user,
        timestamp: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false),
    }
}

/// POST /api/activity
pub async fn add_activity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ActivityRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut doc = state.store.load().await.map_err(|e| {
        tracing::error!("add_activity: read failed: {}", e);
        internal_error("Failed to add activity log")
    })?;

    let entry = entry_at(calendar::local_now(state.utc_offset), body.message, body.user);
    push_entry(&mut doc.activity_log, entry);

    state.store.save(&doc).await.map_err(|e| {
        tracing::error!("add_activity: write failed: {}", e);
        internal_error("Failed to add activity log")
    })?;

    Ok(Json(SuccessResponse::ok()))
}
