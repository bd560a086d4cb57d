use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use super::{bad_request, internal_error, ApiError};
use crate::{
    calendar, changes,
    models::{SaveScheduleRequest, ScheduleDocument, SuccessResponse},
    AppState,
};

/// GET /api/schedule — the whole document; pins the date window on first read.
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScheduleDocument>, ApiError> {
    let mut doc = state.store.load().await.map_err(|e| {
        tracing::error!("get_schedule: read failed: {}", e);
        internal_error("Failed to read schedule data")
    })?;

    // Without pinned dates the UI would shift its window at midnight.
    if doc.active_dates.is_none() {
        doc.active_dates = Some(calendar::next_three_dates(calendar::local_now(
            state.utc_offset,
        )));
        state.store.save(&doc).await.map_err(|e| {
            tracing::error!("get_schedule: pinning active dates failed: {}", e);
            internal_error("Failed to read schedule data")
        })?;
    }

    Ok(Json(doc))
}

/// POST /api/schedule — replace the schedule and announce per-slot changes.
pub async fn save_schedule(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SaveScheduleRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| {
        tracing::warn!("save_schedule: rejected body: {}", e);
        bad_request("Invalid schedule data")
    })?;

    let user = body
        .user
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "unknown".into());

    let current = state.store.load().await.map_err(|e| {
        tracing::error!("save_schedule: read failed: {}", e);
        internal_error("Failed to save schedule data")
    })?;

    let detected = changes::detect_changes(&current.schedule_data, &body.schedule_data, &user);

    let doc = ScheduleDocument {
        schedule_data: body.schedule_data,
        activity_log: body.activity_log.unwrap_or(current.activity_log),
        active_dates: body.active_dates.or(current.active_dates),
    };

    state.store.save(&doc).await.map_err(|e| {
        tracing::error!("save_schedule: write failed: {}", e);
        internal_error("Failed to save schedule data")
    })?;

    if !detected.is_empty() {
        tracing::info!("Detected {} schedule changes by {}", detected.len(), user);
        changes::notify_changes(state.sender.as_ref(), &state.chat_routes, &detected).await;
    }

    Ok(Json(SuccessResponse::ok()))
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{call, get, post_json, state};
    use crate::models::ScheduleDocument;
    use crate::store::testing::MemoryStore;
    use crate::telegram::testing::RecordingSender;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    fn stored(value: serde_json::Value) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with(serde_json::from_value(value).unwrap()))
    }

    #[tokio::test]
    async fn test_get_pins_active_dates_once() {
        let store = Arc::new(MemoryStore::default());
        let sender = Arc::new(RecordingSender::default());
        let app = state(store.clone(), sender);

        let (status, body) = call(app.clone(), get("/api/schedule")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scheduleData"], json!({}));
        assert_eq!(body["activityLog"], json!([]));
        assert_eq!(body["activeDates"].as_array().unwrap().len(), 3);

        let saved = store.current().unwrap();
        assert_eq!(saved.active_dates.as_ref().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_get_keeps_existing_active_dates() {
        let store = stored(json!({
            "scheduleData": {},
            "activeDates": [{ "key": "2025-03-01", "display": "1.3" }]
        }));
        let app = state(store, Arc::new(RecordingSender::default()));

        let (_, body) = call(app, get("/api/schedule")).await;
        assert_eq!(body["activeDates"], json!([{ "key": "2025-03-01", "display": "1.3" }]));
    }

    #[tokio::test]
    async fn test_get_read_failure_is_500() {
        let app = state(
            Arc::new(MemoryStore::broken()),
            Arc::new(RecordingSender::default()),
        );
        let (status, body) = call(app, get("/api/schedule")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to read schedule data");
    }

    #[tokio::test]
    async fn test_save_writes_and_notifies() {
        let store = stored(json!({
            "scheduleData": {
                "2025-03-01": { "tables": ["111"], "slots": { "111": { "18:00": "Ivan" } } }
            },
            "activityLog": [{ "time": "10:00:00", "message": "m", "user": "u", "timestamp": "t" }],
            "activeDates": [{ "key": "2025-03-01", "display": "1.3" }]
        }));
        let sender = Arc::new(RecordingSender::default());
        let app = state(store.clone(), sender.clone());

        let new_schedule = json!({
            "2025-03-01": {
                "tables": ["111", "222"],
                "slots": { "111": { "18:00": "Ivan" }, "222": { "12:00": "Olga ⚽️" } }
            }
        });
        let (status, body) = call(
            app,
            post_json("/api/schedule", json!({ "scheduleData": new_schedule, "user": "anna" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let saved = store.current().unwrap();
        assert_eq!(serde_json::to_value(&saved.schedule_data).unwrap(), new_schedule);
        // Omitted fields keep what was stored.
        assert_eq!(saved.activity_log.len(), 1);
        assert_eq!(saved.active_dates.unwrap()[0].key, "2025-03-01");

        let sent = sender.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, -100222);
        assert_eq!(sent[1].0, -100999);
        assert_eq!(sent[0].1, "📝 <b>бронь/预订 222</b>\n📅 1.3 ⏰ Olga ⚽️");
    }

    #[tokio::test]
    async fn test_save_then_get_round_trip() {
        let store = Arc::new(MemoryStore::default());
        let app = state(store, Arc::new(RecordingSender::default()));

        let doc = json!({
            "scheduleData": {
                "sharedNotes": "call before 10",
                "sharedAddresses": { "111": "Wukang Rd 3" },
                "2025-03-01": {
                    "tables": ["111"],
                    "slots": { "111": { "address": "Wukang Rd 3", "19:00": "Petr 3p" } }
                }
            },
            "activityLog": [],
            "activeDates": [{ "key": "2025-03-01", "display": "1.3" }],
            "user": "anna"
        });
        let (status, _) = call(app.clone(), post_json("/api/schedule", doc.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(app, get("/api/schedule")).await;
        assert_eq!(body["scheduleData"], doc["scheduleData"]);
        assert_eq!(body["activeDates"], doc["activeDates"]);
    }

    #[tokio::test]
    async fn test_save_accepts_null_and_numeric_slots() {
        let store = stored(json!({
            "scheduleData": {
                "2025-03-01": { "tables": ["111"], "slots": { "111": { "18:00": "Ivan" } } }
            }
        }));
        let sender = Arc::new(RecordingSender::default());
        let app = state(store.clone(), sender.clone());

        let new_schedule = json!({
            "2025-03-01": {
                "tables": ["111"],
                "slots": { "111": { "18:00": null, "19:00": 2 } }
            }
        });
        let (status, body) = call(
            app.clone(),
            post_json("/api/schedule", json!({ "scheduleData": new_schedule, "user": "anna" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let sent = sender.messages();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1.starts_with("🗑️"));
        assert!(sent[1].1.ends_with("⏰ 2"));

        let (status, body) = call(app, get("/api/schedule")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scheduleData"], new_schedule);
    }

    #[tokio::test]
    async fn test_save_malformed_body_is_400_with_error() {
        let app = state(
            Arc::new(MemoryStore::default()),
            Arc::new(RecordingSender::default()),
        );
        let (status, body) = call(
            app,
            post_json("/api/schedule", json!({ "scheduleData": "oops" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid schedule data");
    }

    #[tokio::test]
    async fn test_save_failure_is_500_without_notifications() {
        let sender = Arc::new(RecordingSender::default());
        let app = state(Arc::new(MemoryStore::broken()), sender.clone());

        let (status, body) = call(
            app,
            post_json(
                "/api/schedule",
                json!({ "scheduleData": { "2025-03-01": { "tables": ["111"], "slots": { "111": { "18:00": "x" } } } } }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to save schedule data");
        assert!(sender.messages().is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_still_succeeds() {
        let store = Arc::new(MemoryStore::with(ScheduleDocument::default()));
        let sender = Arc::new(RecordingSender::failing_for(-100111));
        let app = state(store.clone(), sender);

        let (status, _) = call(
            app,
            post_json(
                "/api/schedule",
                json!({ "scheduleData": { "2025-03-01": { "tables": ["111"], "slots": { "111": { "18:00": "x" } } } } }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(store.current().unwrap().schedule_data.days.contains_key("2025-03-01"));
    }
}
