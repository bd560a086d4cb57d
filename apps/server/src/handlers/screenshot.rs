//! Browser-driven schedule screenshots.
//!
//! A chat asks for a screenshot, the open schedule page notices the pending
//! request on its next poll, renders itself and uploads the PNG, and the server
//! posts it to the chat. Only one request is pending at a time.

use axum::{extract::State, Json};
use base64::Engine;
use std::sync::Arc;

use super::{bad_request, internal_error, ApiError};
use crate::{
    calendar,
    models::{PendingScreenshotResponse, ScreenshotRequestBody, ScreenshotUpload, SuccessResponse},
    AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotRequest {
    pub chat_id: i64,
    pub pin: bool,
}

fn pending(state: &AppState) -> Option<ScreenshotRequest> {
    state
        .pending_screenshot
        .lock()
        .map(|slot| *slot)
        .unwrap_or(None)
}

fn set_pending(state: &AppState, request: Option<ScreenshotRequest>) {
    if let Ok(mut slot) = state.pending_screenshot.lock() {
        *slot = request;
    }
}

/// Clear the slot only if it still holds `served`; a request that arrived
/// while the photo was being sent stays pending.
fn clear_pending(state: &AppState, served: ScreenshotRequest) {
    if let Ok(mut slot) = state.pending_screenshot.lock() {
        if *slot == Some(served) {
            *slot = None;
        }
    }
}

/// Decode a base64 image, accepting a `data:image/png;base64,` prefix.
pub fn decode_image(image: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match image.split_once("base64,") {
        Some((_, data)) => data,
        None => image,
    };
    base64::engine::general_purpose::STANDARD.decode(payload.trim())
}

/// POST /api/screenshot/request — ask the browser for a screenshot.
pub async fn request_screenshot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScreenshotRequestBody>,
) -> Json<SuccessResponse> {
    tracing::info!(chat_id = body.chat_id, pin = body.pin, "Screenshot requested");
    set_pending(
        &state,
        Some(ScreenshotRequest {
            chat_id: body.chat_id,
            pin: body.pin,
        }),
    );
    Json(SuccessResponse::ok())
}

/// GET /api/screenshot/pending — polled by the schedule page.
pub async fn pending_screenshot(
    State(state): State<Arc<AppState>>,
) -> Json<PendingScreenshotResponse> {
    let request = pending(&state);
    Json(PendingScreenshotResponse {
        pending: request.is_some(),
        chat_id: request.map(|r| r.chat_id),
    })
}

/// POST /api/screenshot — the rendered page as base64 PNG.
pub async fn upload_screenshot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScreenshotUpload>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let request = pending(&state);
    let (chat_id, pin) = match (request, body.chat_id) {
        (Some(r), _) => (r.chat_id, r.pin),
        (None, Some(chat_id)) => (chat_id, false),
        (None, None) => return Err(bad_request("No screenshot was requested")),
    };

    let png = decode_image(&body.image).map_err(|e| {
        tracing::warn!("upload_screenshot: bad image payload: {}", e);
        bad_request("Invalid image data")
    })?;

    let today = calendar::business_date(calendar::local_now(state.utc_offset));
    let caption = format!("📅 Расписание/日程 {}", calendar::display_date(today));

    let message_id = state
        .sender
        .send_photo(chat_id, png, &caption)
        .await
        .map_err(|e| {
            tracing::error!(chat_id, "Failed to send screenshot: {e:#}");
            internal_error("Failed to send screenshot")
        })?;

    if pin {
        if let Err(e) = state.sender.pin_message(chat_id, message_id).await {
            tracing::error!(chat_id, "Failed to pin screenshot: {e:#}");
        }
    }

    if let Some(served) = request {
        clear_pending(&state, served);
    }
    tracing::info!(chat_id, "Screenshot sent");
    Ok(Json(SuccessResponse::ok()))
}
