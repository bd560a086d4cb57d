use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ── Schedule document ──

/// All bookable days keyed by `YYYY-MM-DD`, plus the two global fields that
/// live next to the day keys in the same JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleData {
    #[serde(
        rename = "sharedNotes",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub shared_notes: String,
    #[serde(
        rename = "sharedAddresses",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub shared_addresses: BTreeMap<String, String>,
    #[serde(flatten)]
    pub days: BTreeMap<String, DayRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub slots: BTreeMap<String, TableSlots>,
    /// Per-day fields the frontend stores that the backend does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Time-slot → booking for one table, with the table's address.
///
/// Slot values are kept as the frontend sent them; `text` reads one as a
/// booking string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub times: BTreeMap<String, Value>,
}

impl TableSlots {
    /// Booking text of a slot. Missing and `null` are empty; numbers and
    /// other non-string values are rendered as JSON.
    pub fn text(&self, time: &str) -> String {
        match self.times.get(time) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub time: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDate {
    pub key: String,
    pub display: String,
}

/// The single stored record, also the body of `GET /api/schedule`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDocument {
    #[serde(default)]
    pub schedule_data: ScheduleData,
    #[serde(default)]
    pub activity_log: Vec<ActivityEntry>,
    #[serde(default)]
    pub active_dates: Option<Vec<ActiveDate>>,
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveScheduleRequest {
    pub schedule_data: ScheduleData,
    pub user: Option<String>,
    pub activity_log: Option<Vec<ActivityEntry>>,
    pub active_dates: Option<Vec<ActiveDate>>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    pub message: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRequestBody {
    pub chat_id: i64,
    #[serde(default)]
    pub pin: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotUpload {
    pub image: String,
    pub chat_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingScreenshotResponse {
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}
