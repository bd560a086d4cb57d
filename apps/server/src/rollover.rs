//! Daily rollover of the visible date window at 04:00 local time.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    calendar,
    models::{DayRecord, ScheduleDocument},
    store::ScheduleStore,
};

/// Slack added after the computed wake-up so the job never runs at 03:59:59.
const WAKE_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RolloverSummary {
    pub removed: Vec<String>,
    pub added: Vec<String>,
    pub carried_addresses: usize,
}

/// Advance the document to the business day of `now`.
///
/// Days before today are dropped, tomorrow and the day after are created if
/// missing, table addresses of today are carried onto tomorrow, and the active
/// window is re-pinned. Shared notes and addresses stay at top level untouched.
pub fn roll_forward(doc: &mut ScheduleDocument, now: DateTime<FixedOffset>) -> RolloverSummary {
    let today = calendar::business_date(now);
    let today_key = calendar::day_key(today);
    let tomorrow_key = calendar::day_key(today + TimeDelta::days(1));
    let mut summary = RolloverSummary::default();
    let days = &mut doc.schedule_data.days;

    summary.removed = days
        .keys()
        .filter(|key| {
            NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .map(|date| date < today)
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    for key in &summary.removed {
        days.remove(key);
    }

    for offset in 1..calendar::VISIBLE_DAYS {
        let key = calendar::day_key(today + TimeDelta::days(offset));
        if !days.contains_key(&key) {
            days.insert(key.clone(), DayRecord::default());
            summary.added.push(key);
        }
    }

    let addresses: Vec<(String, String)> = days
        .get(&today_key)
        .map(|day| {
            day.slots
                .iter()
                .filter_map(|(table, slots)| {
                    let address = slots.address.as_ref().filter(|a| !a.is_empty())?;
                    Some((table.clone(), address.clone()))
                })
                .collect()
        })
        .unwrap_or_default();

    if let Some(tomorrow) = days.get_mut(&tomorrow_key) {
        for (table, address) in addresses {
            tomorrow.slots.entry(table).or_default().address = Some(address);
            summary.carried_addresses += 1;
        }
    }

    doc.active_dates = Some(calendar::next_three_dates(now));
    summary
}

/// Load, roll forward and save once.
pub async fn rollover_once(store: &dyn ScheduleStore, offset: FixedOffset) -> anyhow::Result<()> {
    let now = calendar::local_now(offset);
    let mut doc = store.load().await?;
    let summary = roll_forward(&mut doc, now);
    store.save(&doc).await?;

    tracing::info!(
        removed = ?summary.removed,
        added = ?summary.added,
        addresses = summary.carried_addresses,
        "Day rollover completed"
    );
    Ok(())
}

/// Background task: sleep until the next day boundary, roll over, repeat.
pub async fn run_daily(store: Arc<dyn ScheduleStore>, offset: FixedOffset) {
    loop {
        let delay = calendar::next_rollover_delay(calendar::local_now(offset));
        tracing::info!("Next day rollover in {} min", delay.as_secs() / 60);
        tokio::time::sleep(delay + WAKE_MARGIN).await;

        if let Err(e) = rollover_once(store.as_ref(), offset).await {
            tracing::error!("Automatic daily reset failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
    }

    fn doc(value: serde_json::Value) -> ScheduleDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_drops_past_days_and_adds_window() {
        let mut d = doc(json!({
            "scheduleData": {
                "sharedNotes": "door code 1234",
                "sharedAddresses": { "111": "Fuxing Rd 1" },
                "2025-03-08": { "tables": ["111"] },
                "2025-03-09": { "tables": ["111"], "slots": { "111": { "18:00": "Ivan" } } },
                "2025-03-10": { "tables": ["222"] },
                "2025-03-11": { "tables": ["333"] }
            }
        }));

        let summary = roll_forward(&mut d, at(2025, 3, 10, 4));

        assert_eq!(summary.removed, vec!["2025-03-08", "2025-03-09"]);
        assert_eq!(summary.added, vec!["2025-03-12"]);
        let keys: Vec<&str> = d.schedule_data.days.keys().map(String::as_str).collect();
        assert_eq!(keys, ["2025-03-10", "2025-03-11", "2025-03-12"]);
        assert_eq!(d.schedule_data.days["2025-03-11"].tables, vec!["333"]);
        assert_eq!(d.schedule_data.shared_notes, "door code 1234");
        assert_eq!(d.schedule_data.shared_addresses["111"], "Fuxing Rd 1");

        let active: Vec<&str> = d
            .active_dates
            .as_ref()
            .unwrap()
            .iter()
            .map(|a| a.key.as_str())
            .collect();
        assert_eq!(active, ["2025-03-10", "2025-03-11", "2025-03-12"]);
    }

    #[test]
    fn test_addresses_carry_onto_tomorrow() {
        let mut d = doc(json!({
            "scheduleData": {
                "2025-03-10": {
                    "tables": ["111", "222"],
                    "slots": {
                        "111": { "address": "Fuxing Rd 1", "18:00": "Ivan" },
                        "222": { "address": "" }
                    }
                },
                "2025-03-11": {
                    "tables": ["111"],
                    "slots": { "111": { "20:00": "Olga" } }
                }
            }
        }));

        let summary = roll_forward(&mut d, at(2025, 3, 10, 4));

        assert_eq!(summary.carried_addresses, 1);
        let tomorrow = &d.schedule_data.days["2025-03-11"].slots;
        assert_eq!(tomorrow["111"].address.as_deref(), Some("Fuxing Rd 1"));
        assert_eq!(tomorrow["111"].times["20:00"], "Olga");
        assert!(!tomorrow["111"].times.contains_key("18:00"));
        assert!(!tomorrow.contains_key("222"));
    }

    #[test]
    fn test_run_before_four_uses_previous_day() {
        let mut d = doc(json!({ "scheduleData": { "2025-03-09": {} } }));
        let summary = roll_forward(&mut d, at(2025, 3, 10, 3));
        assert!(summary.removed.is_empty());
        assert!(d.schedule_data.days.contains_key("2025-03-09"));
        assert!(d.schedule_data.days.contains_key("2025-03-11"));
    }

    #[test]
    fn test_rollover_is_idempotent() {
        let mut d = doc(json!({ "scheduleData": { "2025-03-10": {} } }));
        roll_forward(&mut d, at(2025, 3, 10, 5));
        let first = d.clone();
        let summary = roll_forward(&mut d, at(2025, 3, 10, 5));
        assert_eq!(d, first);
        assert!(summary.added.is_empty() && summary.removed.is_empty());
    }

    #[test]
    fn test_non_date_keys_are_kept() {
        let mut d = doc(json!({ "scheduleData": { "template": { "tables": ["111"] } } }));
        roll_forward(&mut d, at(2025, 3, 10, 5));
        assert!(d.schedule_data.days.contains_key("template"));
    }

    #[tokio::test]
    async fn test_rollover_once_persists() {
        let store = MemoryStore::default();
        rollover_once(&store, FixedOffset::east_opt(8 * 3600).unwrap())
            .await
            .unwrap();
        let saved = store.current().unwrap();
        assert_eq!(saved.active_dates.as_ref().map(Vec::len), Some(3));
        assert_eq!(saved.schedule_data.days.len(), 2);
    }

    #[tokio::test]
    async fn test_rollover_once_reports_store_failure() {
        let store = MemoryStore::broken();
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        assert!(rollover_once(&store, offset).await.is_err());
    }
}
