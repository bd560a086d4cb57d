//! Per-slot change detection between two schedule versions and the chat
//! messages those changes turn into.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::{
    calendar,
    models::{DayRecord, ScheduleData, TableSlots},
    telegram::{ChatRoutes, ChatSender},
};

/// Table whose chat also receives sport-marked bookings.
pub const SPORTS_TABLE: &str = "⚽️";

/// Booking markers that copy a notification to the sports chat.
const SPORTS_MARKERS: [&str; 2] = ["⚽️", "👄"];

/// Symbol and pictograph blocks. Variation selectors and ZWJ are not in the
/// set, so `⚽️` (U+26BD U+FE0F) still counts as text.
static EMOJI_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[\x{1F000}-\x{1F02F}\x{1F0A0}-\x{1F0FF}\x{1F100}-\x{1F64F}\x{1F680}-\x{1F6FF}\x{1F700}-\x{1F8FF}\x{1F900}-\x{1F9FF}\x{1FA00}-\x{1FAFF}\x{2600}-\x{27BF}]|\s)+$",
    )
    .expect("emoji pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Delete,
    Modify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChange {
    pub kind: ChangeKind,
    pub table: String,
    /// `D.M` form of the day-key.
    pub date: String,
    pub time: String,
    pub old_value: String,
    pub new_value: String,
    pub user: String,
}

impl SlotChange {
    /// The booking text the change is about.
    pub fn value(&self) -> &str {
        if self.new_value.is_empty() {
            &self.old_value
        } else {
            &self.new_value
        }
    }

    /// HTML message for the chat groups.
    pub fn message(&self) -> String {
        let date = &self.date;
        let table = escape_html(&self.table);
        match self.kind {
            ChangeKind::Add => format!(
                "📝 <b>бронь/预订 {table}</b>\n📅 {date} ⏰ {}",
                escape_html(&self.new_value)
            ),
            ChangeKind::Delete => format!(
                "🗑️ <b>отмена брони/消除 {table}</b>\n❌ {date} ⏰ {}",
                escape_html(&self.old_value)
            ),
            ChangeKind::Modify => format!(
                "✏️ <b>Изменение/改变 {table}</b>\n📅{date}  ⏰ {}🔄 {}",
                escape_html(&self.old_value),
                escape_html(&self.new_value)
            ),
        }
    }

    /// Emoji-only edits are decoration and are not announced.
    pub fn is_silent(&self) -> bool {
        is_only_emojis(&self.new_value) || is_only_emojis(&self.old_value)
    }
}

/// Compare every (day, table, time-slot) leaf of two schedules.
///
/// Absent and empty values are the same thing; `address` is not a time slot.
pub fn detect_changes(old: &ScheduleData, new: &ScheduleData, user: &str) -> Vec<SlotChange> {
    let empty_day = DayRecord::default();
    let empty_slots = TableSlots::default();

    let dates: BTreeSet<&String> = old.days.keys().chain(new.days.keys()).collect();
    let mut changes = Vec::new();

    for date_key in dates {
        let old_day = old.days.get(date_key).unwrap_or(&empty_day);
        let new_day = new.days.get(date_key).unwrap_or(&empty_day);
        let display = calendar::display_from_key(date_key);

        for table in tables_of(old_day, new_day) {
            let old_slots = old_day.slots.get(table).unwrap_or(&empty_slots);
            let new_slots = new_day.slots.get(table).unwrap_or(&empty_slots);

            let times: BTreeSet<&String> =
                old_slots.times.keys().chain(new_slots.times.keys()).collect();

            for time in times {
                let old_value = old_slots.text(time);
                let new_value = new_slots.text(time);
                if old_value == new_value {
                    continue;
                }

                let kind = match (old_value.is_empty(), new_value.is_empty()) {
                    (true, false) => ChangeKind::Add,
                    (false, true) => ChangeKind::Delete,
                    _ => ChangeKind::Modify,
                };

                changes.push(SlotChange {
                    kind,
                    table: table.clone(),
                    date: display.clone(),
                    time: time.clone(),
                    old_value,
                    new_value,
                    user: user.to_string(),
                });
            }
        }
    }

    changes
}

/// Tables declared on either side, in declaration order, followed by tables
/// that only appear in the slot maps.
fn tables_of<'a>(old: &'a DayRecord, new: &'a DayRecord) -> Vec<&'a String> {
    let mut tables: Vec<&String> = Vec::new();
    let candidates = old
        .tables
        .iter()
        .chain(new.tables.iter())
        .chain(old.slots.keys())
        .chain(new.slots.keys());
    for table in candidates {
        if !tables.contains(&table) {
            tables.push(table);
        }
    }
    tables
}

/// True for a non-empty value made only of emoji and whitespace.
pub fn is_only_emojis(s: &str) -> bool {
    !s.is_empty() && EMOJI_ONLY.is_match(s)
}

/// Chats a change is announced in: the table's own chat, plus the sports chat
/// when the booking carries a sports marker.
pub fn recipients(change: &SlotChange, routes: &ChatRoutes) -> Vec<i64> {
    let mut chats = Vec::new();
    let table_chat = routes.chat_for(&change.table);
    if let Some(chat) = table_chat {
        chats.push(chat);
    }

    let value = change.value();
    if SPORTS_MARKERS.iter().any(|m| value.contains(m)) {
        if let Some(sports_chat) = routes.chat_for(SPORTS_TABLE) {
            if Some(sports_chat) != table_chat {
                chats.push(sports_chat);
            }
        }
    }
    chats
}

/// Send every non-silent change to its chats. Delivery failures are logged
/// and never abort the remaining notifications.
pub async fn notify_changes(sender: &dyn ChatSender, routes: &ChatRoutes, changes: &[SlotChange]) {
    for change in changes {
        if change.is_silent() {
            tracing::debug!(table = %change.table, "Skipping emoji-only change");
            continue;
        }

        let text = change.message();
        for chat_id in recipients(change, routes) {
            match sender.send_message(chat_id, &text).await {
                Ok(()) => tracing::info!(chat_id, table = %change.table, "Change notification sent"),
                Err(e) => tracing::error!(chat_id, "Failed to send change notification: {e:#}"),
            }
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
