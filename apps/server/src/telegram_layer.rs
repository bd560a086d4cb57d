//! Tracing layer that forwards ERROR events to the alert chat.
//!
//! At most one message per `MIN_INTERVAL`; identical messages are suppressed
//! for `DEDUP_WINDOW`. Sending is spawned onto the Tokio runtime.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const MIN_INTERVAL: Duration = Duration::from_secs(10);
const DEDUP_WINDOW: Duration = Duration::from_secs(60);

pub struct TelegramLayer {
    bot_token: String,
    chat_id: i64,
    http: reqwest::Client,
    state: Mutex<LayerState>,
}

struct LayerState {
    last_sent: Instant,
    /// (hash, sent_at) of recently forwarded messages.
    recent: Vec<(u64, Instant)>,
}

impl LayerState {
    fn new() -> Self {
        Self {
            last_sent: Instant::now()
                .checked_sub(MIN_INTERVAL)
                .unwrap_or_else(Instant::now),
            recent: Vec::new(),
        }
    }

    /// Record and allow the message unless it is a duplicate or too soon.
    fn admit(&mut self, hash: u64, now: Instant) -> bool {
        self.recent
            .retain(|(_, ts)| now.duration_since(*ts) < DEDUP_WINDOW);

        let is_dup = self.recent.iter().any(|(h, _)| *h == hash);
        let too_soon = now.duration_since(self.last_sent) < MIN_INTERVAL;
        if is_dup || too_soon {
            return false;
        }

        self.last_sent = now;
        self.recent.push((hash, now));
        true
    }
}

impl TelegramLayer {
    pub fn new(bot_token: String, chat_id: i64) -> Self {
        Self {
            bot_token,
            chat_id,
            http: reqwest::Client::new(),
            state: Mutex::new(LayerState::new()),
        }
    }

    fn should_send(&self, message: &str) -> bool {
        let mut h = DefaultHasher::new();
        message.hash(&mut h);
        match self.state.lock() {
            Ok(mut state) => state.admit(h.finish(), Instant::now()),
            Err(_) => false,
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let message = visitor.message();

        if !self.should_send(&message) {
            return;
        }

        let text = format_alert(
            &message,
            event.metadata().target(),
            event.metadata().file(),
            event.metadata().line(),
        );

        // Errors logged outside the runtime (e.g. during startup) are dropped.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let client = self.http.clone();
        let chat_id = self.chat_id;

        handle.spawn(async move {
            let _ = client
                .post(&url)
                .json(&serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML"
                }))
                .send()
                .await;
        });
    }
}

fn format_alert(message: &str, target: &str, file: Option<&str>, line: Option<u32>) -> String {
    let file = file.unwrap_or("?");
    let line = line.map(|l| l.to_string()).unwrap_or_else(|| "?".into());
    let message = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    let now_utc = chrono::Utc::now().format("%H:%M:%S UTC");
    format!(
        "\u{1f6a8} <b>Schedule server error</b>\n\
         ━━━━━━━━━━━━━━━\n\
         <code>{message}</code>\n\
         ━━━━━━━━━━━━━━━\n\
         \u{1f4cd} {target} ({file}:{line})\n\
         \u{1f550} {now_utc}"
    )
}

/// Collects the `message` field plus any structured fields of an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl MessageVisitor {
    fn message(&self) -> String {
        if self.fields.is_empty() {
            return self.message.clone();
        }
        let extras: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if self.message.is_empty() {
            extras.join(", ")
        } else {
            format!("{} ({})", self.message, extras.join(", "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{:?}", value);
        if field.name() == "message" {
            self.message = val;
        } else {
            self.fields.push((field.name().to_string(), val));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }
}
