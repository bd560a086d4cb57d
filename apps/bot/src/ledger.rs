//! Per-chat balance kept from `+N` / `-N` messages.

use chrono::{DateTime, Datelike, FixedOffset, TimeDelta, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;

/// Business days start at 04:00 local, as in the schedule.
const DAY_START_HOUR: u32 = 4;

static ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-]) ?(\d{1,12})$").expect("ledger pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
        }
    }

    fn sign(self) -> char {
        match self {
            Operation::Add => '+',
            Operation::Subtract => '-',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub operation: Operation,
    pub amount: i64,
}

impl LedgerEntry {
    pub fn signed(&self) -> i64 {
        match self.operation {
            Operation::Add => self.amount,
            Operation::Subtract => -self.amount,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Transaction {
    pub amount: i64,
    pub operation: String,
    pub day_key: String,
    pub created_at: DateTime<Utc>,
}

/// `+500`, `- 20` → entry; anything else (including zero) is not a ledger message.
pub fn parse_entry(text: &str) -> Option<LedgerEntry> {
    let caps = ENTRY.captures(text.trim())?;
    let amount: i64 = caps[2].parse().ok()?;
    if amount == 0 {
        return None;
    }
    let operation = if &caps[1] == "+" {
        Operation::Add
    } else {
        Operation::Subtract
    };
    Some(LedgerEntry { operation, amount })
}

/// `YYYY-MM-DD` of the business day containing `now`.
pub fn business_day_key(now: DateTime<FixedOffset>) -> String {
    let mut date = now.date_naive();
    if now.hour() < DAY_START_HOUR {
        date -= TimeDelta::days(1);
    }
    date.format("%Y-%m-%d").to_string()
}

fn display_day(day_key: &str) -> String {
    chrono::NaiveDate::parse_from_str(day_key, "%Y-%m-%d")
        .map(|d| format!("{}.{}", d.day(), d.month()))
        .unwrap_or_else(|_| day_key.to_string())
}

// ── Messages ──

pub fn format_applied(entry: &LedgerEntry, balance: i64) -> String {
    format!(
        "✅ {}{} → баланс/余额: <b>{}</b>",
        entry.operation.sign(),
        entry.amount,
        balance
    )
}

pub fn format_day_report(
    day_key: &str,
    transactions: &[Transaction],
    balance: i64,
    offset: FixedOffset,
) -> String {
    let mut text = format!("📋 <b>{}</b>\n\n", display_day(day_key));

    if transactions.is_empty() {
        text.push_str("Нет операций/没有记录\n");
    }

    let mut day_total = 0;
    for (i, tx) in transactions.iter().enumerate() {
        let sign = if tx.operation == Operation::Subtract.as_str() {
            day_total -= tx.amount;
            '-'
        } else {
            day_total += tx.amount;
            '+'
        };
        text.push_str(&format!(
            "{}. {} {}{}\n",
            i + 1,
            tx.created_at.with_timezone(&offset).format("%H:%M"),
            sign,
            tx.amount
        ));
    }

    text.push_str(&format!(
        "━━━━━━━━━━━━━\n📊 За день/今日: <b>{:+}</b>\n💰 Баланс/余额: <b>{}</b>",
        day_total, balance
    ));
    text
}

// ── Storage ──

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chat_balances (
            chat_id    BIGINT PRIMARY KEY,
            balance    BIGINT NOT NULL DEFAULT 0,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS balance_transactions (
            id         BIGSERIAL PRIMARY KEY,
            chat_id    BIGINT NOT NULL,
            amount     BIGINT NOT NULL,
            operation  TEXT NOT NULL,
            day_key    TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_balance_transactions_chat_day
         ON balance_transactions(chat_id, day_key)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Ledger tables ready");
    Ok(())
}

/// Apply an entry and record it; returns the new balance.
pub async fn apply(
    pool: &PgPool,
    chat_id: i64,
    entry: &LedgerEntry,
    day_key: &str,
) -> anyhow::Result<i64> {
    let mut tx = pool.begin().await?;

    let balance: i64 = sqlx::query_scalar(
        "INSERT INTO chat_balances (chat_id, balance) VALUES ($1, $2)
         ON CONFLICT (chat_id) DO UPDATE
         SET balance = chat_balances.balance + EXCLUDED.balance, updated_at = now()
         RETURNING balance",
    )
    .bind(chat_id)
    .bind(entry.signed())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO balance_transactions (chat_id, amount, operation, day_key)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(chat_id)
    .bind(entry.amount)
    .bind(entry.operation.as_str())
    .bind(day_key)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(balance)
}

pub async fn balance(pool: &PgPool, chat_id: i64) -> anyhow::Result<i64> {
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT balance FROM chat_balances WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_optional(pool)
            .await?;
    Ok(balance.unwrap_or(0))
}

pub async fn transactions_for_day(
    pool: &PgPool,
    chat_id: i64,
    day_key: &str,
) -> anyhow::Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, Transaction>(
        "SELECT amount, operation, day_key, created_at
         FROM balance_transactions
         WHERE chat_id = $1 AND day_key = $2
         ORDER BY created_at ASC, id ASC",
    )
    .bind(chat_id)
    .bind(day_key)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn shanghai() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn test_parse_add_and_subtract() {
        assert_eq!(
            parse_entry("+500"),
            Some(LedgerEntry { operation: Operation::Add, amount: 500 })
        );
        assert_eq!(
            parse_entry("  - 20\n"),
            Some(LedgerEntry { operation: Operation::Subtract, amount: 20 })
        );
    }

    #[test]
    fn test_parse_rejects_other_text() {
        for text in [
            "500", "+", "+0", "+5.5", "+500 for drinks", "call +7999", "", "++5", "+  5", "+\n5",
            "-\t5",
        ] {
            assert_eq!(parse_entry(text), None, "{text:?}");
        }
    }

    #[test]
    fn test_signed_amount() {
        assert_eq!(parse_entry("-30").unwrap().signed(), -30);
        assert_eq!(parse_entry("+30").unwrap().signed(), 30);
    }

    #[test]
    fn test_business_day_key_boundary() {
        let before = shanghai().with_ymd_and_hms(2025, 3, 10, 3, 59, 0).unwrap();
        let after = shanghai().with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap();
        assert_eq!(business_day_key(before), "2025-03-09");
        assert_eq!(business_day_key(after), "2025-03-10");
    }

    #[test]
    fn test_format_applied() {
        let entry = parse_entry("-200").unwrap();
        assert_eq!(format_applied(&entry, 800), "✅ -200 → баланс/余额: <b>800</b>");
    }

    #[test]
    fn test_day_report() {
        let at = |h: u32| Utc.with_ymd_and_hms(2025, 3, 10, h, 15, 0).unwrap();
        let txs = vec![
            Transaction {
                amount: 500,
                operation: "add".into(),
                day_key: "2025-03-10".into(),
                created_at: at(2),
            },
            Transaction {
                amount: 120,
                operation: "subtract".into(),
                day_key: "2025-03-10".into(),
                created_at: at(5),
            },
        ];
        let text = format_day_report("2025-03-10", &txs, 1380, shanghai());
        assert!(text.starts_with("📋 <b>10.3</b>"));
        assert!(text.contains("1. 10:15 +500\n"));
        assert!(text.contains("2. 13:15 -120\n"));
        assert!(text.contains("<b>+380</b>"));
        assert!(text.ends_with("<b>1380</b>"));
    }

    #[test]
    fn test_empty_day_report() {
        let text = format_day_report("2025-03-10", &[], 0, shanghai());
        assert!(text.contains("Нет операций"));
        assert!(text.contains("<b>+0</b>"));
    }
}
