mod ledger;

use anyhow::Context;
use chrono::FixedOffset;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use teloxide::{
    prelude::*,
    types::ParseMode,
    update_listeners::webhooks,
    utils::command::BotCommands,
};

const WEBHOOK_PATH: &str = "/webhook";

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    #[command(description = "Начать / 开始")]
    Start,
    #[command(description = "Операции за сегодня / 今日记录")]
    All,
    #[command(description = "Баланс / 余额")]
    Balance,
    #[command(description = "Закрепить расписание / 置顶日程")]
    Pin,
    #[command(description = "Помощь / 帮助")]
    Help,
}

#[derive(Clone)]
struct BotState {
    pool: sqlx::PgPool,
    http: reqwest::Client,
    schedule_api_url: String,
    ledger_chats: Vec<i64>,
    utc_offset: FixedOffset,
}

impl BotState {
    /// Ledger messages count only in listed chats, or in any group when none are listed.
    fn is_ledger_chat(&self, chat: &teloxide::types::Chat) -> bool {
        if self.ledger_chats.is_empty() {
            chat.is_group() || chat.is_supergroup()
        } else {
            self.ledger_chats.contains(&chat.id.0)
        }
    }

    fn now(&self) -> chrono::DateTime<FixedOffset> {
        chrono::Utc::now().with_timezone(&self.utc_offset)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse()?),
        )
        .init();

    let bot_token =
        std::env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let schedule_api_url = std::env::var("SCHEDULE_API_URL")
        .unwrap_or_else(|_| "http://localhost:3000".into())
        .trim_end_matches('/')
        .to_string();
    let ledger_chats = parse_chat_ids(&std::env::var("LEDGER_CHAT_IDS").unwrap_or_default())?;
    let offset_hours: i32 = std::env::var("UTC_OFFSET_HOURS")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().parse())
        .transpose()
        .context("UTC_OFFSET_HOURS must be a number of hours")?
        .unwrap_or(8);
    let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
        .context("UTC_OFFSET_HOURS is out of range")?;

    let pool = PgPoolOptions::new()
        .max_connections(3)
        .connect(&database_url)
        .await
        .context("Failed to connect to Postgres")?;
    ledger::run_migrations(&pool).await?;

    let bot = Bot::new(&bot_token);

    tracing::info!(
        "📒 Schedule bot starting (ledger chats: {})",
        if ledger_chats.is_empty() {
            "all groups".to_string()
        } else {
            ledger_chats.len().to_string()
        }
    );

    let state = BotState {
        pool,
        http: reqwest::Client::new(),
        schedule_api_url,
        ledger_chats,
        utc_offset,
    };

    let cmd_handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint({
            let state = state.clone();
            move |bot: Bot, msg: Message, cmd: Command| {
                let state = state.clone();
                async move {
                    handle_command(bot, msg, cmd, &state).await?;
                    Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                }
            }
        });

    let ledger_handler = Update::filter_message().endpoint({
        let state = state.clone();
        move |bot: Bot, msg: Message| {
            let state = state.clone();
            async move {
                handle_ledger_message(bot, msg, &state).await?;
                Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
            }
        }
    });

    let handler = dptree::entry().branch(cmd_handler).branch(ledger_handler);

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .enable_ctrlc_handler()
        .build();

    match std::env::var("BOT_WEBHOOK_URL").ok().filter(|v| !v.trim().is_empty()) {
        Some(url) => {
            let mut url: reqwest::Url = url.trim().parse().context("BOT_WEBHOOK_URL is not a URL")?;
            if url.path() == "/" {
                url.set_path(WEBHOOK_PATH);
            }
            let addr: SocketAddr = std::env::var("BOT_WEBHOOK_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8443".into())
                .parse()
                .context("BOT_WEBHOOK_ADDR must be host:port")?;

            tracing::info!("Receiving updates by webhook {} on {}", url, addr);
            let listener = webhooks::axum(bot, webhooks::Options::new(addr, url))
                .await
                .context("Failed to set up webhook")?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the webhook listener"),
                )
                .await;
        }
        None => {
            tracing::info!("Receiving updates by long polling");
            dispatcher.dispatch().await;
        }
    }

    Ok(())
}

fn parse_chat_ids(raw: &str) -> anyhow::Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("LEDGER_CHAT_IDS: invalid chat id {s:?}"))
        })
        .collect()
}

// ── Command handlers ──

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: &BotState,
) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;

    match cmd {
        Command::Start => {
            bot.send_message(
                chat_id,
                format!(
                    "👋 <b>Shanghai schedule</b>\n\n\
                     Chat ID: <code>{}</code>\n\n\
                     +N / -N — изменить баланс / 修改余额\n\
                     /help — команды / 命令",
                    chat_id.0
                ),
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }

        Command::All => {
            let day_key = ledger::business_day_key(state.now());
            let transactions =
                ledger::transactions_for_day(&state.pool, chat_id.0, &day_key).await?;
            let balance = ledger::balance(&state.pool, chat_id.0).await?;

            bot.send_message(
                chat_id,
                ledger::format_day_report(&day_key, &transactions, balance, state.utc_offset),
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }

        Command::Balance => {
            let balance = ledger::balance(&state.pool, chat_id.0).await?;
            bot.send_message(chat_id, format!("💰 Баланс/余额: <b>{}</b>", balance))
                .parse_mode(ParseMode::Html)
                .await?;
        }

        Command::Pin => {
            let text = match request_pinned_screenshot(state, chat_id.0).await {
                Ok(()) => "📸 Скриншот запрошен, скоро будет здесь / 截图已请求",
                Err(e) => {
                    tracing::error!("Screenshot request for chat {} failed: {e:#}", chat_id.0);
                    "⚠️ Не удалось запросить скриншот / 截图请求失败"
                }
            };
            bot.send_message(chat_id, text).await?;
        }

        Command::Help => {
            bot.send_message(chat_id, Command::descriptions().to_string())
                .await?;
        }
    }

    Ok(())
}

async fn request_pinned_screenshot(state: &BotState, chat_id: i64) -> anyhow::Result<()> {
    let url = format!("{}/api/screenshot/request", state.schedule_api_url);
    state
        .http
        .post(&url)
        .json(&serde_json::json!({ "chatId": chat_id, "pin": true }))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

// ── Ledger messages ──

async fn handle_ledger_message(bot: Bot, msg: Message, state: &BotState) -> anyhow::Result<()> {
    let Some(entry) = msg.text().and_then(ledger::parse_entry) else {
        return Ok(());
    };
    if !state.is_ledger_chat(&msg.chat) {
        return Ok(());
    }

    let chat_id = msg.chat.id;
    let day_key = ledger::business_day_key(state.now());
    let balance = ledger::apply(&state.pool, chat_id.0, &entry, &day_key).await?;

    tracing::info!(
        "💰 Chat {}: {} {} → {}",
        chat_id.0,
        entry.operation.as_str(),
        entry.amount,
        balance
    );

    bot.send_message(chat_id, ledger::format_applied(&entry, balance))
        .parse_mode(ParseMode::Html)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_ids() {
        assert_eq!(parse_chat_ids("").unwrap(), Vec::<i64>::new());
        assert_eq!(
            parse_chat_ids("-1001, -1002 ,").unwrap(),
            vec![-1001, -1002]
        );
        assert!(parse_chat_ids("-1001,abc").is_err());
    }

    #[test]
    fn test_commands_parse() {
        assert!(matches!(Command::parse("/all", "bot"), Ok(Command::All)));
        assert!(matches!(Command::parse("/pin", "bot"), Ok(Command::Pin)));
        assert!(Command::parse("+500", "bot").is_err());
    }
}
