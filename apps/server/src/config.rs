use anyhow::{bail, Context};
use chrono::FixedOffset;
use std::path::PathBuf;

use crate::telegram::ChatRoutes;

/// Which datastore holds the schedule record.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Postgres { database_url: String },
    Supabase { url: String, anon_key: String },
    File { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub bot_token: String,
    pub chat_routes: ChatRoutes,
    pub alert_chat_id: Option<i64>,
    pub utc_offset: FixedOffset,
    pub static_dir: PathBuf,
    pub rollover_enabled: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let storage = match var("STORAGE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StorageBackend::Postgres {
                database_url: var("DATABASE_URL")
                    .context("DATABASE_URL must be set for the postgres backend")?,
            },
            "supabase" => StorageBackend::Supabase {
                url: var("SUPABASE_URL").context("SUPABASE_URL must be set")?,
                anon_key: var("SUPABASE_ANON_KEY").context("SUPABASE_ANON_KEY must be set")?,
            },
            "file" => StorageBackend::File {
                path: var("DATA_FILE")
                    .unwrap_or_else(|| "schedule-data.json".into())
                    .into(),
            },
            other => bail!("STORAGE_BACKEND must be postgres, supabase or file, got {other:?}"),
        };

        let port = var("PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PORT must be a number")?;

        let alert_chat_id = var("ALERT_CHAT_ID")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("ALERT_CHAT_ID must be a number")?;

        let offset_hours: i32 = var("UTC_OFFSET_HOURS")
            .unwrap_or_else(|| "8".into())
            .parse()
            .context("UTC_OFFSET_HOURS must be a whole number of hours")?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
            .context("UTC_OFFSET_HOURS out of range")?;

        let rollover_enabled = match var("ROLLOVER_ENABLED").as_deref() {
            None | Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            Some(other) => bail!("ROLLOVER_ENABLED must be true or false, got {other:?}"),
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            storage,
            bot_token: var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?,
            chat_routes: ChatRoutes::parse(&var("TELEGRAM_CHAT_IDS").unwrap_or_default())
                .context("TELEGRAM_CHAT_IDS is malformed")?,
            alert_chat_id,
            utc_offset,
            static_dir: var("STATIC_DIR").unwrap_or_else(|| "public".into()).into(),
            rollover_enabled,
        })
    }
}
