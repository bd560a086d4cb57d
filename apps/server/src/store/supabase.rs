use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ScheduleStore, StoreError, DATA_KEY};
use crate::models::{ActiveDate, ActivityEntry, ScheduleData, ScheduleDocument};

const TABLE: &str = "schedule_data";

/// The same `schedule_data` table reached through Supabase's REST gateway.
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct RowOut {
    schedule_data: Option<ScheduleData>,
    activity_log: Option<Vec<ActivityEntry>>,
    active_dates: Option<Vec<ActiveDate>>,
}

#[derive(Serialize)]
struct RowIn<'a> {
    data_key: &'a str,
    schedule_data: &'a ScheduleData,
    activity_log: &'a [ActivityEntry],
    active_dates: Option<&'a [ActiveDate]>,
}

impl From<RowOut> for ScheduleDocument {
    fn from(row: RowOut) -> Self {
        Self {
            schedule_data: row.schedule_data.unwrap_or_default(),
            activity_log: row.activity_log.unwrap_or_default(),
            active_dates: row.active_dates,
        }
    }
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, TABLE)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ScheduleStore for SupabaseStore {
    async fn load(&self) -> Result<ScheduleDocument, StoreError> {
        let req = self.http.get(self.table_url()).query(&[
            ("data_key", format!("eq.{DATA_KEY}")),
            ("select", "schedule_data,activity_log,active_dates".to_string()),
        ]);
        let resp = Self::check(self.authorized(req).send().await?).await?;
        let rows: Vec<RowOut> = resp.json().await?;

        match rows.into_iter().next() {
            Some(row) => Ok(row.into()),
            None => {
                tracing::info!("No schedule record yet, returning empty structure");
                Ok(ScheduleDocument::default())
            }
        }
    }

    async fn save(&self, doc: &ScheduleDocument) -> Result<(), StoreError> {
        let row = RowIn {
            data_key: DATA_KEY,
            schedule_data: &doc.schedule_data,
            activity_log: &doc.activity_log,
            active_dates: doc.active_dates.as_deref(),
        };
        let req = self
            .http
            .post(self.table_url())
            .query(&[("on_conflict", "data_key")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        Self::check(self.authorized(req).send().await?).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}
