use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use super::{ScheduleStore, StoreError, DATA_KEY};
use crate::models::{ActiveDate, ActivityEntry, ScheduleData, ScheduleDocument};

/// `schedule_data` table in Postgres, one row per data key.
pub struct PgStore {
    pool: PgPool,
}

type Row = (
    Json<ScheduleData>,
    Json<Vec<ActivityEntry>>,
    Option<Json<Vec<ActiveDate>>>,
);

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn load(&self) -> Result<ScheduleDocument, StoreError> {
        let row = sqlx::query_as::<_, Row>(
            "SELECT schedule_data, activity_log, active_dates
             FROM schedule_data WHERE data_key = $1",
        )
        .bind(DATA_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let Some((Json(schedule_data), Json(activity_log), active_dates)) = row else {
            tracing::info!("No schedule record yet, returning empty structure");
            return Ok(ScheduleDocument::default());
        };

        Ok(ScheduleDocument {
            schedule_data,
            activity_log,
            active_dates: active_dates.map(|Json(dates)| dates),
        })
    }

    async fn save(&self, doc: &ScheduleDocument) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO schedule_data (data_key, schedule_data, activity_log, active_dates)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (data_key) DO UPDATE SET
                schedule_data = EXCLUDED.schedule_data,
                activity_log = EXCLUDED.activity_log,
                active_dates = EXCLUDED.active_dates,
                updated_at = now()",
        )
        .bind(DATA_KEY)
        .bind(Json(&doc.schedule_data))
        .bind(Json(&doc.activity_log))
        .bind(doc.active_dates.as_ref().map(Json))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
