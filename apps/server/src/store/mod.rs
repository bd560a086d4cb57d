//! Persistence of the single schedule record.

mod file;
mod postgres;
mod supabase;

pub use file::FileStore;
pub use postgres::PgStore;
pub use supabase::SupabaseStore;

use async_trait::async_trait;

use crate::models::ScheduleDocument;

/// Key of the only record the application reads and writes.
pub const DATA_KEY: &str = "main";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("datastore request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("datastore rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed schedule document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads and writes the whole schedule document at once.
///
/// A store with no record yet returns the empty document.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn load(&self) -> Result<ScheduleDocument, StoreError>;
    async fn save(&self, doc: &ScheduleDocument) -> Result<(), StoreError>;

    /// Backend name for logs and the health endpoint.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-process store for handler tests.
    #[derive(Default)]
    pub struct MemoryStore {
        doc: Mutex<Option<ScheduleDocument>>,
        fail: bool,
    }

    impl MemoryStore {
        pub fn with(doc: ScheduleDocument) -> Self {
            Self {
                doc: Mutex::new(Some(doc)),
                fail: false,
            }
        }

        pub fn broken() -> Self {
            Self {
                doc: Mutex::new(None),
                fail: true,
            }
        }

        pub fn current(&self) -> Option<ScheduleDocument> {
            self.doc.lock().unwrap().clone()
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ScheduleStore for MemoryStore {
        async fn load(&self) -> Result<ScheduleDocument, StoreError> {
            self.check()?;
            Ok(self.current().unwrap_or_default())
        }

        async fn save(&self, doc: &ScheduleDocument) -> Result<(), StoreError> {
            self.check()?;
            *self.doc.lock().unwrap() = Some(doc.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }
}
