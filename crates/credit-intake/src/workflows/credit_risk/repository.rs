use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::QuestionnaireSession;

/// Identifier wrapper for live questionnaire sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// A session plus the bookkeeping the HTTP surface reports.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub session: QuestionnaireSession,
}

/// Storage abstraction so the service can be exercised in isolation.
///
/// `update` must run the closure under the store's exclusion; the pending-submission check
/// relies on it.
pub trait SessionRepository: Send + Sync {
    fn insert(&self, record: SessionRecord) -> Result<SessionRecord, RepositoryError>;
    fn fetch(&self, id: &SessionId) -> Result<Option<SessionRecord>, RepositoryError>;
    fn update<T, F>(&self, id: &SessionId, change: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut SessionRecord) -> T;
    fn remove(&self, id: &SessionId) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("session already exists")]
    Conflict,
    #[error("session not found")]
    NotFound,
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}
