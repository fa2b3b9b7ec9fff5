use credit_intake::config::AppConfig;
use credit_intake::workflows::credit_risk::{
    PresentationMode, RepositoryError, SessionId, SessionRecord, SessionRepository,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local session store; sessions do not survive a restart.
#[derive(Default, Clone)]
pub(crate) struct InMemorySessionRepository {
    records: Arc<Mutex<HashMap<SessionId, SessionRecord>>>,
}

impl InMemorySessionRepository {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, SessionRecord>>, RepositoryError>
    {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("session store mutex poisoned".to_string()))
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn insert(&self, record: SessionRecord) -> Result<SessionRecord, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<SessionRecord>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.get(id).cloned())
    }

    fn update<T, F>(&self, id: &SessionId, change: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut SessionRecord) -> T,
    {
        let mut guard = self.lock()?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        Ok(change(record))
    }

    fn remove(&self, id: &SessionId) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.remove(id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound),
        }
    }
}

/// Flags shared by the commands that talk to the scoring service.
#[derive(clap::Args, Debug, Default, Clone)]
pub(crate) struct ScoringArgs {
    /// Override the scoring service endpoint (SCORING_ENDPOINT)
    #[arg(long)]
    pub(crate) endpoint: Option<String>,
    /// Override the scoring request timeout in seconds (SCORING_TIMEOUT_SECS)
    #[arg(long, value_parser = parse_timeout)]
    pub(crate) timeout_secs: Option<Duration>,
}

impl ScoringArgs {
    pub(crate) fn apply(&self, config: &mut AppConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.scoring.endpoint = endpoint.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.scoring.timeout = timeout;
        }
    }
}

pub(crate) fn parse_mode(raw: &str) -> Result<PresentationMode, String> {
    raw.parse::<PresentationMode>()
}

pub(crate) fn parse_timeout(raw: &str) -> Result<Duration, String> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(format!("'{raw}' is not a positive number of seconds")),
    }
}
