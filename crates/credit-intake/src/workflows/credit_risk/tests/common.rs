use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use serde_json::Value;

use crate::workflows::credit_risk::repository::{
    RepositoryError, SessionId, SessionRecord, SessionRepository,
};
use crate::workflows::credit_risk::{
    EncodedPayload, PredictionResponse, PredictionValue, PresentationMode, QuestionnaireService,
    ScoringService, TransportError,
};

/// A complete, valid answer set in schema order.
pub(super) fn answers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("age", "35"),
        ("owns_house", "Yes"),
        ("owns_car", "No"),
        ("agency", "Equifax"),
        ("credit_score", "720"),
        ("net_yearly_income", "55000"),
        ("credit_limit", "10000"),
        ("credit_limit_used", "25"),
        ("default_in_last_6months", "0"),
        ("gender", "Female"),
        ("migrant_worker", "No"),
        ("no_of_children", "2"),
        ("no_of_days_employed", "1200"),
        ("occupation", "IT_staff"),
    ]
}

pub(super) fn success_response() -> PredictionResponse {
    let mut predictions = BTreeMap::new();
    predictions.insert("KNN".to_string(), PredictionValue::Score(0.0));
    predictions.insert(
        "RandomForest".to_string(),
        PredictionValue::Label("Low".to_string()),
    );
    PredictionResponse {
        predictions: Some(predictions),
        average_score: Some(0.12),
        risk_category: Some("Low Risk".to_string()),
        summary: Some("## Outlook\nStable.".to_string()),
        error: None,
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<SessionId, SessionRecord>>>,
}

impl SessionRepository for MemoryRepository {
    fn insert(&self, record: SessionRecord) -> Result<SessionRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<SessionRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update<T, F>(&self, id: &SessionId, change: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut SessionRecord) -> T,
    {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        Ok(change(record))
    }

    fn remove(&self, id: &SessionId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}

pub(super) struct UnavailableRepository;

impl SessionRepository for UnavailableRepository {
    fn insert(&self, _record: SessionRecord) -> Result<SessionRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn fetch(&self, _id: &SessionId) -> Result<Option<SessionRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn update<T, F>(&self, _id: &SessionId, _change: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut SessionRecord) -> T,
    {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn remove(&self, _id: &SessionId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }
}

/// Scoring double that records every payload and replies with a fixed outcome.
#[derive(Clone)]
pub(super) struct StubScoring {
    reply: Arc<Mutex<Result<PredictionResponse, String>>>,
    delay: Duration,
    calls: Arc<Mutex<Vec<EncodedPayload>>>,
}

impl StubScoring {
    pub(super) fn replying(response: PredictionResponse) -> Self {
        Self {
            reply: Arc::new(Mutex::new(Ok(response))),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }

    pub(super) fn unreachable() -> Self {
        Self {
            reply: Arc::new(Mutex::new(Err("connection refused".to_string()))),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }

    pub(super) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(super) fn reply_with(&self, response: PredictionResponse) {
        *self.reply.lock().expect("stub mutex poisoned") = Ok(response);
    }

    pub(super) fn calls(&self) -> Vec<EncodedPayload> {
        self.calls.lock().expect("stub mutex poisoned").clone()
    }
}

impl ScoringService for StubScoring {
    fn predict(
        &self,
        payload: &EncodedPayload,
    ) -> impl Future<Output = Result<PredictionResponse, TransportError>> + Send {
        self.calls
            .lock()
            .expect("stub mutex poisoned")
            .push(payload.clone());
        let reply = self.reply.lock().expect("stub mutex poisoned").clone();
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply.map_err(TransportError::Network)
        }
    }
}

pub(super) type TestService = QuestionnaireService<MemoryRepository, StubScoring>;

pub(super) fn build_service(scoring: StubScoring) -> (TestService, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::default());
    let service = QuestionnaireService::new(
        repository.clone(),
        Arc::new(scoring),
        PresentationMode::Wizard,
        Duration::from_secs(5),
    );
    (service, repository)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}
