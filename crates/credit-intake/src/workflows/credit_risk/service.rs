use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::repository::{RepositoryError, SessionId, SessionRecord, SessionRepository};
use super::schema::{FieldDefinition, FieldKind, QuestionnaireSchema};
use super::encoding::EncodedPayload;
use super::session::{
    PresentationMode, QuestionnaireSession, SessionError, SessionState, WizardStep,
};
use super::submission::{
    submit, PredictionBundle, ScoringService, SubmissionResult, NETWORK_ERROR_MESSAGE,
};
use super::validation::ErrorMap;

/// Service owning live questionnaire sessions and the scoring seam.
pub struct QuestionnaireService<R, S> {
    repository: Arc<R>,
    scoring: Arc<S>,
    schema: QuestionnaireSchema,
    default_mode: PresentationMode,
    timeout: Duration,
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("cr-{id:06}"))
}

impl<R, S> QuestionnaireService<R, S>
where
    R: SessionRepository + 'static,
    S: ScoringService + 'static,
{
    pub fn new(
        repository: Arc<R>,
        scoring: Arc<S>,
        default_mode: PresentationMode,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            scoring,
            schema: QuestionnaireSchema::credit_risk(),
            default_mode,
            timeout,
        }
    }

    pub fn schema(&self) -> &QuestionnaireSchema {
        &self.schema
    }

    pub fn default_mode(&self) -> PresentationMode {
        self.default_mode
    }

    /// Every field in presentation order, for clients rendering the single form.
    pub fn schema_view(&self) -> Vec<FieldView> {
        self.schema
            .fields()
            .iter()
            .enumerate()
            .map(|(position, field)| FieldView::new(position, field))
            .collect()
    }

    /// Open a fresh session with an empty response store.
    pub fn start(
        &self,
        mode: Option<PresentationMode>,
    ) -> Result<SessionView, QuestionnaireServiceError> {
        let mode = mode.unwrap_or(self.default_mode);
        let record = SessionRecord {
            id: next_session_id(),
            started_at: Utc::now(),
            session: QuestionnaireSession::new(self.schema, mode),
        };
        let stored = self.repository.insert(record)?;
        info!(session_id = %stored.id.0, mode = mode.label(), "questionnaire session started");
        Ok(SessionView::from_record(&stored))
    }

    pub fn get(&self, id: &SessionId) -> Result<SessionView, QuestionnaireServiceError> {
        let record = self.repository.fetch(id)?.ok_or(RepositoryError::NotFound)?;
        Ok(SessionView::from_record(&record))
    }

    /// Record one raw answer. Blank input clears the field.
    pub fn answer(
        &self,
        id: &SessionId,
        field_id: &str,
        raw: &str,
    ) -> Result<SessionView, QuestionnaireServiceError> {
        self.repository
            .update(id, |record| record.session.enter(field_id, raw))??;
        self.get(id)
    }

    /// Wizard "Next". Stepping past the last field submits the answers.
    pub async fn advance(&self, id: &SessionId) -> Result<SessionView, QuestionnaireServiceError> {
        let payload = self.repository.update(
            id,
            |record| -> Result<Option<EncodedPayload>, SessionError> {
                match record.session.next()? {
                    WizardStep::Advanced { .. } => Ok(None),
                    WizardStep::ReadyToSubmit => record.session.begin_submission().map(Some),
                }
            },
        )??;

        if let Some(payload) = payload {
            self.dispatch(id, payload).await?;
        }
        self.get(id)
    }

    /// Wizard "Back".
    pub fn retreat(&self, id: &SessionId) -> Result<SessionView, QuestionnaireServiceError> {
        self.repository.update(id, |record| record.session.back())??;
        self.get(id)
    }

    /// Validate, encode, and send the session's answers.
    ///
    /// The store is only locked while marking the session pending and while recording the
    /// outcome; a second submit during the call observes the pending flag.
    pub async fn submit(&self, id: &SessionId) -> Result<SessionView, QuestionnaireServiceError> {
        let payload = self
            .repository
            .update(id, |record| record.session.begin_submission())??;

        self.dispatch(id, payload).await?;
        self.get(id)
    }

    /// Send the payload of a session already marked pending and record the outcome.
    ///
    /// The call and the bookkeeping run on their own task, so the pending flag is cleared even
    /// when the caller stops polling this future.
    async fn dispatch(
        &self,
        id: &SessionId,
        payload: EncodedPayload,
    ) -> Result<(), QuestionnaireServiceError> {
        let repository = Arc::clone(&self.repository);
        let scoring = Arc::clone(&self.scoring);
        let timeout = self.timeout;
        let task_id = id.clone();

        let task = tokio::spawn(async move {
            let result = submit(scoring.as_ref(), &payload, timeout).await;
            repository.update(&task_id, |record| record.session.finish_submission(result))
        });

        match task.await {
            Ok(recorded) => recorded?,
            Err(err) => {
                warn!(session_id = %id.0, error = %err, "scoring task did not complete");
                let failure = SubmissionResult::failure(NETWORK_ERROR_MESSAGE);
                self.repository
                    .update(id, |record| record.session.finish_submission(failure))?;
            }
        }
        Ok(())
    }

    /// Leave the error state with every answer preserved.
    pub fn retry(&self, id: &SessionId) -> Result<SessionView, QuestionnaireServiceError> {
        self.repository.update(id, |record| record.session.retry())??;
        self.get(id)
    }

    /// Drop a session; nothing is persisted past this point.
    pub fn discard(&self, id: &SessionId) -> Result<(), QuestionnaireServiceError> {
        self.repository.remove(id)?;
        info!(session_id = %id.0, "questionnaire session discarded");
        Ok(())
    }
}

/// Error raised by the questionnaire service.
#[derive(Debug, thiserror::Error)]
pub enum QuestionnaireServiceError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Client-facing description of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub position: usize,
    pub id: &'static str,
    pub prompt: &'static str,
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<&'static str>,
}

impl FieldView {
    pub fn new(position: usize, field: &'static FieldDefinition) -> Self {
        Self {
            position,
            id: field.id,
            prompt: field.prompt,
            kind: field.kind,
            options: field.kind.options(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

/// Snapshot of a session as returned by every questionnaire endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub mode: PresentationMode,
    pub state: &'static str,
    pub pending: bool,
    pub progress: Progress,
    pub current_field: Option<FieldView>,
    pub responses: BTreeMap<String, String>,
    pub errors: ErrorMap,
    pub result: Option<PredictionBundle>,
    pub error_message: Option<String>,
}

impl SessionView {
    pub fn from_record(record: &SessionRecord) -> Self {
        let session = &record.session;
        let schema = session.schema();

        let current_field = match session.state() {
            SessionState::Collecting { index } => {
                schema.get(*index).map(|field| FieldView::new(*index, field))
            }
            _ => None,
        };
        let (result, error_message) = match session.state() {
            SessionState::Submitted { result } => (Some(result.clone()), None),
            SessionState::Error { message } => (None, Some(message.clone())),
            _ => (None, None),
        };

        Self {
            session_id: record.id.clone(),
            started_at: record.started_at,
            mode: session.mode(),
            state: session.state().label(),
            pending: session.is_pending(),
            progress: Progress {
                answered: session.responses().len(),
                total: schema.len(),
            },
            current_field,
            responses: session
                .responses()
                .iter()
                .map(|(id, value)| (id.to_string(), value.display()))
                .collect(),
            errors: session.errors().clone(),
            result,
            error_message,
        }
    }
}
