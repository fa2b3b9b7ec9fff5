use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::encoding::{encode, EncodedPayload};
use super::responses::ResponseStore;
use super::schema::{FieldDefinition, QuestionnaireSchema, SchemaError};
use super::submission::{submit, PredictionBundle, ScoringService, SubmissionResult};
use super::validation::{
    certify, check_entry, revalidate_dependents, ErrorMap, REQUIRED_MESSAGE,
};

/// How the questionnaire is presented: one field at a time or all at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationMode {
    #[default]
    Wizard,
    SinglePage,
}

impl PresentationMode {
    pub const fn label(self) -> &'static str {
        match self {
            PresentationMode::Wizard => "wizard",
            PresentationMode::SinglePage => "single_page",
        }
    }
}

impl fmt::Display for PresentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PresentationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wizard" => Ok(PresentationMode::Wizard),
            "single_page" | "single-page" | "form" => Ok(PresentationMode::SinglePage),
            other => Err(format!("unknown presentation mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Wizard: only the field at `index` is shown.
    Collecting { index: usize },
    /// Single form: every field is shown.
    Filling,
    /// Terminal.
    Submitted { result: PredictionBundle },
    /// Transport or service failure; retry returns to collection with answers kept.
    Error { message: String },
}

impl SessionState {
    pub const fn label(&self) -> &'static str {
        match self {
            SessionState::Collecting { .. } => "collecting",
            SessionState::Filling => "filling",
            SessionState::Submitted { .. } => "submitted",
            SessionState::Error { .. } => "error",
        }
    }
}

/// Result of a wizard "Next".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Advanced { index: usize },
    ReadyToSubmit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("{message}")]
    Rejected { field: String, message: String },
    #[error("{} field(s) still need an answer", .0.len())]
    Incomplete(ErrorMap),
    #[error("a submission is already in progress")]
    SubmissionPending,
    #[error("the questionnaire has already been submitted")]
    Closed,
    #[error("'{0}' has not been reached yet")]
    FieldNotReached(String),
    #[error("this action is only available in wizard mode")]
    NotInWizardMode,
    #[error("the last submission failed; retry before continuing")]
    AwaitingRetry,
    #[error("there is no failed submission to retry")]
    NothingToRetry,
}

/// One user's pass through the questionnaire.
#[derive(Debug, Clone)]
pub struct QuestionnaireSession {
    schema: QuestionnaireSchema,
    mode: PresentationMode,
    state: SessionState,
    responses: ResponseStore,
    errors: ErrorMap,
    pending: bool,
    furthest_index: usize,
}

impl QuestionnaireSession {
    pub fn new(schema: QuestionnaireSchema, mode: PresentationMode) -> Self {
        let state = match mode {
            PresentationMode::Wizard => SessionState::Collecting { index: 0 },
            PresentationMode::SinglePage => SessionState::Filling,
        };
        Self {
            schema,
            mode,
            state,
            responses: ResponseStore::new(),
            errors: ErrorMap::new(),
            pending: false,
            furthest_index: 0,
        }
    }

    pub fn schema(&self) -> &QuestionnaireSchema {
        &self.schema
    }

    pub fn mode(&self) -> PresentationMode {
        self.mode
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The field the wizard is showing, if any.
    pub fn current_field(&self) -> Option<&'static FieldDefinition> {
        match self.state {
            SessionState::Collecting { index } => self.schema.get(index),
            _ => None,
        }
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.pending {
            return Err(SessionError::SubmissionPending);
        }
        match self.state {
            SessionState::Submitted { .. } => Err(SessionError::Closed),
            SessionState::Error { .. } => Err(SessionError::AwaitingRetry),
            SessionState::Collecting { .. } | SessionState::Filling => Ok(()),
        }
    }

    /// Record raw input for a field. Rejected input never reaches the store.
    pub fn enter(&mut self, field_id: &str, raw: &str) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let field = self.schema.field(field_id)?;

        if self.mode == PresentationMode::Wizard {
            let position = self.schema.position(field.id).unwrap_or(usize::MAX);
            if position > self.furthest_index {
                return Err(SessionError::FieldNotReached(field.id.to_string()));
            }
        }

        let value = match field.kind.normalize(raw) {
            Ok(value) => value,
            Err(err) => return Err(self.reject(field.id, err.to_string())),
        };

        if let Some(value) = &value {
            if let Err(rejection) = check_entry(field, value, &self.responses) {
                return Err(self.reject(field.id, rejection.to_string()));
            }
        }

        self.responses.set(field.id, value);
        self.errors.remove(field.id);
        let dependent_errors = revalidate_dependents(&self.schema, field.id, &mut self.responses);
        self.errors.extend(dependent_errors);
        Ok(())
    }

    fn reject(&mut self, field_id: &str, message: String) -> SessionError {
        debug!(field = field_id, %message, "entry rejected");
        self.errors.insert(field_id.to_string(), message.clone());
        SessionError::Rejected {
            field: field_id.to_string(),
            message,
        }
    }

    /// Wizard "Next": advance only past a field that holds an accepted value.
    pub fn next(&mut self) -> Result<WizardStep, SessionError> {
        self.ensure_editable()?;
        let SessionState::Collecting { index } = self.state else {
            return Err(SessionError::NotInWizardMode);
        };
        let field = self
            .schema
            .get(index)
            .ok_or_else(|| SchemaError::UnknownField(format!("#{index}")))?;

        if !self.responses.is_set(field.id) {
            self.errors
                .entry(field.id.to_string())
                .or_insert_with(|| REQUIRED_MESSAGE.to_string());
            let mut missing = ErrorMap::new();
            missing.insert(field.id.to_string(), REQUIRED_MESSAGE.to_string());
            return Err(SessionError::Incomplete(missing));
        }

        if index + 1 < self.schema.len() {
            let next = index + 1;
            self.state = SessionState::Collecting { index: next };
            self.furthest_index = self.furthest_index.max(next);
            Ok(WizardStep::Advanced { index: next })
        } else {
            Ok(WizardStep::ReadyToSubmit)
        }
    }

    /// Wizard "Back": step to the previous field. Answers are kept.
    pub fn back(&mut self) -> Result<usize, SessionError> {
        self.ensure_editable()?;
        let SessionState::Collecting { index } = self.state else {
            return Err(SessionError::NotInWizardMode);
        };
        let previous = index.saturating_sub(1);
        self.state = SessionState::Collecting { index: previous };
        Ok(previous)
    }

    /// Run the completeness gate, encode, and mark the session pending.
    ///
    /// The caller must hand the outcome back through [`finish_submission`](Self::finish_submission).
    pub fn begin_submission(&mut self) -> Result<EncodedPayload, SessionError> {
        self.ensure_editable()?;

        let payload = match certify(&self.schema, &self.responses) {
            Ok(complete) => encode(&complete),
            Err(missing) => {
                self.errors.extend(missing.clone());
                return Err(SessionError::Incomplete(missing));
            }
        };

        self.pending = true;
        info!(
            mode = self.mode.label(),
            features = payload.features().len(),
            "questionnaire submission started"
        );
        Ok(payload)
    }

    pub fn finish_submission(&mut self, result: SubmissionResult) {
        self.pending = false;
        self.state = match result {
            SubmissionResult::Success(bundle) => {
                info!(risk_category = %bundle.risk_category, "questionnaire submitted");
                SessionState::Submitted { result: bundle }
            }
            SubmissionResult::Failure { message } => {
                info!(%message, "questionnaire submission failed");
                SessionState::Error { message }
            }
        };
    }

    /// Validate, encode, and send in one step for single-owner callers.
    pub async fn submit_to<S>(
        &mut self,
        service: &S,
        timeout: Duration,
    ) -> Result<&SessionState, SessionError>
    where
        S: ScoringService,
    {
        let payload = self.begin_submission()?;
        let result = submit(service, &payload, timeout).await;
        self.finish_submission(result);
        Ok(&self.state)
    }

    /// Leave the error state, keeping every answer.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        if self.pending {
            return Err(SessionError::SubmissionPending);
        }
        match self.state {
            SessionState::Error { .. } => {
                self.state = match self.mode {
                    PresentationMode::Wizard => SessionState::Collecting {
                        index: self.furthest_index,
                    },
                    PresentationMode::SinglePage => SessionState::Filling,
                };
                Ok(())
            }
            SessionState::Submitted { .. } => Err(SessionError::Closed),
            _ => Err(SessionError::NothingToRetry),
        }
    }
}
