//! Credit-risk questionnaire: schema, response capture, validation, feature encoding, and
//! submission to the remote scoring service, driven by a wizard or single-form state machine.

pub mod encoding;
pub mod repository;
pub mod responses;
pub mod router;
pub mod schema;
pub mod service;
pub mod session;
pub mod submission;
pub mod validation;

#[cfg(test)]
mod tests;

pub use encoding::{encode, occupation_key, EncodedPayload};
pub use repository::{RepositoryError, SessionId, SessionRecord, SessionRepository};
pub use responses::{
    raw_answer, BinaryAnswer, Gender, Occupation, ResponseStore, ResponseValue,
};
pub use router::questionnaire_router;
pub use schema::{
    Agency, FieldDefinition, FieldKind, InputError, QuestionnaireSchema, SchemaError, ScoreRange,
    OCCUPATIONS,
};
pub use service::{FieldView, QuestionnaireService, QuestionnaireServiceError, SessionView};
pub use session::{PresentationMode, QuestionnaireSession, SessionError, SessionState, WizardStep};
pub use submission::{
    submit, HttpScoringClient, PredictionBundle, PredictionResponse, PredictionValue,
    ScoringService, SubmissionResult, TransportError,
};
pub use validation::{certify, CompleteResponses, EntryRejection, ErrorMap};
