use std::collections::BTreeMap;

use super::responses::{ResponseStore, ResponseValue};
use super::schema::{
    Agency, FieldDefinition, FieldKind, QuestionnaireSchema, ScoreRange, AGENCY_FIELD,
    CREDIT_SCORE_FIELD,
};

/// Field id to human readable message. Empty means valid.
pub type ErrorMap = BTreeMap<String, String>;

pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Why an entry was refused before reaching the store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntryRejection {
    #[error("Value cannot be negative.")]
    Negative,
    #[error("Invalid credit score for {agency}. Must be between {} and {}.", .range.min, .range.max)]
    OutsideAgencyRange { agency: Agency, range: ScoreRange },
}

/// Per-field check applied on change, before the value is stored.
///
/// Non-numeric kinds are already constrained to their option labels by normalization.
pub fn check_entry(
    field: &FieldDefinition,
    value: &ResponseValue,
    responses: &ResponseStore,
) -> Result<(), EntryRejection> {
    match field.kind {
        FieldKind::Numeric => {
            let Some(number) = value.as_number() else {
                return Ok(());
            };
            if number < 0.0 {
                return Err(EntryRejection::Negative);
            }
            if field.id == CREDIT_SCORE_FIELD {
                check_credit_score(number, responses)?;
            }
            Ok(())
        }
        FieldKind::Binary | FieldKind::GenderBinary | FieldKind::Agency | FieldKind::Occupation => {
            Ok(())
        }
    }
}

fn check_credit_score(score: f64, responses: &ResponseStore) -> Result<(), EntryRejection> {
    // Without an agency the range check waits until one is chosen.
    let Some(agency) = responses.get(AGENCY_FIELD).and_then(ResponseValue::as_agency) else {
        return Ok(());
    };
    let range = agency.score_range();
    if range.contains(score) {
        Ok(())
    } else {
        Err(EntryRejection::OutsideAgencyRange { agency, range })
    }
}

/// Fields whose validity depends on `field_id`.
pub fn dependents_of(field_id: &str) -> &'static [&'static str] {
    match field_id {
        AGENCY_FIELD => &[CREDIT_SCORE_FIELD],
        _ => &[],
    }
}

/// Re-run entry checks for every stored dependent of `changed`.
///
/// Dependents that no longer pass are removed from the store and reported, so the store never
/// holds a value its current context would reject.
pub fn revalidate_dependents(
    schema: &QuestionnaireSchema,
    changed: &str,
    responses: &mut ResponseStore,
) -> ErrorMap {
    let mut errors = ErrorMap::new();
    for dependent in dependents_of(changed) {
        let Ok(field) = schema.field(dependent) else {
            continue;
        };
        let Some(value) = responses.get(dependent).copied() else {
            continue;
        };
        if let Err(rejection) = check_entry(field, &value, responses) {
            responses.set(dependent, None);
            errors.insert(dependent.to_string(), rejection.to_string());
        }
    }
    errors
}

/// Completeness pass run before submission: one message per unanswered field.
pub fn completeness(schema: &QuestionnaireSchema, responses: &ResponseStore) -> ErrorMap {
    responses
        .missing(schema)
        .map(|id| (id.to_string(), REQUIRED_MESSAGE.to_string()))
        .collect()
}

/// Proof that every schema field holds an accepted value.
///
/// Only [`certify`] produces one, and the encoder accepts nothing else.
#[derive(Debug, Clone, Copy)]
pub struct CompleteResponses<'a> {
    schema: &'a QuestionnaireSchema,
    responses: &'a ResponseStore,
}

impl<'a> CompleteResponses<'a> {
    pub fn schema(&self) -> &'a QuestionnaireSchema {
        self.schema
    }

    pub fn responses(&self) -> &'a ResponseStore {
        self.responses
    }
}

/// Gate in front of encoding and submission.
pub fn certify<'a>(
    schema: &'a QuestionnaireSchema,
    responses: &'a ResponseStore,
) -> Result<CompleteResponses<'a>, ErrorMap> {
    let errors = completeness(schema, responses);
    if errors.is_empty() {
        Ok(CompleteResponses { schema, responses })
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> QuestionnaireSchema {
        QuestionnaireSchema::credit_risk()
    }

    fn with_agency(agency: Agency) -> ResponseStore {
        let mut store = ResponseStore::new();
        store.set(AGENCY_FIELD, Some(ResponseValue::Agency(agency)));
        store
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let schema = schema();
        let age = schema.field("age").expect("age field");
        let store = ResponseStore::new();
        assert_eq!(
            check_entry(age, &ResponseValue::Number(-3.0), &store),
            Err(EntryRejection::Negative)
        );
        assert_eq!(
            EntryRejection::Negative.to_string(),
            "Value cannot be negative."
        );
        assert!(check_entry(age, &ResponseValue::Number(0.0), &store).is_ok());
    }

    #[test]
    fn transunion_bounds_credit_score() {
        let schema = schema();
        let score = schema.field(CREDIT_SCORE_FIELD).expect("score field");
        let store = with_agency(Agency::TransUnion);

        let rejection = check_entry(score, &ResponseValue::Number(750.0), &store)
            .expect_err("750 exceeds TransUnion scale");
        assert_eq!(
            rejection.to_string(),
            "Invalid credit score for TransUnion. Must be between 0 and 710."
        );
        assert!(check_entry(score, &ResponseValue::Number(710.0), &store).is_ok());
        assert_eq!(
            check_entry(score, &ResponseValue::Number(-1.0), &store),
            Err(EntryRejection::Negative)
        );
    }

    #[test]
    fn range_check_waits_for_agency() {
        let schema = schema();
        let score = schema.field(CREDIT_SCORE_FIELD).expect("score field");
        assert!(check_entry(score, &ResponseValue::Number(990.0), &ResponseStore::new()).is_ok());
    }

    #[test]
    fn agency_change_evicts_out_of_range_score() {
        let schema = schema();
        let mut store = with_agency(Agency::Equifax);
        store.set(CREDIT_SCORE_FIELD, Some(ResponseValue::Number(900.0)));

        store.set(AGENCY_FIELD, Some(ResponseValue::Agency(Agency::TransUnion)));
        let errors = revalidate_dependents(&schema, AGENCY_FIELD, &mut store);

        assert!(store.get(CREDIT_SCORE_FIELD).is_none());
        assert!(errors[CREDIT_SCORE_FIELD].contains("TransUnion"));
    }

    #[test]
    fn agency_change_keeps_in_range_score() {
        let schema = schema();
        let mut store = with_agency(Agency::Equifax);
        store.set(CREDIT_SCORE_FIELD, Some(ResponseValue::Number(650.0)));

        store.set(AGENCY_FIELD, Some(ResponseValue::Agency(Agency::Experian)));
        let errors = revalidate_dependents(&schema, AGENCY_FIELD, &mut store);

        assert!(errors.is_empty());
        assert_eq!(
            store.get(CREDIT_SCORE_FIELD),
            Some(&ResponseValue::Number(650.0))
        );
    }

    #[test]
    fn certify_reports_every_missing_field() {
        let schema = schema();
        let mut store = ResponseStore::new();
        store.set("age", Some(ResponseValue::Number(40.0)));

        let errors = certify(&schema, &store).expect_err("incomplete");
        assert_eq!(errors.len(), schema.len() - 1);
        assert!(!errors.contains_key("age"));
        assert!(errors.values().all(|message| message == REQUIRED_MESSAGE));
    }
}
