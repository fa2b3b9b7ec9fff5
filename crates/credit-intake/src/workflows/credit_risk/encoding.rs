use std::collections::BTreeMap;

use serde::Serialize;

use super::responses::{BinaryAnswer, Gender, ResponseValue};
use super::schema::{FieldKind, OCCUPATIONS};
use super::validation::CompleteResponses;

/// Feature map sent to the scoring service.
///
/// Numeric features and passthrough labels are flattened into one JSON object; both maps are
/// ordered so identical responses always serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncodedPayload {
    #[serde(flatten)]
    features: BTreeMap<String, f64>,
    #[serde(flatten)]
    passthrough: BTreeMap<String, String>,
}

impl EncodedPayload {
    pub fn features(&self) -> &BTreeMap<String, f64> {
        &self.features
    }

    pub fn feature(&self, key: &str) -> Option<f64> {
        self.features.get(key).copied()
    }

    /// String fields the model ignores but the service reads (the agency label).
    pub fn passthrough(&self) -> &BTreeMap<String, String> {
        &self.passthrough
    }
}

pub fn occupation_key(label: &str) -> String {
    format!("occupation_{label}")
}

/// Build the payload from a certified response set. Every field kind is handled here.
pub fn encode(complete: &CompleteResponses<'_>) -> EncodedPayload {
    let mut payload = EncodedPayload::default();
    let responses = complete.responses();

    for field in complete.schema().fields() {
        let value = responses.get(field.id);
        match field.kind {
            FieldKind::Numeric => {
                if let Some(number) = value.and_then(ResponseValue::as_number) {
                    payload.features.insert(field.id.to_string(), number);
                }
            }
            FieldKind::Binary => {
                if let Some(ResponseValue::Binary(answer)) = value {
                    let flag = match answer {
                        BinaryAnswer::Yes => 1.0,
                        BinaryAnswer::No => 0.0,
                    };
                    payload.features.insert(field.id.to_string(), flag);
                }
            }
            FieldKind::GenderBinary => {
                if let Some(ResponseValue::Gender(gender)) = value {
                    let flag = match gender {
                        Gender::Male => 1.0,
                        Gender::Female => 0.0,
                    };
                    payload.features.insert(field.id.to_string(), flag);
                }
            }
            FieldKind::Agency => {
                if let Some(agency) = value.and_then(ResponseValue::as_agency) {
                    payload
                        .passthrough
                        .insert(field.id.to_string(), agency.label().to_string());
                }
            }
            FieldKind::Occupation => {
                let selected = match value {
                    Some(ResponseValue::Occupation(occupation)) => Some(occupation.label()),
                    _ => None,
                };
                // No selection leaves every flag at zero.
                for label in OCCUPATIONS {
                    let flag = if Some(label) == selected { 1.0 } else { 0.0 };
                    payload.features.insert(occupation_key(label), flag);
                }
            }
        }
    }

    payload
}
