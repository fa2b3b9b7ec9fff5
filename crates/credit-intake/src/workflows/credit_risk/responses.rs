use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use super::schema::{Agency, QuestionnaireSchema, OCCUPATIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryAnswer {
    Yes,
    No,
}

impl BinaryAnswer {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }
}

/// A label from the closed occupation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occupation(&'static str);

impl Occupation {
    /// Match a label case-insensitively; spaces stand in for underscores.
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().replace(' ', "_");
        OCCUPATIONS
            .iter()
            .find(|label| label.eq_ignore_ascii_case(&wanted))
            .map(|label| Self(*label))
    }

    pub fn label(self) -> &'static str {
        self.0
    }

    /// Human readable form, e.g. `Cleaning staff`.
    pub fn display_name(self) -> String {
        self.0.replace('_', " ")
    }
}

impl Serialize for Occupation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// A normalized answer. Absence from the store is the only representation of "unset".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Number(f64),
    Binary(BinaryAnswer),
    Gender(Gender),
    Agency(Agency),
    Occupation(Occupation),
}

impl ResponseValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResponseValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_agency(&self) -> Option<Agency> {
        match self {
            ResponseValue::Agency(agency) => Some(*agency),
            _ => None,
        }
    }

    /// The value as the user would have typed or selected it.
    pub fn display(&self) -> String {
        match self {
            ResponseValue::Number(value) => value.to_string(),
            ResponseValue::Binary(answer) => answer.label().to_string(),
            ResponseValue::Gender(gender) => gender.label().to_string(),
            ResponseValue::Agency(agency) => agency.label().to_string(),
            ResponseValue::Occupation(occupation) => occupation.label().to_string(),
        }
    }
}

/// Current answers keyed by field id; last write wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseStore {
    values: BTreeMap<String, ResponseValue>,
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the answer for `field_id`; `None` clears it.
    pub fn set(&mut self, field_id: &str, value: Option<ResponseValue>) {
        match value {
            Some(value) => {
                self.values.insert(field_id.to_string(), value);
            }
            None => {
                self.values.remove(field_id);
            }
        }
    }

    pub fn get(&self, field_id: &str) -> Option<&ResponseValue> {
        self.values.get(field_id)
    }

    pub fn is_set(&self, field_id: &str) -> bool {
        self.values.contains_key(field_id)
    }

    pub fn is_complete(&self, schema: &QuestionnaireSchema) -> bool {
        schema.fields().iter().all(|field| self.is_set(field.id))
    }

    /// Field ids in schema order that have no answer yet.
    pub fn missing<'a>(
        &'a self,
        schema: &'a QuestionnaireSchema,
    ) -> impl Iterator<Item = &'static str> + 'a {
        schema
            .fields()
            .iter()
            .filter(move |field| !self.is_set(field.id))
            .map(|field| field.id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResponseValue)> {
        self.values.iter().map(|(id, value)| (id.as_str(), value))
    }
}

/// Flatten a JSON answer into the raw text field normalization accepts.
///
/// `null` clears the field; booleans read as yes/no. Arrays and objects are not answers.
pub fn raw_answer(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("yes".to_string()),
        Value::Bool(false) => Some("no".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
