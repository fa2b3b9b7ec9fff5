use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::responses::{BinaryAnswer, Gender, Occupation, ResponseValue};

/// Closed set of question kinds; rendering, validation, and encoding all match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Numeric,
    Binary,
    GenderBinary,
    Agency,
    Occupation,
}

impl FieldKind {
    /// Option labels offered to the user; empty for free numeric entry.
    pub fn options(self) -> Vec<&'static str> {
        match self {
            FieldKind::Numeric => Vec::new(),
            FieldKind::Binary => vec![BinaryAnswer::Yes.label(), BinaryAnswer::No.label()],
            FieldKind::GenderBinary => vec![Gender::Male.label(), Gender::Female.label()],
            FieldKind::Agency => Agency::ordered().iter().map(|a| a.label()).collect(),
            FieldKind::Occupation => OCCUPATIONS.to_vec(),
        }
    }

    /// Turn raw text input into a typed value. Blank input means "unset".
    pub fn normalize(self, raw: &str) -> Result<Option<ResponseValue>, InputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value = match self {
            FieldKind::Numeric => trimmed
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .map(ResponseValue::Number)
                .ok_or(InputError::NotANumber)?,
            FieldKind::Binary => match trimmed.to_ascii_lowercase().as_str() {
                "yes" | "y" | "1" => ResponseValue::Binary(BinaryAnswer::Yes),
                "no" | "n" | "0" => ResponseValue::Binary(BinaryAnswer::No),
                _ => return Err(InputError::NotAnOption { options: "Yes or No" }),
            },
            FieldKind::GenderBinary => match trimmed.to_ascii_lowercase().as_str() {
                "male" | "m" => ResponseValue::Gender(Gender::Male),
                "female" | "f" => ResponseValue::Gender(Gender::Female),
                _ => {
                    return Err(InputError::NotAnOption {
                        options: "Male or Female",
                    })
                }
            },
            FieldKind::Agency => trimmed
                .parse::<Agency>()
                .map(ResponseValue::Agency)
                .map_err(|_| InputError::NotAnOption {
                    options: "Experian, Equifax, or TransUnion",
                })?,
            FieldKind::Occupation => Occupation::parse(trimmed)
                .map(ResponseValue::Occupation)
                .ok_or(InputError::UnknownOccupation)?,
        };

        Ok(Some(value))
    }
}

/// Raw input that cannot be read as a value of the field's kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Please enter a number.")]
    NotANumber,
    #[error("Please choose {options}.")]
    NotAnOption { options: &'static str },
    #[error("Select one of the listed occupations.")]
    UnknownOccupation,
}

/// Credit reference agencies and the score scale each one reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Agency {
    Experian,
    Equifax,
    TransUnion,
}

impl Agency {
    pub const fn ordered() -> [Self; 3] {
        [Self::Experian, Self::Equifax, Self::TransUnion]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Experian => "Experian",
            Self::Equifax => "Equifax",
            Self::TransUnion => "TransUnion",
        }
    }

    pub const fn score_range(self) -> ScoreRange {
        match self {
            Self::Experian => ScoreRange { min: 0.0, max: 999.0 },
            Self::Equifax => ScoreRange {
                min: 0.0,
                max: 1000.0,
            },
            Self::TransUnion => ScoreRange { min: 0.0, max: 710.0 },
        }
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Agency {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ordered()
            .into_iter()
            .find(|agency| agency.label().eq_ignore_ascii_case(value.trim()))
            .ok_or(())
    }
}

/// Inclusive credit score bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

/// Occupation categories the scoring model was trained on, in feature order.
pub const OCCUPATIONS: [&str; 14] = [
    "Accountants",
    "Cleaning_staff",
    "Cooking_staff",
    "Drivers",
    "HR_staff",
    "IT_staff",
    "Laborers",
    "Managers",
    "Medicine_staff",
    "Private_service_staff",
    "Sales_staff",
    "Secretaries",
    "Security_staff",
    "Waiters_barmen_staff",
];

pub const AGENCY_FIELD: &str = "agency";
pub const CREDIT_SCORE_FIELD: &str = "credit_score";

/// One question of the questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDefinition {
    pub id: &'static str,
    pub prompt: &'static str,
    pub kind: FieldKind,
}

const fn field(id: &'static str, prompt: &'static str, kind: FieldKind) -> FieldDefinition {
    FieldDefinition { id, prompt, kind }
}

static CREDIT_RISK_FIELDS: [FieldDefinition; 14] = [
    field("age", "What is your age?", FieldKind::Numeric),
    field("owns_house", "Do you own a house?", FieldKind::Binary),
    field("owns_car", "Do you own a car?", FieldKind::Binary),
    field(
        AGENCY_FIELD,
        "Which agency provided your credit score?",
        FieldKind::Agency,
    ),
    field(CREDIT_SCORE_FIELD, "What is your credit score?", FieldKind::Numeric),
    field(
        "net_yearly_income",
        "What is your net yearly income?",
        FieldKind::Numeric,
    ),
    field(
        "credit_limit",
        "What is your total credit limit?",
        FieldKind::Numeric,
    ),
    field(
        "credit_limit_used",
        "What percentage of your credit limit have you used?",
        FieldKind::Numeric,
    ),
    field(
        "default_in_last_6months",
        "How many times have you defaulted in the last 6 months?",
        FieldKind::Numeric,
    ),
    field("gender", "What is your gender?", FieldKind::GenderBinary),
    field(
        "migrant_worker",
        "Are you a migrant worker?",
        FieldKind::Binary,
    ),
    field(
        "no_of_children",
        "How many children do you have?",
        FieldKind::Numeric,
    ),
    field(
        "no_of_days_employed",
        "How many days have you been employed?",
        FieldKind::Numeric,
    ),
    field("occupation", "Select your occupation", FieldKind::Occupation),
];

/// Ordered, immutable question list. Order drives the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionnaireSchema {
    fields: &'static [FieldDefinition],
}

impl QuestionnaireSchema {
    /// The credit-risk questionnaire.
    pub fn credit_risk() -> Self {
        Self {
            fields: &CREDIT_RISK_FIELDS,
        }
    }

    pub fn fields(&self) -> &'static [FieldDefinition] {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'static FieldDefinition> {
        self.fields.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.id == id)
    }

    pub fn field(&self, id: &str) -> Result<&'static FieldDefinition, SchemaError> {
        self.fields
            .iter()
            .find(|field| field.id == id)
            .ok_or_else(|| SchemaError::UnknownField(id.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
}
