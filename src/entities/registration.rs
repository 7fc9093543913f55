// 📝 Registration Entity - Public submissions against a program form
//
// Answers arrive as free-form JSON. They are validated into a tagged union
// once, at the boundary: a fixed-schema `_fixed` block plus an open map of
// question id → text or list of texts.

use crate::error::AdminError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved key holding the fixed identity fields
pub const FIXED_KEY: &str = "_fixed";

/// Placeholder shown for missing answers in admin tables
pub const MISSING_PLACEHOLDER: &str = "-";

// ============================================================================
// ANSWER VALUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    List(Vec<String>),
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.is_empty(),
            AnswerValue::List(items) => items.is_empty(),
        }
    }

    /// Multi-valued answers are joined with a comma
    pub fn joined(&self) -> String {
        match self {
            AnswerValue::Text(text) => text.clone(),
            AnswerValue::List(items) => items.join(", "),
        }
    }
}

// ============================================================================
// FIXED ANSWERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedField {
    Name,
    Mobile,
    PanchayathId,
    PanchayathName,
    Ward,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panchayath_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panchayath_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,
}

impl FixedAnswers {
    pub fn get(&self, field: FixedField) -> Option<&str> {
        let value = match field {
            FixedField::Name => &self.name,
            FixedField::Mobile => &self.mobile,
            FixedField::PanchayathId => &self.panchayath_id,
            FixedField::PanchayathName => &self.panchayath_name,
            FixedField::Ward => &self.ward,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self, AdminError> {
        let field = |key: &str| -> Result<Option<String>, AdminError> {
            match object.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => scalar_to_string(value)
                    .map(Some)
                    .ok_or_else(|| AdminError::validation(format!("_fixed.{} must be a scalar", key))),
            }
        };

        Ok(FixedAnswers {
            name: field("name")?,
            mobile: field("mobile")?,
            panchayath_id: field("panchayath_id")?,
            panchayath_name: field("panchayath_name")?,
            ward: field("ward")?,
        })
    }
}

// ============================================================================
// REGISTRATION ANSWERS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct RegistrationAnswers {
    pub fixed: Option<FixedAnswers>,
    pub custom: BTreeMap<String, AnswerValue>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl TryFrom<Value> for RegistrationAnswers {
    type Error = AdminError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let object = match value {
            Value::Null => return Ok(RegistrationAnswers::default()),
            Value::Object(object) => object,
            _ => return Err(AdminError::validation("answers must be a JSON object")),
        };

        let mut answers = RegistrationAnswers::default();

        for (key, value) in object {
            if key == FIXED_KEY {
                answers.fixed = match value {
                    Value::Null => None,
                    Value::Object(ref fixed) => Some(FixedAnswers::from_object(fixed)?),
                    _ => return Err(AdminError::validation("_fixed must be an object")),
                };
                continue;
            }

            let answer = match value {
                Value::Null => continue,
                Value::Array(items) => {
                    let mut list = Vec::with_capacity(items.len());
                    for item in items.iter().filter(|i| !i.is_null()) {
                        let text = scalar_to_string(item).ok_or_else(|| {
                            AdminError::validation(format!("answer {} has a nested value", key))
                        })?;
                        list.push(text);
                    }
                    AnswerValue::List(list)
                }
                Value::Object(_) => {
                    return Err(AdminError::validation(format!("answer {} has a nested object", key)))
                }
                scalar => AnswerValue::Text(scalar_to_string(&scalar).unwrap_or_default()),
            };

            answers.custom.insert(key, answer);
        }

        Ok(answers)
    }
}

impl From<RegistrationAnswers> for Value {
    fn from(answers: RegistrationAnswers) -> Self {
        let mut object = Map::new();
        if let Some(fixed) = answers.fixed {
            object.insert(FIXED_KEY.to_string(), serde_json::to_value(fixed).unwrap_or(Value::Null));
        }
        for (key, answer) in answers.custom {
            let value = match answer {
                AnswerValue::Text(text) => Value::String(text),
                AnswerValue::List(items) => Value::Array(items.into_iter().map(Value::String).collect()),
            };
            object.insert(key, value);
        }
        Value::Object(object)
    }
}

impl RegistrationAnswers {
    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.custom.get(question_id)
    }

    fn text(&self, key: &str) -> Option<&str> {
        match self.custom.get(key) {
            Some(AnswerValue::Text(text)) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    /// Spreadsheet cell: joined answer, or empty when missing
    pub fn cell(&self, question_id: &str) -> String {
        self.get(question_id)
            .filter(|a| !a.is_empty())
            .map(AnswerValue::joined)
            .unwrap_or_default()
    }

    /// Table display: joined answer, or "-" when missing
    pub fn display(&self, question_id: &str) -> String {
        match self.get(question_id).filter(|a| !a.is_empty()) {
            Some(answer) => answer.joined(),
            None => MISSING_PLACEHOLDER.to_string(),
        }
    }

    pub fn fixed_display(&self, field: FixedField) -> String {
        self.fixed
            .as_ref()
            .and_then(|f| f.get(field))
            .unwrap_or(MISSING_PLACEHOLDER)
            .to_string()
    }

    /// Registrant display name: full_name, then name, then "Unknown"
    pub fn registrant_name(&self) -> String {
        self.text("full_name")
            .or_else(|| self.text("name"))
            .or_else(|| self.fixed.as_ref().and_then(|f| f.get(FixedField::Name)))
            .unwrap_or("Unknown")
            .to_string()
    }

    pub fn panchayath_id(&self) -> Option<&str> {
        self.fixed.as_ref().and_then(|f| f.get(FixedField::PanchayathId))
    }
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub program_id: String,
    pub answers: RegistrationAnswers,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fixed_and_custom() {
        let answers = RegistrationAnswers::try_from(json!({
            "_fixed": {"name": "Asha", "mobile": 9876543210u64, "ward": 4, "panchayath_id": "p1"},
            "q1": "Yes",
            "q2": ["Rice", "Coconut"],
            "q3": null
        }))
        .unwrap();

        let fixed = answers.fixed.as_ref().unwrap();
        assert_eq!(fixed.name.as_deref(), Some("Asha"));
        assert_eq!(fixed.mobile.as_deref(), Some("9876543210"));
        assert_eq!(fixed.ward.as_deref(), Some("4"));
        assert_eq!(answers.get("q1"), Some(&AnswerValue::Text("Yes".into())));
        assert_eq!(answers.cell("q2"), "Rice, Coconut");
        assert!(answers.get("q3").is_none());
        assert_eq!(answers.panchayath_id(), Some("p1"));
    }

    #[test]
    fn test_rejects_nested_object() {
        let err = RegistrationAnswers::try_from(json!({"q1": {"deep": true}})).unwrap_err();
        assert!(matches!(err, AdminError::Validation(_)));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(RegistrationAnswers::try_from(json!("text")).is_err());
        assert!(RegistrationAnswers::try_from(json!({"_fixed": [1]})).is_err());
    }

    #[test]
    fn test_null_answers_are_empty() {
        let answers = RegistrationAnswers::try_from(Value::Null).unwrap();
        assert!(answers.fixed.is_none());
        assert!(answers.custom.is_empty());
    }

    #[test]
    fn test_cell_and_display_placeholders() {
        let answers = RegistrationAnswers::try_from(json!({"q1": "", "q2": []})).unwrap();
        assert_eq!(answers.cell("q1"), "");
        assert_eq!(answers.cell("missing"), "");
        assert_eq!(answers.display("q2"), "-");
        assert_eq!(answers.fixed_display(FixedField::Mobile), "-");
    }

    #[test]
    fn test_registrant_name_fallbacks() {
        let full = RegistrationAnswers::try_from(json!({"full_name": "Meera", "name": "M"})).unwrap();
        assert_eq!(full.registrant_name(), "Meera");

        let name = RegistrationAnswers::try_from(json!({"name": "Lakshmi"})).unwrap();
        assert_eq!(name.registrant_name(), "Lakshmi");

        let fixed = RegistrationAnswers::try_from(json!({"_fixed": {"name": "Devi"}})).unwrap();
        assert_eq!(fixed.registrant_name(), "Devi");

        let none = RegistrationAnswers::try_from(json!({})).unwrap();
        assert_eq!(none.registrant_name(), "Unknown");
    }

    #[test]
    fn test_serde_through_registration() {
        let registration: Registration = serde_json::from_value(json!({
            "id": "r1",
            "program_id": "p1",
            "answers": {"_fixed": {"name": "Asha"}, "q1": ["a", "b"]},
            "created_at": "2026-01-05T10:00:00Z"
        }))
        .unwrap();

        let back = serde_json::to_value(&registration).unwrap();
        assert_eq!(back["answers"]["_fixed"]["name"], "Asha");
        assert_eq!(back["answers"]["q1"], json!(["a", "b"]));
    }
}
