use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::question::QuestionNode;

/// Top-level questionnaire definition, loaded once as static configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Questionnaire {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub questions: Vec<QuestionNode>,
}

impl Questionnaire {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// JSON Schema describing the definition file format.
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(Questionnaire);
        serde_json::to_value(schema).unwrap_or_default()
    }
}
