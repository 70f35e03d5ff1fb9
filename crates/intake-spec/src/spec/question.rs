use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input widget family of a question; drives answer typing and branch matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum QuestionKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "textarea", alias = "long_text")]
    LongText,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "radio", alias = "single_choice")]
    SingleChoice,
    #[serde(rename = "checkbox", alias = "multi_choice")]
    MultiChoice,
}

impl QuestionKind {
    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionKind::SingleChoice | QuestionKind::MultiChoice)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Text => "text",
            QuestionKind::LongText => "textarea",
            QuestionKind::Number => "number",
            QuestionKind::SingleChoice => "radio",
            QuestionKind::MultiChoice => "checkbox",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable option; `value` is the canonical answer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
    pub value: String,
}

impl QuestionOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Nested follow-up questions shown while the parent answer matches `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Branch {
    pub value: String,
    #[serde(default)]
    pub questions: Vec<QuestionNode>,
}

/// Flat-definition link from a top-level question to the parent it follows up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DependsOn {
    #[serde(alias = "questionId")]
    pub question_id: String,
    pub value: String,
}

/// A question as written in a definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionNode {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    #[serde(
        default,
        alias = "conditionalQuestions",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub conditional_questions: Vec<Branch>,
    #[serde(default, alias = "dependsOn", skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,
}

fn default_required() -> bool {
    true
}

impl QuestionNode {
    pub fn new(id: impl Into<String>, text: impl Into<String>, kind: QuestionKind) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            kind,
            required: true,
            options: Vec::new(),
            conditional_questions: Vec::new(),
            depends_on: None,
        }
    }

    pub fn with_options(mut self, options: Vec<QuestionOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_branch(mut self, value: impl Into<String>, questions: Vec<QuestionNode>) -> Self {
        self.conditional_questions.push(Branch {
            value: value.into(),
            questions,
        });
        self
    }

    pub fn depending_on(mut self, question_id: impl Into<String>, value: impl Into<String>) -> Self {
        self.depends_on = Some(DependsOn {
            question_id: question_id.into(),
            value: value.into(),
        });
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}
