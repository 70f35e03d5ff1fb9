use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::spec::question::QuestionKind;
use crate::tree::{QuestionTree, TreeNode};

/// A typed answer, tagged by the kind of question it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    LongText(String),
    Number(f64),
    Single(String),
    Multi(Vec<String>),
}

impl AnswerValue {
    pub fn kind(&self) -> QuestionKind {
        match self {
            AnswerValue::Text(_) => QuestionKind::Text,
            AnswerValue::LongText(_) => QuestionKind::LongText,
            AnswerValue::Number(_) => QuestionKind::Number,
            AnswerValue::Single(_) => QuestionKind::SingleChoice,
            AnswerValue::Multi(_) => QuestionKind::MultiChoice,
        }
    }

    /// Scalar answers match by equality, multi-choice answers by membership.
    pub fn matches_trigger(&self, trigger: &str) -> bool {
        match self {
            AnswerValue::Text(text) | AnswerValue::LongText(text) | AnswerValue::Single(text) => {
                text == trigger
            }
            AnswerValue::Number(number) => trigger
                .trim()
                .parse::<f64>()
                .map(|parsed| parsed == *number)
                .unwrap_or(false),
            AnswerValue::Multi(values) => values.iter().any(|value| value == trigger),
        }
    }

    /// Plain JSON shape as the UI layer sends it.
    pub fn to_json(&self) -> Value {
        match self {
            AnswerValue::Text(text) | AnswerValue::LongText(text) | AnswerValue::Single(text) => {
                Value::String(text.clone())
            }
            AnswerValue::Number(number) => Number::from_f64(*number)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AnswerValue::Multi(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("unknown question '{0}'")]
    UnknownQuestion(String),
    #[error("answer for '{id}' does not match question type {expected}")]
    TypeMismatch { id: String, expected: QuestionKind },
    #[error("'{value}' is not an option of question '{id}'")]
    InvalidOption { id: String, value: String },
    #[error("question '{0}' is hidden by the current answers")]
    Inactive(String),
    #[error("answers must be a JSON object")]
    NotAnObject,
}

/// Sparse mapping from question id to its current answer. Absent key means unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerMap {
    values: BTreeMap<String, AnswerValue>,
}

impl AnswerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from a plain JSON object, coercing each entry through [`Self::set_answer`].
    pub fn from_json(tree: &QuestionTree, answers: &Value) -> Result<Self, AnswerError> {
        let object = match answers {
            Value::Object(object) => object,
            Value::Null => return Ok(Self::new()),
            _ => return Err(AnswerError::NotAnObject),
        };
        let mut map = Self::new();
        for (id, raw) in object {
            map.set_answer(tree, id, raw)?;
        }
        Ok(map)
    }

    pub fn to_json(&self) -> Value {
        let object: Map<String, Value> = self
            .values
            .iter()
            .map(|(id, value)| (id.clone(), value.to_json()))
            .collect();
        Value::Object(object)
    }

    /// Applies one edit from the UI layer. Type-mismatched input is rejected and the
    /// map is left unchanged; `null`, empty strings and empty lists clear the answer.
    pub fn set_answer(
        &mut self,
        tree: &QuestionTree,
        id: &str,
        raw: &Value,
    ) -> Result<(), AnswerError> {
        let node = tree
            .get(id)
            .ok_or_else(|| AnswerError::UnknownQuestion(id.to_string()))?;
        match coerce(node, raw)? {
            Some(value) => {
                self.values.insert(id.to_string(), value);
            }
            None => {
                self.values.remove(id);
            }
        }
        Ok(())
    }

    /// Inserts an already typed value without consulting a tree.
    pub fn insert(&mut self, id: impl Into<String>, value: AnswerValue) {
        self.values.insert(id.into(), value);
    }

    pub fn remove(&mut self, id: &str) -> Option<AnswerValue> {
        self.values.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&AnswerValue> {
        self.values.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnswerValue)> {
        self.values.iter().map(|(id, value)| (id.as_str(), value))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &AnswerValue) -> bool) {
        self.values.retain(|id, value| keep(id, value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn coerce(node: &TreeNode, raw: &Value) -> Result<Option<AnswerValue>, AnswerError> {
    let mismatch = || AnswerError::TypeMismatch {
        id: node.id.clone(),
        expected: node.kind,
    };
    if raw.is_null() {
        return Ok(None);
    }

    match node.kind {
        QuestionKind::Text | QuestionKind::LongText => {
            let text = raw.as_str().ok_or_else(mismatch)?;
            if text.trim().is_empty() {
                return Ok(None);
            }
            Ok(Some(if node.kind == QuestionKind::Text {
                AnswerValue::Text(text.to_string())
            } else {
                AnswerValue::LongText(text.to_string())
            }))
        }
        QuestionKind::Number => match raw {
            Value::Number(number) => number
                .as_f64()
                .map(|value| Some(AnswerValue::Number(value)))
                .ok_or_else(mismatch),
            Value::String(text) if text.trim().is_empty() => Ok(None),
            Value::String(text) => text
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(|value| Some(AnswerValue::Number(value)))
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        QuestionKind::SingleChoice => {
            let token = raw.as_str().ok_or_else(mismatch)?;
            if token.is_empty() {
                return Ok(None);
            }
            ensure_option(node, token)?;
            Ok(Some(AnswerValue::Single(token.to_string())))
        }
        QuestionKind::MultiChoice => {
            let items = raw.as_array().ok_or_else(mismatch)?;
            let mut tokens: Vec<String> = Vec::with_capacity(items.len());
            for item in items {
                let token = item.as_str().ok_or_else(mismatch)?;
                ensure_option(node, token)?;
                if !tokens.iter().any(|existing| existing == token) {
                    tokens.push(token.to_string());
                }
            }
            if tokens.is_empty() {
                Ok(None)
            } else {
                Ok(Some(AnswerValue::Multi(tokens)))
            }
        }
    }
}

fn ensure_option(node: &TreeNode, token: &str) -> Result<(), AnswerError> {
    if node.has_option(token) {
        Ok(())
    } else {
        Err(AnswerError::InvalidOption {
            id: node.id.clone(),
            value: token.to_string(),
        })
    }
}
