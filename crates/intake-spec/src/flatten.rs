//! Flattening of the active question tree into a self-describing response list.
//!
//! The response list is the only thing a document renderer reads; it never needs the
//! original tree. Raw choice tokens are persisted, display labels are applied by the
//! consumer through [`AnswerLabels`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::answers::{AnswerMap, AnswerValue};
use crate::tree::{QuestionTree, TreeNode};
use crate::visibility::active_nodes;

/// Display text for a question that was shown but left unanswered.
pub const UNANSWERED_LABEL: &str = "Sem resposta";

/// Normalized answer of an entry; `Unanswered` is stored as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ResponseAnswer {
    Answered(String),
    Unanswered,
}

impl From<Option<String>> for ResponseAnswer {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(text) => ResponseAnswer::Answered(text),
            None => ResponseAnswer::Unanswered,
        }
    }
}

impl From<ResponseAnswer> for Option<String> {
    fn from(value: ResponseAnswer) -> Self {
        match value {
            ResponseAnswer::Answered(text) => Some(text),
            ResponseAnswer::Unanswered => None,
        }
    }
}

impl ResponseAnswer {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            ResponseAnswer::Answered(text) => Some(text),
            ResponseAnswer::Unanswered => None,
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, ResponseAnswer::Answered(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub question_id: String,
    pub question_text: String,
    pub answer: ResponseAnswer,
    /// Raw choice tokens in option order; empty for free-form kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
}

impl ResponseEntry {
    /// Display text with choice tokens mapped through `labels`.
    pub fn display(&self, labels: &AnswerLabels) -> String {
        match &self.answer {
            ResponseAnswer::Unanswered => UNANSWERED_LABEL.to_string(),
            ResponseAnswer::Answered(text) if self.tokens.is_empty() => text.clone(),
            ResponseAnswer::Answered(_) => self
                .tokens
                .iter()
                .map(|token| labels.label(token))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Ordered, write-once list of flattened answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseList(Vec<ResponseEntry>);

impl ResponseList {
    pub fn entries(&self) -> &[ResponseEntry] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResponseEntry> {
        self.0.iter()
    }

    pub fn get(&self, question_id: &str) -> Option<&ResponseEntry> {
        self.0.iter().find(|entry| entry.question_id == question_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a ResponseList {
    type Item = &'a ResponseEntry;
    type IntoIter = std::slice::Iter<'a, ResponseEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Token → display label dictionary applied by renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerLabels(BTreeMap<String, String>);

impl Default for AnswerLabels {
    fn default() -> Self {
        Self::empty()
            .with("yes", "Sim")
            .with("no", "Não")
            .with("na", "Não se aplica")
    }
}

impl AnswerLabels {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, token: impl Into<String>, label: impl Into<String>) -> Self {
        self.0.insert(token.into(), label.into());
        self
    }

    /// Labels taken from the option declarations of a tree, layered over `self`.
    pub fn with_tree_options(mut self, tree: &QuestionTree) -> Self {
        for idx in tree.indices() {
            for option in &tree.node(idx).options {
                self.0
                    .entry(option.value.clone())
                    .or_insert_with(|| option.label.clone());
            }
        }
        self
    }

    pub fn label<'a>(&'a self, token: &'a str) -> &'a str {
        self.0.get(token).map(String::as_str).unwrap_or(token)
    }
}

pub fn flatten(tree: &QuestionTree, answers: &AnswerMap) -> ResponseList {
    let entries = active_nodes(tree, answers)
        .into_iter()
        .map(|active| entry_for(active.node, answers.get(&active.node.id)))
        .collect();
    ResponseList(entries)
}

fn entry_for(node: &TreeNode, value: Option<&AnswerValue>) -> ResponseEntry {
    let (answer, tokens) = match value {
        None => (ResponseAnswer::Unanswered, Vec::new()),
        Some(AnswerValue::Text(text)) | Some(AnswerValue::LongText(text)) => {
            (ResponseAnswer::Answered(text.clone()), Vec::new())
        }
        Some(AnswerValue::Number(number)) => {
            (ResponseAnswer::Answered(format_number(*number)), Vec::new())
        }
        Some(AnswerValue::Single(token)) => {
            (ResponseAnswer::Answered(token.clone()), vec![token.clone()])
        }
        Some(AnswerValue::Multi(selected)) => {
            let tokens = ordered_tokens(node, selected);
            if tokens.is_empty() {
                (ResponseAnswer::Unanswered, Vec::new())
            } else {
                (ResponseAnswer::Answered(tokens.join(", ")), tokens)
            }
        }
    };

    ResponseEntry {
        question_id: node.id.clone(),
        question_text: node.text.clone(),
        answer,
        tokens,
    }
}

// Declared option order first; tokens the node does not declare keep answer order.
fn ordered_tokens(node: &TreeNode, selected: &[String]) -> Vec<String> {
    let mut tokens: Vec<String> = node
        .option_values()
        .filter(|value| selected.iter().any(|token| token == value))
        .map(str::to_string)
        .collect();
    for token in selected {
        if !node.has_option(token) && !tokens.contains(token) {
            tokens.push(token.clone());
        }
    }
    tokens
}

pub(crate) fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}
