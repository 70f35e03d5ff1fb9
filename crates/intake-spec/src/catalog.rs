use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::{ValidationRuleSet, compile};
use crate::spec::questionnaire::Questionnaire;
use crate::tree::{QuestionTree, SpecError};

/// Bundled imaging intake definition.
pub const TOMOGRAFIA_DEFINITION: &str = include_str!("../definitions/tomografia.json");

/// A questionnaire definition compiled once into its rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuestionnaire {
    pub id: String,
    pub title: String,
    pub icon: Option<String>,
    rules: ValidationRuleSet,
}

impl CompiledQuestionnaire {
    pub fn compile(definition: &Questionnaire) -> Result<Self, SpecError> {
        Ok(Self {
            id: definition.id.clone(),
            title: definition.title.clone(),
            icon: definition.icon.clone(),
            rules: compile(&definition.questions)?,
        })
    }

    pub fn rules(&self) -> &ValidationRuleSet {
        &self.rules
    }

    pub fn tree(&self) -> &QuestionTree {
        self.rules.tree()
    }
}

/// Questionnaires available to a session, keyed by id. Definitions are static
/// configuration, so each one is compiled exactly once here and shared.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, Arc<CompiledQuestionnaire>>,
}

impl Catalog {
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = Questionnaire>,
    ) -> Result<Self, SpecError> {
        let mut entries = BTreeMap::new();
        for definition in definitions {
            if entries.contains_key(&definition.id) {
                return Err(SpecError::DuplicateQuestionnaire(definition.id));
            }
            let compiled = CompiledQuestionnaire::compile(&definition)?;
            entries.insert(definition.id, Arc::new(compiled));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledQuestionnaire>> {
        self.entries.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The bundled tomografia definition, parsed.
pub fn builtin_tomografia() -> Result<Questionnaire, serde_json::Error> {
    Questionnaire::from_json(TOMOGRAFIA_DEFINITION)
}
