//! Session-scoped draft of one questionnaire fill.
//!
//! A session owns the answers being edited and, when editing a stored record, that
//! record's id. Nothing is shared between sessions; the draft only becomes a record
//! when the caller hands it to a store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::answers::{AnswerError, AnswerMap};
use crate::catalog::CompiledQuestionnaire;
use crate::consent::{Consent, ConsentError};
use crate::flatten::{ResponseAnswer, ResponseList, flatten};
use crate::record::{DocumentRecord, DocumentRecordDraft, RecordHeader, RecordId, Technicians};
use crate::spec::question::QuestionKind;
use crate::validate::{Recompute, ValidationFailed, recompute, validate};
use crate::visibility::{active_nodes, is_active};

#[derive(Debug, Error)]
pub enum DraftError {
    #[error(transparent)]
    Validation(#[from] ValidationFailed),
    #[error("consent is invalid: {0}")]
    Consent(#[from] ConsentError),
}

#[derive(Debug, Clone)]
pub struct IntakeSession {
    questionnaire: Arc<CompiledQuestionnaire>,
    answers: AnswerMap,
    record_id: Option<RecordId>,
    created_at: Option<DateTime<Utc>>,
    technicians: Technicians,
}

impl IntakeSession {
    pub fn new(questionnaire: Arc<CompiledQuestionnaire>) -> Self {
        Self {
            questionnaire,
            answers: AnswerMap::new(),
            record_id: None,
            created_at: None,
            technicians: Technicians::default(),
        }
    }

    /// Session seeded with answers already typed against this questionnaire. Answers of
    /// hidden questions are cleared.
    pub fn with_answers(questionnaire: Arc<CompiledQuestionnaire>, answers: AnswerMap) -> Self {
        let mut session = Self::new(questionnaire);
        session.replace_answers(answers);
        session
    }

    /// Reopens a stored record for editing. Entries whose question no longer exists
    /// in the definition are skipped.
    pub fn resume(
        questionnaire: Arc<CompiledQuestionnaire>,
        record: &DocumentRecord,
    ) -> Result<Self, AnswerError> {
        let mut session = Self::new(questionnaire);
        session.record_id = Some(record.id.clone());
        session.created_at = Some(record.created_at);
        session.technicians = record.technicians.clone();

        let tree = session.questionnaire.tree();
        for entry in &record.responses {
            let Some(node) = tree.get(&entry.question_id) else {
                continue;
            };
            let ResponseAnswer::Answered(text) = &entry.answer else {
                continue;
            };
            let raw = match node.kind {
                QuestionKind::MultiChoice => {
                    Value::Array(entry.tokens.iter().cloned().map(Value::String).collect())
                }
                QuestionKind::SingleChoice => Value::String(
                    entry.tokens.first().cloned().unwrap_or_else(|| text.clone()),
                ),
                _ => Value::String(text.clone()),
            };
            session.answers.set_answer(tree, &entry.question_id, &raw)?;
        }
        session.prune_inactive();
        Ok(session)
    }

    pub fn questionnaire(&self) -> &CompiledQuestionnaire {
        &self.questionnaire
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.record_id.as_ref()
    }

    pub fn technicians(&self) -> &Technicians {
        &self.technicians
    }

    /// Replaces whichever professionals are given, keeping the others.
    pub fn set_technicians(&mut self, technicians: Technicians) {
        if technicians.radiology_technician.is_some() {
            self.technicians.radiology_technician = technicians.radiology_technician;
        }
        if technicians.nursing_technician.is_some() {
            self.technicians.nursing_technician = technicians.nursing_technician;
        }
    }

    /// Applies one edit and re-evaluates visibility and validation. Answers of
    /// questions hidden by this edit are cleared, so a branch that is opened again
    /// starts unanswered. Edits to questions that are hidden right now are rejected.
    pub fn set_answer(&mut self, id: &str, raw: &Value) -> Result<Recompute<'_>, AnswerError> {
        let tree = self.questionnaire.tree();
        let idx = tree
            .index_of(id)
            .ok_or_else(|| AnswerError::UnknownQuestion(id.to_string()))?;
        if !is_active(tree, &self.answers, idx) {
            return Err(AnswerError::Inactive(id.to_string()));
        }
        self.answers.set_answer(tree, id, raw)?;
        self.prune_inactive();
        Ok(self.recompute())
    }

    /// Swaps in a whole answer set, keeping the record being edited.
    pub fn replace_answers(&mut self, answers: AnswerMap) {
        self.answers = answers;
        self.prune_inactive();
    }

    pub fn recompute(&self) -> Recompute<'_> {
        recompute(self.questionnaire.rules(), &self.answers)
    }

    /// The flattened responses, or the report of what blocks submission.
    pub fn responses(&self) -> Result<ResponseList, ValidationFailed> {
        validate(self.questionnaire.rules(), &self.answers).into_result()?;
        Ok(flatten(self.questionnaire.tree(), &self.answers))
    }

    /// Commit boundary: validates answers and consent and produces the draft to store,
    /// together with the id of the record being edited, if any.
    pub fn into_draft(
        self,
        header: RecordHeader,
        consent: Consent,
        now: DateTime<Utc>,
    ) -> Result<(Option<RecordId>, DocumentRecordDraft), DraftError> {
        let responses = self.responses()?;
        let consent = consent.normalized()?;
        let draft = DocumentRecordDraft {
            created_at: self.created_at.unwrap_or(now),
            header,
            responses,
            consent,
            questionnaire_id: self.questionnaire.id.clone(),
            technicians: self.technicians,
        };
        Ok((self.record_id, draft))
    }

    fn prune_inactive(&mut self) {
        let tree = self.questionnaire.tree();
        let active = active_nodes(tree, &self.answers);
        let active_ids: HashSet<&str> = active.iter().map(|node| node.id()).collect();
        let mut pruned = Vec::new();
        self.answers.retain(|id, _| {
            let keep = !tree.contains(id) || active_ids.contains(id);
            if !keep {
                pruned.push(id.to_string());
            }
            keep
        });
        if !pruned.is_empty() {
            tracing::debug!(
                questionnaire = %self.questionnaire.id,
                pruned = ?pruned,
                "cleared answers of hidden questions"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::catalog::{Catalog, builtin_tomografia};
    use crate::record::Technician;
    use crate::spec::{QuestionNode, QuestionOption, Questionnaire};

    fn session() -> IntakeSession {
        let catalog = Catalog::from_definitions([builtin_tomografia().unwrap()]).unwrap();
        IntakeSession::new(catalog.get("tomografia").unwrap())
    }

    fn yes_no(id: &str, text: &str) -> QuestionNode {
        QuestionNode::new(id, text, QuestionKind::SingleChoice).with_options(vec![
            QuestionOption::new(format!("{id}_sim"), "Sim", "sim"),
            QuestionOption::new(format!("{id}_nao"), "Não", "nao"),
        ])
    }

    // cirurgia -> sim -> complicacao -> sim -> qual
    fn nested_session() -> IntakeSession {
        let definition = Questionnaire {
            id: "aninhado".into(),
            title: "Aninhado".into(),
            icon: None,
            description: None,
            questions: vec![yes_no("cirurgia", "Cirurgia?").with_branch(
                "sim",
                vec![yes_no("complicacao", "Complicação?").with_branch(
                    "sim",
                    vec![QuestionNode::new("qual", "Qual?", QuestionKind::Text)],
                )],
            )],
        };
        IntakeSession::new(Arc::new(CompiledQuestionnaire::compile(&definition).unwrap()))
    }

    #[test]
    fn closing_a_grandparent_clears_the_whole_branch() {
        let mut session = nested_session();
        session.set_answer("cirurgia", &json!("sim")).unwrap();
        session.set_answer("complicacao", &json!("sim")).unwrap();
        let recompute = session.set_answer("qual", &json!("Infecção")).unwrap();
        assert_eq!(recompute.active_ids(), vec!["cirurgia", "complicacao", "qual"]);

        let recompute = session.set_answer("cirurgia", &json!("nao")).unwrap();
        assert_eq!(recompute.active_ids(), vec!["cirurgia"]);
        assert!(!session.answers().contains("complicacao"));
        assert!(!session.answers().contains("qual"));

        let recompute = session.set_answer("cirurgia", &json!("sim")).unwrap();
        assert_eq!(recompute.active_ids(), vec!["cirurgia", "complicacao"]);
        assert_eq!(recompute.report.missing_required, vec!["complicacao"]);
    }

    #[test]
    fn edit_to_hidden_question_is_rejected() {
        let mut session = nested_session();
        session.set_answer("cirurgia", &json!("sim")).unwrap();
        let err = session.set_answer("qual", &json!("Infecção")).unwrap_err();
        assert_eq!(err, AnswerError::Inactive("qual".into()));
        assert!(!session.answers().contains("qual"));

        session.set_answer("complicacao", &json!("sim")).unwrap();
        session.set_answer("qual", &json!("Infecção")).unwrap();
        assert!(session.answers().contains("qual"));
        assert!(matches!(
            session.set_answer("inexistente", &json!("x")),
            Err(AnswerError::UnknownQuestion(_))
        ));
    }

    #[test]
    fn hiding_a_branch_clears_its_answers() {
        let mut session = session();
        session.set_answer("q1", &json!("yes")).unwrap();
        session
            .set_answer("q1_details", &json!("Tomografia de crânio em 2020"))
            .unwrap();
        let recompute = session.set_answer("q1", &json!("no")).unwrap();
        assert!(!recompute.active_ids().contains(&"q1_details"));
        assert!(!session.answers().contains("q1_details"));

        let recompute = session.set_answer("q1", &json!("yes")).unwrap();
        assert!(recompute.active_ids().contains(&"q1_details"));
        assert!(
            recompute
                .report
                .missing_required
                .contains(&"q1_details".to_string())
        );
    }

    #[test]
    fn resumed_record_keeps_identity_and_answers() {
        let mut session = session();
        session.set_answer("q1", &json!("no")).unwrap();
        session.set_answer("q2", &json!("no")).unwrap();
        session.set_answer("q3", &json!("na")).unwrap();
        session
            .set_answer("q4", &json!(["asma", "outras"]))
            .unwrap();
        session.set_answer("q4_details", &json!("Gastrite")).unwrap();
        session.set_technicians(Technicians {
            radiology_technician: Some(Technician::new("rad1", "Alisson (CRTR-12345)")),
            nursing_technician: None,
        });
        session.set_technicians(Technicians {
            radiology_technician: None,
            nursing_technician: Some(Technician::new("nurse1", "Ana Silva (COREN-54321)")),
        });
        let questionnaire = Arc::clone(&session.questionnaire);
        let answers = session.answers().clone();

        let consent = Consent {
            signature_ref: "iVBORw0KGgo".into(),
            cpf: "12345678909".into(),
            rg: "1234567".into(),
            birth_date: "01021990".into(),
        };
        let now = Utc::now();
        let (id, draft) = session
            .into_draft(RecordHeader::default(), consent, now)
            .unwrap();
        assert_eq!(id, None);
        assert_eq!(draft.consent.cpf, "123.456.789-09");
        assert_eq!(
            draft.technicians.radiology_technician.as_ref().map(|t| t.id.as_str()),
            Some("rad1")
        );
        assert_eq!(
            draft.technicians.nursing_technician.as_ref().map(|t| t.id.as_str()),
            Some("nurse1")
        );
        let record = draft.into_record(RecordId::from("1-abc"));

        let resumed = IntakeSession::resume(questionnaire, &record).unwrap();
        assert_eq!(resumed.record_id(), Some(&RecordId::from("1-abc")));
        assert_eq!(resumed.answers(), &answers);
        assert_eq!(resumed.technicians(), &record.technicians);
    }

    #[test]
    fn incomplete_answers_block_the_draft() {
        let mut session = session();
        session.set_answer("q1", &json!("yes")).unwrap();
        let err = session
            .into_draft(RecordHeader::default(), Consent::default(), Utc::now())
            .unwrap_err();
        let DraftError::Validation(ValidationFailed(report)) = err else {
            panic!("expected validation failure");
        };
        assert_eq!(report.missing_required, vec!["q1_details", "q2", "q3"]);
    }

    #[test]
    fn rejected_edit_keeps_previous_state() {
        let mut session = session();
        session.set_answer("q3", &json!("na")).unwrap();
        assert!(session.set_answer("q3", &json!("talvez")).is_err());
        assert_eq!(session.answers().to_json()["q3"], "na");
    }
}
