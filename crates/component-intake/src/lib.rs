use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use intake_spec::{
    ActiveNode, AnswerError, AnswerLabels, AnswerMap, CompiledQuestionnaire, IntakeSession,
    IssueCode, Questionnaire, ResponseList, SpecError, TOMOGRAFIA_DEFINITION, ValidationIssue,
    flatten, validate,
};

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("questionnaire '{0}' is not available")]
    QuestionnaireUnavailable(String),
    #[error("questionnaire definition is invalid: {0}")]
    Definition(#[from] SpecError),
    #[error("answers rejected: {0}")]
    Answers(#[from] AnswerError),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    definition_json: Option<String>,
}

fn load_definition(config_json: &str) -> Result<Questionnaire, ComponentError> {
    let config = if config_json.trim().is_empty() {
        ComponentConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)?
    };

    let definition_json = config
        .definition_json
        .as_deref()
        .unwrap_or(TOMOGRAFIA_DEFINITION);

    Questionnaire::from_json(definition_json).map_err(ComponentError::ConfigParse)
}

fn ensure_questionnaire(
    questionnaire_id: &str,
    config_json: &str,
) -> Result<Arc<CompiledQuestionnaire>, ComponentError> {
    let definition = load_definition(config_json)?;
    if definition.id != questionnaire_id {
        return Err(ComponentError::QuestionnaireUnavailable(
            questionnaire_id.to_string(),
        ));
    }
    Ok(Arc::new(CompiledQuestionnaire::compile(&definition)?))
}

fn parse_answers(
    questionnaire: &CompiledQuestionnaire,
    answers_json: &str,
) -> Result<AnswerMap, ComponentError> {
    let raw = if answers_json.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(answers_json).map_err(ComponentError::ConfigParse)?
    };
    Ok(AnswerMap::from_json(questionnaire.tree(), &raw)?)
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn active_question_value(active: &ActiveNode<'_>, answers: &AnswerMap) -> Value {
    let node = active.node;
    json!({
        "id": node.id,
        "text": node.text,
        "type": node.kind,
        "required": node.required,
        "options": node.options,
        "depth": active.depth(),
        "answer": answers.get(&node.id).map(|value| value.to_json()),
    })
}

fn progress(active: &[ActiveNode<'_>], answers: &AnswerMap) -> Value {
    let answered = active
        .iter()
        .filter(|node| answers.contains(node.id()))
        .count();
    json!({ "answered": answered, "total": active.len() })
}

/// Edit rejections that belong to one field are reported like validation issues.
fn issue_for(err: &AnswerError) -> Option<ValidationIssue> {
    let (question_id, code) = match err {
        AnswerError::TypeMismatch { id, .. } => (id, IssueCode::TypeMismatch),
        AnswerError::InvalidOption { id, .. } => (id, IssueCode::InvalidOption),
        AnswerError::Inactive(id) => (id, IssueCode::Inactive),
        AnswerError::UnknownQuestion(_) | AnswerError::NotAnObject => return None,
    };
    Some(ValidationIssue {
        question_id: question_id.clone(),
        code,
        message: err.to_string(),
    })
}

fn responses_value(
    questionnaire: &CompiledQuestionnaire,
    responses: &ResponseList,
) -> Result<Value, ComponentError> {
    let labels = AnswerLabels::default().with_tree_options(questionnaire.tree());
    let mut entries = Vec::with_capacity(responses.len());
    for entry in responses {
        let mut value = serde_json::to_value(entry).map_err(ComponentError::JsonEncode)?;
        if let Value::Object(object) = &mut value {
            object.insert("display".into(), Value::String(entry.display(&labels)));
        }
        entries.push(value);
    }
    Ok(Value::Array(entries))
}

pub fn describe(questionnaire_id: &str, config_json: &str) -> String {
    respond(load_definition(config_json).and_then(|definition| {
        if definition.id != questionnaire_id {
            Err(ComponentError::QuestionnaireUnavailable(
                questionnaire_id.to_string(),
            ))
        } else {
            serde_json::to_value(definition).map_err(ComponentError::JsonEncode)
        }
    }))
}

pub fn get_answer_schema(questionnaire_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|questionnaire| {
            let answers = parse_answers(&questionnaire, answers_json)?;
            Ok(questionnaire.rules().to_json_schema(&answers))
        }),
    )
}

pub fn validate_answers(questionnaire_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|questionnaire| {
            let answers = parse_answers(&questionnaire, answers_json)?;
            serde_json::to_value(validate(questionnaire.rules(), &answers))
                .map_err(ComponentError::JsonEncode)
        }),
    )
}

pub fn active_questions(questionnaire_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|questionnaire| {
            let answers = parse_answers(&questionnaire, answers_json)?;
            let recompute = intake_spec::recompute(questionnaire.rules(), &answers);
            let questions: Vec<Value> = recompute
                .active
                .iter()
                .map(|active| active_question_value(active, &answers))
                .collect();
            Ok(json!({
                "questions": questions,
                "progress": progress(&recompute.active, &answers),
                "validation": recompute.report,
            }))
        }),
    )
}

/// Applies one edit on top of `answers_json` and returns the re-evaluated state.
/// Answers of questions hidden by the edit are dropped from the returned answers.
pub fn submit_patch(
    questionnaire_id: &str,
    config_json: &str,
    answers_json: &str,
    question_id: &str,
    value_json: &str,
) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|questionnaire| {
            let value: Value =
                serde_json::from_str(value_json).map_err(ComponentError::ConfigParse)?;
            let answers = parse_answers(&questionnaire, answers_json)?;
            let mut session = IntakeSession::with_answers(questionnaire, answers);

            let rejected = match session.set_answer(question_id, &value) {
                Ok(_) => None,
                Err(err) => match issue_for(&err) {
                    Some(issue) => Some(issue),
                    None => return Err(err.into()),
                },
            };

            let recompute = session.recompute();
            let answers = session.answers();
            let questions: Vec<Value> = recompute
                .active
                .iter()
                .map(|active| active_question_value(active, answers))
                .collect();
            let progress = progress(&recompute.active, answers);

            if let Some(issue) = rejected {
                return Ok(json!({
                    "status": "error",
                    "answers": answers.to_json(),
                    "questions": questions,
                    "progress": progress,
                    "validation": { "valid": false, "errors": [issue] },
                }));
            }

            let status = if recompute.report.valid {
                "complete"
            } else {
                "need_input"
            };
            Ok(json!({
                "status": status,
                "answers": answers.to_json(),
                "questions": questions,
                "progress": progress,
                "validation": recompute.report,
            }))
        }),
    )
}

/// Flattened responses for the current answers, with display labels applied.
pub fn flatten_answers(questionnaire_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|questionnaire| {
            let answers = parse_answers(&questionnaire, answers_json)?;
            let report = validate(questionnaire.rules(), &answers);
            let responses = flatten(questionnaire.tree(), &answers);
            Ok(json!({
                "valid": report.valid,
                "responses": responses_value(&questionnaire, &responses)?,
                "validation": report,
            }))
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(payload: &str) -> Value {
        serde_json::from_str(payload).expect("json")
    }

    fn surgery_config() -> String {
        let definition = json!({
            "id": "triagem",
            "title": "Triagem",
            "questions": [
                { "id": "cirurgia", "text": "Fez alguma cirurgia?", "type": "radio",
                  "options": [
                      { "id": "sim", "label": "Sim", "value": "sim" },
                      { "id": "nao", "label": "Não", "value": "nao" }
                  ] },
                { "id": "cirurgiaTempo", "text": "Há quanto tempo?", "type": "text",
                  "dependsOn": { "questionId": "cirurgia", "value": "sim" } },
                { "id": "cirurgiaQual", "text": "Qual cirurgia?", "type": "text",
                  "dependsOn": { "questionId": "cirurgia", "value": "sim" } }
            ]
        });
        json!({ "definition_json": definition.to_string() }).to_string()
    }

    #[test]
    fn describe_returns_bundled_definition() {
        let definition = parse(&describe("tomografia", ""));
        assert_eq!(definition["id"], "tomografia");
        assert_eq!(definition["questions"][0]["id"], "q1");
    }

    #[test]
    fn unknown_questionnaire_is_an_error() {
        let payload = parse(&describe("mamografia", ""));
        assert!(payload["error"].as_str().unwrap().contains("mamografia"));
    }

    #[test]
    fn schema_grows_with_open_branches() {
        let closed = parse(&get_answer_schema("tomografia", "", "{}"));
        assert!(closed["properties"].get("q1_details").is_none());
        let open = parse(&get_answer_schema("tomografia", "", r#"{"q1":"yes"}"#));
        assert_eq!(open["properties"]["q1_details"]["type"], "string");
    }

    #[test]
    fn validate_answers_reports_valid_when_complete() {
        let answers = json!({ "q1": "no", "q2": "no", "q3": "na" });
        let parsed = parse(&validate_answers("tomografia", "", &answers.to_string()));
        assert_eq!(parsed["valid"], true);
    }

    #[test]
    fn validate_answers_lists_missing_required() {
        let parsed = parse(&validate_answers("tomografia", "", r#"{"q1":"yes"}"#));
        assert_eq!(parsed["valid"], false);
        assert_eq!(parsed["missing_required"], json!(["q1_details", "q2", "q3"]));
    }

    #[test]
    fn active_questions_follow_branches() {
        let parsed = parse(&active_questions(
            "triagem",
            &surgery_config(),
            r#"{"cirurgia":"sim","cirurgiaTempo":"2 anos"}"#,
        ));
        let ids: Vec<&str> = parsed["questions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["cirurgia", "cirurgiaTempo", "cirurgiaQual"]);
        assert_eq!(parsed["questions"][1]["depth"], 1);
        assert_eq!(parsed["progress"]["answered"], 2);
        assert_eq!(parsed["progress"]["total"], 3);
    }

    #[test]
    fn submit_patch_clears_hidden_answers() {
        let response = parse(&submit_patch(
            "triagem",
            &surgery_config(),
            r#"{"cirurgia":"sim","cirurgiaTempo":"2 anos","cirurgiaQual":"Apendicite"}"#,
            "cirurgia",
            r#""nao""#,
        ));
        assert_eq!(response["status"], "complete");
        assert_eq!(response["answers"], json!({ "cirurgia": "nao" }));
        assert_eq!(response["progress"]["total"], 1);
    }

    #[test]
    fn submit_patch_needs_input_for_open_branch() {
        let response = parse(&submit_patch(
            "triagem",
            &surgery_config(),
            "{}",
            "cirurgia",
            r#""sim""#,
        ));
        assert_eq!(response["status"], "need_input");
        assert_eq!(
            response["validation"]["missing_required"],
            json!(["cirurgiaTempo", "cirurgiaQual"])
        );
    }

    #[test]
    fn submit_patch_returns_validation_error() {
        let response = parse(&submit_patch("tomografia", "", "{}", "q1", "true"));
        assert_eq!(response["status"], "error");
        assert_eq!(response["validation"]["errors"][0]["code"], "type_mismatch");
        assert_eq!(response["validation"]["errors"][0]["question_id"], "q1");

        let response = parse(&submit_patch("tomografia", "", "{}", "q1", r#""talvez""#));
        assert_eq!(response["validation"]["errors"][0]["code"], "invalid_option");
    }

    #[test]
    fn submit_patch_on_hidden_question_reports_inactive() {
        let response = parse(&submit_patch(
            "triagem",
            &surgery_config(),
            r#"{"cirurgia":"nao"}"#,
            "cirurgiaTempo",
            r#""2 anos""#,
        ));
        assert_eq!(response["status"], "error");
        assert_eq!(response["validation"]["errors"][0]["code"], "inactive");
        assert_eq!(
            response["validation"]["errors"][0]["question_id"],
            "cirurgiaTempo"
        );
        assert!(response["answers"].get("cirurgiaTempo").is_none());
    }

    #[test]
    fn submit_patch_on_unknown_question_is_an_error() {
        let response = parse(&submit_patch("tomografia", "", "{}", "q9", r#""yes""#));
        assert!(response["error"].as_str().unwrap().contains("q9"));
    }

    #[test]
    fn flatten_answers_marks_unanswered_and_labels_choices() {
        let parsed = parse(&flatten_answers(
            "triagem",
            &surgery_config(),
            r#"{"cirurgia":"sim","cirurgiaTempo":"2 anos"}"#,
        ));
        assert_eq!(parsed["valid"], false);
        let responses = parsed["responses"].as_array().unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["answer"], "sim");
        assert_eq!(responses[0]["display"], "Sim");
        assert!(responses[2]["answer"].is_null());
        assert_eq!(responses[2]["display"], "Sem resposta");
    }

    #[test]
    fn broken_definition_is_reported() {
        let definition = json!({
            "id": "broken",
            "title": "Broken",
            "questions": [
                { "id": "a", "text": "A", "type": "text",
                  "depends_on": { "question_id": "missing", "value": "sim" } }
            ]
        });
        let config = json!({ "definition_json": definition.to_string() }).to_string();
        let parsed = parse(&validate_answers("broken", &config, "{}"));
        assert!(parsed["error"].as_str().unwrap().contains("missing"));
    }
}
