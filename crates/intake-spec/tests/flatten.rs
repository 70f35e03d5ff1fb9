use serde_json::json;

use intake_spec::{
    AnswerLabels, AnswerMap, Catalog, CompiledQuestionnaire, Questionnaire, ResponseAnswer,
    UNANSWERED_LABEL, active_nodes, builtin_tomografia, flatten,
};

const TRIAGEM: &str = include_str!("fixtures/tomografia_flat.json");

fn triagem() -> CompiledQuestionnaire {
    let definition = Questionnaire::from_json(TRIAGEM).expect("fixture parses");
    CompiledQuestionnaire::compile(&definition).expect("fixture compiles")
}

fn answers(q: &CompiledQuestionnaire, raw: serde_json::Value) -> AnswerMap {
    AnswerMap::from_json(q.tree(), &raw).expect("answers coerce")
}

fn ids(list: &intake_spec::ResponseList) -> Vec<&str> {
    list.iter().map(|entry| entry.question_id.as_str()).collect()
}

#[test]
fn declined_surgery_yields_a_single_entry() {
    let q = triagem();
    let list = flatten(q.tree(), &answers(&q, json!({ "cirurgia": "nao" })));
    let surgery: Vec<_> = ids(&list)
        .into_iter()
        .filter(|id| id.starts_with("cirurgia"))
        .collect();
    assert_eq!(surgery, vec!["cirurgia"]);
    assert_eq!(list.get("cirurgia").unwrap().answer.as_deref(), Some("nao"));
}

#[test]
fn confirmed_surgery_lists_follow_ups_in_declaration_order() {
    let q = triagem();
    let list = flatten(
        q.tree(),
        &answers(&q, json!({ "cirurgia": "sim", "cirurgiaTempo": "2 anos" })),
    );
    let surgery: Vec<_> = ids(&list)
        .into_iter()
        .filter(|id| id.starts_with("cirurgia"))
        .collect();
    assert_eq!(surgery, vec!["cirurgia", "cirurgiaTempo", "cirurgiaQual"]);

    let tempo = list.get("cirurgiaTempo").unwrap();
    assert_eq!(tempo.question_text, "Há quanto tempo?");
    assert_eq!(tempo.answer, ResponseAnswer::Answered("2 anos".into()));

    let qual = list.get("cirurgiaQual").unwrap();
    assert_eq!(qual.answer, ResponseAnswer::Unanswered);
    assert_eq!(qual.display(&AnswerLabels::default()), UNANSWERED_LABEL);
}

#[test]
fn every_root_is_listed_even_when_unanswered() {
    let q = triagem();
    let list = flatten(q.tree(), &AnswerMap::new());
    assert_eq!(
        ids(&list),
        vec![
            "pacienteNome",
            "motivo",
            "cirurgia",
            "tratamento",
            "medicamento",
            "alergia",
            "gravidez",
            "comorbidades",
            "fumante",
        ]
    );
    assert!(list.iter().all(|entry| !entry.answer.is_answered()));
}

#[test]
fn flatten_matches_active_nodes_and_is_deterministic() {
    let q = triagem();
    let answers = answers(
        &q,
        json!({
            "pacienteNome": "Maria",
            "tratamento": "sim",
            "tratamentoSessoes": "12",
            "fumante": "sim",
            "fumanteTempo": "10 anos",
        }),
    );
    let first = flatten(q.tree(), &answers);
    let second = flatten(q.tree(), &answers);
    assert_eq!(first, second);

    let active: Vec<_> = active_nodes(q.tree(), &answers)
        .iter()
        .map(|node| node.id().to_string())
        .collect();
    assert_eq!(ids(&first), active.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(
        first.get("tratamentoSessoes").unwrap().answer.as_deref(),
        Some("12")
    );
}

#[test]
fn stale_branch_answers_are_not_flattened() {
    let q = triagem();
    let list = flatten(
        q.tree(),
        &answers(&q, json!({ "fumante": "nao", "fumanteTempo": "10 anos" })),
    );
    assert!(list.get("fumanteTempo").is_none());
}

#[test]
fn checkbox_tokens_follow_option_order_and_map_to_labels() {
    let catalog = Catalog::from_definitions([builtin_tomografia().unwrap()]).unwrap();
    let q = catalog.get("tomografia").unwrap();
    let answers = answers(
        &q,
        json!({ "q1": "no", "q4": ["outras", "diabetes"], "q4_details": "Gastrite" }),
    );
    let list = flatten(q.tree(), &answers);

    let q4 = list.get("q4").unwrap();
    assert_eq!(q4.tokens, vec!["diabetes", "outras"]);
    assert_eq!(q4.answer.as_deref(), Some("diabetes, outras"));

    let labels = AnswerLabels::default().with_tree_options(q.tree());
    assert_eq!(list.get("q1").unwrap().display(&labels), "Não");
    assert!(q4.display(&labels).starts_with("Diabetes"));
    assert_eq!(list.get("q4_details").unwrap().display(&labels), "Gastrite");
}

#[test]
fn response_list_serializes_for_renderers() {
    let q = triagem();
    let list = flatten(q.tree(), &answers(&q, json!({ "cirurgia": "sim" })));
    let value = serde_json::to_value(&list).unwrap();
    let entries = value.as_array().unwrap();
    let cirurgia = entries
        .iter()
        .find(|entry| entry["questionId"] == "cirurgia")
        .unwrap();
    assert_eq!(cirurgia["questionText"], "Fez alguma cirurgia?");
    assert_eq!(cirurgia["answer"], "sim");
    assert_eq!(cirurgia["tokens"], json!(["sim"]));
    let nome = entries
        .iter()
        .find(|entry| entry["questionId"] == "pacienteNome")
        .unwrap();
    assert!(nome["answer"].is_null());
    assert!(nome.get("tokens").is_none());
}
