//! Plain-text preview of a stored record.

use handlebars::Handlebars;
use intake_spec::{AnswerLabels, DocumentRecord};
use serde::Serialize;

const RECORD_TEMPLATE: &str = "\
{{header.formatted}}
Registro {{id}} ({{questionnaire}})
IP: {{header.ip}}{{#if header.mac}} | MAC: {{header.mac}}{{/if}}
{{#if technicians.radiologyTechnician}}Técnico de radiologia: {{technicians.radiologyTechnician.label}}
{{/if}}{{#if technicians.nursingTechnician}}Técnico de enfermagem: {{technicians.nursingTechnician.label}}
{{/if}}

{{#each entries}}
{{question}}
  {{answer}}
{{/each}}

CPF: {{consent.cpf}}
RG: {{consent.rg}}
Data de nascimento: {{consent.birthDate}}
Assinatura: {{signature}}
";

#[derive(Serialize)]
struct PreviewEntry<'a> {
    question: &'a str,
    answer: String,
}

#[derive(Serialize)]
struct PreviewContext<'a> {
    id: &'a str,
    questionnaire: &'a str,
    header: &'a intake_spec::RecordHeader,
    consent: &'a intake_spec::Consent,
    technicians: &'a intake_spec::Technicians,
    entries: Vec<PreviewEntry<'a>>,
    signature: String,
}

pub fn render_record(
    record: &DocumentRecord,
    labels: &AnswerLabels,
) -> Result<String, handlebars::RenderError> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    let signature = if record.consent.signature_ref.is_empty() {
        "ausente".to_string()
    } else {
        format!(
            "capturada ({} caracteres)",
            record.consent.signature_data_uri().len()
        )
    };
    let context = PreviewContext {
        id: record.id.as_str(),
        questionnaire: &record.questionnaire_id,
        header: &record.header,
        consent: &record.consent,
        technicians: &record.technicians,
        entries: record
            .responses
            .iter()
            .map(|entry| PreviewEntry {
                question: &entry.question_text,
                answer: entry.display(labels),
            })
            .collect(),
        signature,
    };
    handlebars.render_template(RECORD_TEMPLATE, &context)
}
