use std::fs;
use std::path::PathBuf;

use chrono::{Local, Utc};
use clap::Subcommand;
use globset::Glob;
use intake_spec::{
    AnswerLabels, AnswerMap, Consent, DraftError, IntakeSession, RecordHeader, RecordId,
    Technician, Technicians,
};
use intake_store::{RecordStore, StoreConfig, StoreError};
use serde_json::Value;

use crate::preview::render_record;
use crate::{CliResult, describe_validation, load_questionnaire, read_json};

#[derive(Subcommand)]
pub enum RecordsCommand {
    /// List stored records, newest first.
    List {
        /// Only records whose questionnaire id matches this glob.
        #[arg(long, value_name = "GLOB")]
        questionnaire: Option<String>,
        /// Print the records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show one record as a text preview.
    Show {
        id: String,
        /// Definition whose option labels are used for display.
        #[arg(long, value_name = "DEFINITION")]
        definition: Option<PathBuf>,
        /// Print the stored record as JSON instead.
        #[arg(long)]
        json: bool,
    },
    /// Delete one record.
    Delete { id: String },
    /// Validate answers and consent and store the record.
    Submit {
        #[arg(long, value_name = "DEFINITION")]
        definition: Option<PathBuf>,
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
        /// JSON file with signature, cpf, rg and birthDate.
        #[arg(long, value_name = "CONSENT")]
        consent: PathBuf,
        /// Address printed in the document header.
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
        /// Update this record instead of creating a new one.
        #[arg(long, value_name = "ID")]
        id: Option<String>,
        /// Radiology technician as `id` or `id=Label`.
        #[arg(long, value_name = "TECHNICIAN", value_parser = parse_technician)]
        radiology_technician: Option<Technician>,
        /// Nursing technician as `id` or `id=Label`.
        #[arg(long, value_name = "TECHNICIAN", value_parser = parse_technician)]
        nursing_technician: Option<Technician>,
    },
}

pub async fn run(config: &StoreConfig, command: RecordsCommand) -> CliResult<()> {
    let store = RecordStore::open(config).await?;
    match command {
        RecordsCommand::List {
            questionnaire,
            json,
        } => run_list(&store, questionnaire.as_deref(), json).await,
        RecordsCommand::Show {
            id,
            definition,
            json,
        } => run_show(&store, RecordId::new(id), definition, json).await,
        RecordsCommand::Delete { id } => run_delete(&store, RecordId::new(id)).await,
        RecordsCommand::Submit {
            definition,
            answers,
            consent,
            ip,
            id,
            radiology_technician,
            nursing_technician,
        } => {
            let technicians = Technicians {
                radiology_technician,
                nursing_technician,
            };
            let id = id.map(RecordId::new);
            run_submit(&store, definition, answers, consent, ip, id, technicians).await
        }
    }
}

fn parse_technician(raw: &str) -> Result<Technician, String> {
    let (id, label) = raw.split_once('=').unwrap_or((raw, ""));
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("technician '{raw}' has no id"));
    }
    let label = match label.trim() {
        "" => id,
        label => label,
    };
    Ok(Technician::new(id, label))
}

async fn run_list(store: &RecordStore, pattern: Option<&str>, json: bool) -> CliResult<()> {
    let matcher = pattern
        .map(|pattern| Glob::new(pattern).map(|glob| glob.compile_matcher()))
        .transpose()?;
    let records = store.list().await;
    let selected: Vec<_> = records
        .iter()
        .filter(|record| {
            matcher
                .as_ref()
                .is_none_or(|matcher| matcher.is_match(&record.questionnaire_id))
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }
    if selected.is_empty() {
        println!("No records stored.");
    }
    for record in selected {
        println!(
            "{}  {}  {}",
            record.id, record.questionnaire_id, record.header.formatted
        );
    }
    Ok(())
}

async fn run_show(
    store: &RecordStore,
    id: RecordId,
    definition: Option<PathBuf>,
    json: bool,
) -> CliResult<()> {
    let record = store
        .get_by_id(&id)
        .await
        .ok_or(StoreError::NotFound(id))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }
    let labels = match definition {
        Some(path) => {
            let questionnaire = load_questionnaire(Some(&path))?;
            AnswerLabels::default().with_tree_options(questionnaire.tree())
        }
        None => AnswerLabels::default(),
    };
    print!("{}", render_record(&record, &labels)?);
    Ok(())
}

async fn run_delete(store: &RecordStore, id: RecordId) -> CliResult<()> {
    let deleted = store.delete(&id).await?;
    tracing::info!(record = %id, deleted, "delete requested");
    if deleted {
        println!("Deleted record {}", id);
    } else {
        println!("Record {} not found; nothing deleted", id);
    }
    Ok(())
}

async fn run_submit(
    store: &RecordStore,
    definition: Option<PathBuf>,
    answers_path: PathBuf,
    consent_path: PathBuf,
    ip: String,
    id: Option<RecordId>,
    technicians: Technicians,
) -> CliResult<()> {
    let questionnaire = load_questionnaire(definition.as_deref())?;
    let raw_answers: Value = read_json(&answers_path)?;
    let answers = AnswerMap::from_json(questionnaire.tree(), &raw_answers)?;
    let consent: Consent = serde_json::from_str(&fs::read_to_string(&consent_path)?)?;

    let mut session = match &id {
        Some(id) => {
            let record = store
                .get_by_id(id)
                .await
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            IntakeSession::resume(questionnaire, &record)?
        }
        None => IntakeSession::new(questionnaire),
    };
    session.replace_answers(answers);
    session.set_technicians(technicians);

    let header = RecordHeader::stamped(Local::now().naive_local(), ip);
    let (record_id, draft) = match session.into_draft(header, consent, Utc::now()) {
        Ok(draft) => draft,
        Err(DraftError::Validation(failed)) => {
            tracing::warn!(errors = failed.0.errors.len(), "submission blocked by validation");
            describe_validation(&failed.0);
            return Err("validation failed".into());
        }
        Err(err) => return Err(err.into()),
    };

    let updating = record_id.is_some();
    let record = store.upsert(record_id, draft).await?;
    tracing::info!(
        record = %record.id,
        questionnaire = %record.questionnaire_id,
        updating,
        "record submitted"
    );
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
