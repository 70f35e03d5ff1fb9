mod preview;
mod records;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use component_intake::{active_questions, submit_patch};
use intake_spec::{
    AnswerMap, CompiledQuestionnaire, Questionnaire, TOMOGRAFIA_DEFINITION, ValidationReport,
    flatten, validate,
};
use intake_store::{
    BlobCodec, DEFAULT_DATA_DIR, ENV_DATA_DIR, ENV_STORE_FORMAT, StoreConfig, StoreError,
};
use records::RecordsCommand;
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Imaging intake questionnaire CLI",
    long_about = "Checks questionnaire definitions, evaluates answers and manages stored consent records"
)]
struct Cli {
    /// Directory holding the record store.
    #[arg(long, global = true, env = ENV_DATA_DIR, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Record store blob format (json or cbor).
    #[arg(long, global = true, env = ENV_STORE_FORMAT, value_parser = parse_codec)]
    store_format: Option<BlobCodec>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a definition and summarize its rules.
    Check {
        /// Questionnaire definition JSON (defaults to the bundled tomografia form).
        #[arg(long, value_name = "DEFINITION")]
        definition: Option<PathBuf>,
    },
    /// Print the JSON Schema of the answers accepted in the given state.
    Schema {
        #[arg(long, value_name = "DEFINITION")]
        definition: Option<PathBuf>,
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Print the schema of the definition format instead.
        #[arg(long, conflicts_with_all = ["definition", "answers"])]
        definition_format: bool,
    },
    /// List the questions active for the given answers.
    Active {
        #[arg(long, value_name = "DEFINITION")]
        definition: Option<PathBuf>,
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
    },
    /// Apply one answer and print the re-evaluated state.
    Patch {
        #[arg(long, value_name = "DEFINITION")]
        definition: Option<PathBuf>,
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Question to answer.
        #[arg(long, value_name = "ID")]
        question: String,
        /// Answer as JSON, e.g. '"sim"' or '["asma"]'.
        #[arg(long, value_name = "JSON")]
        value: String,
    },
    /// Print the flattened responses for a set of answers.
    Flatten {
        #[arg(long, value_name = "DEFINITION")]
        definition: Option<PathBuf>,
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
        /// Flatten even when required answers are missing.
        #[arg(long)]
        allow_incomplete: bool,
    },
    /// Manage stored document records.
    Records {
        #[command(subcommand)]
        command: RecordsCommand,
    },
}

fn parse_codec(raw: &str) -> Result<BlobCodec, StoreError> {
    raw.parse()
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { definition } => run_check(definition.as_deref()),
        Command::Schema {
            definition,
            answers,
            definition_format,
        } => run_schema(definition.as_deref(), answers.as_deref(), definition_format),
        Command::Active {
            definition,
            answers,
        } => run_active(definition.as_deref(), answers.as_deref()),
        Command::Patch {
            definition,
            answers,
            question,
            value,
        } => run_patch(definition.as_deref(), answers.as_deref(), &question, &value),
        Command::Flatten {
            definition,
            answers,
            allow_incomplete,
        } => run_flatten(definition.as_deref(), &answers, allow_incomplete),
        Command::Records { command } => {
            let config = StoreConfig::new(
                cli.data_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
                cli.store_format.unwrap_or_default(),
            )?;
            records::run(&config, command).await
        }
    }
}

fn read_definition(path: Option<&Path>) -> CliResult<String> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => Ok(TOMOGRAFIA_DEFINITION.to_string()),
    }
}

fn load_questionnaire(path: Option<&Path>) -> CliResult<Arc<CompiledQuestionnaire>> {
    let definition = Questionnaire::from_json(&read_definition(path)?)?;
    Ok(Arc::new(CompiledQuestionnaire::compile(&definition)?))
}

fn read_json(path: &Path) -> CliResult<Value> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn read_answers_json(path: Option<&Path>) -> CliResult<String> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => Ok("{}".to_string()),
    }
}

fn component_config(path: Option<&Path>) -> CliResult<String> {
    Ok(json!({ "definition_json": read_definition(path)? }).to_string())
}

fn load_answers(questionnaire: &CompiledQuestionnaire, path: Option<&Path>) -> CliResult<AnswerMap> {
    match path {
        Some(path) => Ok(AnswerMap::from_json(questionnaire.tree(), &read_json(path)?)?),
        None => Ok(AnswerMap::new()),
    }
}

/// Unwraps a facade response, turning its `error` member into a failure.
fn parse_component_result(response: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(response)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(error.to_string().into());
    }
    Ok(value)
}

fn run_check(definition: Option<&Path>) -> CliResult<()> {
    let questionnaire = load_questionnaire(definition)?;
    let rules = questionnaire.rules();
    println!(
        "Questionnaire '{}' ({}): {} questions, {} top-level",
        questionnaire.id,
        questionnaire.title,
        rules.len(),
        questionnaire.tree().roots().len()
    );
    for rule in rules.rules() {
        let requirement = if rule.required { "required" } else { "optional" };
        let activation = match &rule.activation {
            intake_spec::Activation::Always => String::new(),
            intake_spec::Activation::WhenBranch { parent, trigger } => {
                format!(" when {} = {}", parent, trigger)
            }
        };
        println!(
            "  {} [{}] {}{}",
            rule.question_id, rule.kind, requirement, activation
        );
    }
    Ok(())
}

fn run_schema(
    definition: Option<&Path>,
    answers: Option<&Path>,
    definition_format: bool,
) -> CliResult<()> {
    let schema = if definition_format {
        Questionnaire::json_schema()
    } else {
        let questionnaire = load_questionnaire(definition)?;
        let answers = load_answers(&questionnaire, answers)?;
        questionnaire.rules().to_json_schema(&answers)
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run_active(definition: Option<&Path>, answers: Option<&Path>) -> CliResult<()> {
    let questionnaire = load_questionnaire(definition)?;
    let config = component_config(definition)?;
    let response = active_questions(
        &questionnaire.id,
        &config,
        &read_answers_json(answers)?,
    );
    let value = parse_component_result(&response)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_patch(
    definition: Option<&Path>,
    answers: Option<&Path>,
    question: &str,
    value: &str,
) -> CliResult<()> {
    let questionnaire = load_questionnaire(definition)?;
    let config = component_config(definition)?;
    let response = submit_patch(
        &questionnaire.id,
        &config,
        &read_answers_json(answers)?,
        question,
        value,
    );
    let value = parse_component_result(&response)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    if value["status"] == "error" {
        return Err("answer rejected".into());
    }
    Ok(())
}

fn run_flatten(definition: Option<&Path>, answers: &Path, allow_incomplete: bool) -> CliResult<()> {
    let questionnaire = load_questionnaire(definition)?;
    let answers = load_answers(&questionnaire, Some(answers))?;
    let report = validate(questionnaire.rules(), &answers);
    if !report.valid && !allow_incomplete {
        describe_validation(&report);
        return Err("validation failed".into());
    }
    let responses = flatten(questionnaire.tree(), &answers);
    println!("{}", serde_json::to_string_pretty(&responses)?);
    Ok(())
}

fn describe_validation(report: &ValidationReport) {
    if !report.errors.is_empty() {
        eprintln!("Errors:");
        for issue in &report.errors {
            eprintln!("  {} - {}", issue.question_id, issue.message);
        }
    }
    if !report.missing_required.is_empty() {
        eprintln!(
            "Missing required answers: {}",
            report.missing_required.join(", ")
        );
    }
    if !report.unknown_fields.is_empty() {
        eprintln!(
            "Unknown answer fields: {}",
            report.unknown_fields.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use assert_fs::prelude::*;
    use serde_json::{Value, json};

    const TRIAGEM: &str = include_str!("../../intake-spec/tests/fixtures/tomografia_flat.json");

    fn intake(data_dir: &Path) -> Command {
        let mut cmd = Command::cargo_bin("intake").expect("binary");
        cmd.env(ENV_DATA_DIR, data_dir)
            .env_remove(ENV_STORE_FORMAT)
            .env("RUST_LOG", "off");
        cmd
    }

    fn stdout_json(output: &std::process::Output) -> Value {
        serde_json::from_slice(&output.stdout).expect("stdout json")
    }

    fn consent_json() -> String {
        json!({
            "signature": "iVBORw0KGgo",
            "cpf": "12345678909",
            "rg": "12.345.678-9",
            "birthDate": "01021990"
        })
        .to_string()
    }

    #[test]
    fn check_summarizes_bundled_definition() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = intake(temp.path()).arg("check").output().unwrap();
        assert!(output.status.success());
        let text = String::from_utf8(output.stdout).unwrap();
        assert!(text.contains("Questionnaire 'tomografia'"));
        assert!(text.contains("q1_details [textarea] required when q1 = yes"));
        assert!(text.contains("q4 [checkbox] optional"));
    }

    #[test]
    fn check_rejects_dangling_dependency() {
        let temp = assert_fs::TempDir::new().unwrap();
        let definition = temp.child("broken.json");
        definition
            .write_str(
                &json!({
                    "id": "broken",
                    "title": "Broken",
                    "questions": [
                        { "id": "a", "text": "A", "type": "text",
                          "depends_on": { "question_id": "zzz", "value": "sim" } }
                    ]
                })
                .to_string(),
            )
            .unwrap();
        intake(temp.path())
            .arg("check")
            .arg("--definition")
            .arg(definition.path())
            .assert()
            .failure();
    }

    #[test]
    fn flatten_fails_on_missing_answers_unless_allowed() {
        let temp = assert_fs::TempDir::new().unwrap();
        let definition = temp.child("triagem.json");
        definition.write_str(TRIAGEM).unwrap();
        let answers = temp.child("answers.json");
        answers
            .write_str(r#"{"cirurgia":"sim","cirurgiaTempo":"2 anos"}"#)
            .unwrap();

        intake(temp.path())
            .args(["flatten", "--definition"])
            .arg(definition.path())
            .arg("--answers")
            .arg(answers.path())
            .assert()
            .failure();

        let output = intake(temp.path())
            .args(["flatten", "--allow-incomplete", "--definition"])
            .arg(definition.path())
            .arg("--answers")
            .arg(answers.path())
            .output()
            .unwrap();
        assert!(output.status.success());
        let entries = stdout_json(&output);
        let ids: Vec<&str> = entries
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["questionId"].as_str().unwrap())
            .filter(|id| id.starts_with("cirurgia"))
            .collect();
        assert_eq!(ids, vec!["cirurgia", "cirurgiaTempo", "cirurgiaQual"]);
    }

    #[test]
    fn schema_prints_definition_format() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = intake(temp.path())
            .args(["schema", "--definition-format"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let schema = stdout_json(&output);
        assert!(schema["properties"].get("questions").is_some());
    }

    #[test]
    fn patch_reports_rejected_option() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = intake(temp.path())
            .args(["patch", "--question", "q1", "--value", r#""talvez""#])
            .output()
            .unwrap();
        assert!(!output.status.success());
        let response = stdout_json(&output);
        assert_eq!(response["validation"]["errors"][0]["code"], "invalid_option");
    }

    #[test]
    fn active_lists_opened_branch() {
        let temp = assert_fs::TempDir::new().unwrap();
        let answers = temp.child("answers.json");
        answers.write_str(r#"{"q1":"yes"}"#).unwrap();
        let output = intake(temp.path())
            .arg("active")
            .arg("--answers")
            .arg(answers.path())
            .output()
            .unwrap();
        assert!(output.status.success());
        let response = stdout_json(&output);
        assert_eq!(response["questions"][1]["id"], "q1_details");
    }

    #[test]
    fn records_submit_show_update_and_delete() {
        let temp = assert_fs::TempDir::new().unwrap();
        let data_dir = temp.child("data");
        let answers = temp.child("answers.json");
        answers
            .write_str(r#"{"q1":"yes","q1_details":"Crânio, 2020","q2":"no","q3":"na"}"#)
            .unwrap();
        let consent = temp.child("consent.json");
        consent.write_str(&consent_json()).unwrap();

        let output = intake(data_dir.path())
            .args(["records", "submit", "--ip", "10.0.0.7", "--answers"])
            .arg(answers.path())
            .arg("--consent")
            .arg(consent.path())
            .output()
            .unwrap();
        assert!(output.status.success());
        let record = stdout_json(&output);
        let id = record["id"].as_str().unwrap().to_string();
        assert_eq!(record["consent"]["cpf"], "123.456.789-09");
        assert!(data_dir.child("savedForms.json").path().exists());

        let output = intake(data_dir.path())
            .args(["records", "show", &id])
            .output()
            .unwrap();
        assert!(output.status.success());
        let preview = String::from_utf8(output.stdout).unwrap();
        assert!(preview.contains("Crânio, 2020"));
        assert!(preview.contains("  Sim\n"));

        answers
            .write_str(r#"{"q1":"no","q1_details":"stale","q2":"no","q3":"yes"}"#)
            .unwrap();
        let output = intake(data_dir.path())
            .args(["records", "submit", "--id", &id, "--answers"])
            .arg(answers.path())
            .arg("--consent")
            .arg(consent.path())
            .output()
            .unwrap();
        assert!(output.status.success());
        let updated = stdout_json(&output);
        assert_eq!(updated["id"], id.as_str());
        assert_eq!(updated["createdAt"], record["createdAt"]);
        let ids: Vec<&str> = updated["responses"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["questionId"].as_str().unwrap())
            .collect();
        assert!(!ids.contains(&"q1_details"));

        let output = intake(data_dir.path())
            .args(["records", "list", "--questionnaire", "tomo*", "--json"])
            .output()
            .unwrap();
        assert_eq!(stdout_json(&output).as_array().unwrap().len(), 1);

        let output = intake(data_dir.path())
            .args(["records", "list", "--questionnaire", "mamo*", "--json"])
            .output()
            .unwrap();
        assert!(stdout_json(&output).as_array().unwrap().is_empty());

        intake(data_dir.path())
            .args(["records", "delete", &id])
            .assert()
            .success();
        intake(data_dir.path())
            .args(["records", "show", &id])
            .assert()
            .failure();
        intake(data_dir.path())
            .args(["records", "delete", &id])
            .assert()
            .success();
    }

    #[test]
    fn logging_defaults_to_info_and_honours_rust_log_off() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = intake(temp.path())
            .env_remove("RUST_LOG")
            .args(["records", "delete", "1760000000000-deadbeef"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let logs = String::from_utf8(output.stderr).unwrap();
        assert!(logs.contains("delete requested"));

        let output = intake(temp.path())
            .args(["records", "delete", "1760000000000-deadbeef"])
            .output()
            .unwrap();
        assert!(output.status.success());
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn records_keep_responsible_technicians_across_edits() {
        let temp = assert_fs::TempDir::new().unwrap();
        let answers = temp.child("answers.json");
        answers
            .write_str(r#"{"q1":"no","q2":"no","q3":"na"}"#)
            .unwrap();
        let consent = temp.child("consent.json");
        consent.write_str(&consent_json()).unwrap();

        let output = intake(temp.path())
            .args(["records", "submit", "--answers"])
            .arg(answers.path())
            .arg("--consent")
            .arg(consent.path())
            .args([
                "--radiology-technician",
                "rad1=Alisson (CRTR-12345)",
                "--nursing-technician",
                "nurse1=Ana Silva (COREN-54321)",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());
        let record = stdout_json(&output);
        let id = record["id"].as_str().unwrap().to_string();
        assert_eq!(record["radiologyTechnician"]["id"], "rad1");
        assert_eq!(record["nursingTechnician"]["label"], "Ana Silva (COREN-54321)");

        let output = intake(temp.path())
            .args(["records", "submit", "--id", &id, "--answers"])
            .arg(answers.path())
            .arg("--consent")
            .arg(consent.path())
            .args(["--nursing-technician", "nurse2=Beatriz Souza (COREN-98765)"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let updated = stdout_json(&output);
        assert_eq!(updated["radiologyTechnician"]["id"], "rad1");
        assert_eq!(updated["nursingTechnician"]["id"], "nurse2");

        let output = intake(temp.path())
            .args(["records", "show", &id])
            .output()
            .unwrap();
        let preview = String::from_utf8(output.stdout).unwrap();
        assert!(preview.contains("Técnico de radiologia: Alisson (CRTR-12345)"));
        assert!(preview.contains("Técnico de enfermagem: Beatriz Souza (COREN-98765)"));
    }

    #[test]
    fn records_submit_blocks_invalid_consent_and_answers() {
        let temp = assert_fs::TempDir::new().unwrap();
        let answers = temp.child("answers.json");
        answers.write_str(r#"{"q1":"yes"}"#).unwrap();
        let consent = temp.child("consent.json");
        consent.write_str(&consent_json()).unwrap();

        intake(temp.path())
            .args(["records", "submit", "--answers"])
            .arg(answers.path())
            .arg("--consent")
            .arg(consent.path())
            .assert()
            .failure();

        answers
            .write_str(r#"{"q1":"no","q2":"no","q3":"na"}"#)
            .unwrap();
        consent
            .write_str(r#"{"signature":"abc","cpf":"123","rg":"","birthDate":"01021990"}"#)
            .unwrap();
        intake(temp.path())
            .args(["records", "submit", "--answers"])
            .arg(answers.path())
            .arg("--consent")
            .arg(consent.path())
            .assert()
            .failure();

        let output = intake(temp.path())
            .args(["records", "list", "--json"])
            .output()
            .unwrap();
        assert!(stdout_json(&output).as_array().unwrap().is_empty());
    }

    #[test]
    fn cbor_store_format_is_selectable() {
        let temp = assert_fs::TempDir::new().unwrap();
        let answers = temp.child("answers.json");
        answers
            .write_str(r#"{"q1":"no","q2":"no","q3":"na"}"#)
            .unwrap();
        let consent = temp.child("consent.json");
        consent.write_str(&consent_json()).unwrap();

        intake(temp.path())
            .args(["--store-format", "cbor", "records", "submit", "--answers"])
            .arg(answers.path())
            .arg("--consent")
            .arg(consent.path())
            .assert()
            .success();
        assert!(temp.child("savedForms.cbor").path().exists());
    }
}
