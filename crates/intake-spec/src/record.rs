use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consent::Consent;
use crate::flatten::ResponseList;

const MONTHS_PT: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

/// Store-assigned record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Device and network metadata printed at the top of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub date: String,
    pub time: String,
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub formatted: String,
}

impl RecordHeader {
    /// Header stamped with a local wall-clock time, e.g. `16 de outubro de 2026 às 14:05`.
    pub fn stamped(at: NaiveDateTime, ip: impl Into<String>) -> Self {
        let month = MONTHS_PT[at.month0() as usize];
        let time = at.format("%H:%M").to_string();
        Self {
            date: at.format("%d/%m/%Y").to_string(),
            formatted: format!("{:02} de {} de {} às {}", at.day(), month, at.year(), time),
            time,
            ip: ip.into(),
            mask: None,
            mac: None,
        }
    }
}

/// A professional responsible for part of the exam, e.g. `rad1` / `Alisson (CRTR-12345)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technician {
    pub id: String,
    pub label: String,
}

impl Technician {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Professionals attached to a record. Both are optional and omitted when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technicians {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radiology_technician: Option<Technician>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nursing_technician: Option<Technician>,
}

impl Technicians {
    pub fn is_empty(&self) -> bool {
        self.radiology_technician.is_none() && self.nursing_technician.is_none()
    }
}

/// A record that has not been persisted yet and therefore has no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecordDraft {
    pub created_at: DateTime<Utc>,
    pub header: RecordHeader,
    pub responses: ResponseList,
    pub consent: Consent,
    pub questionnaire_id: String,
    #[serde(flatten)]
    pub technicians: Technicians,
}

impl DocumentRecordDraft {
    pub fn into_record(self, id: RecordId) -> DocumentRecord {
        DocumentRecord {
            id,
            created_at: self.created_at,
            header: self.header,
            responses: self.responses,
            consent: self.consent,
            questionnaire_id: self.questionnaire_id,
            technicians: self.technicians,
        }
    }
}

/// The unit of persistence consumed verbatim by document renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub header: RecordHeader,
    pub responses: ResponseList,
    pub consent: Consent,
    pub questionnaire_id: String,
    #[serde(flatten)]
    pub technicians: Technicians,
}

impl DocumentRecord {
    pub fn into_draft(self) -> (RecordId, DocumentRecordDraft) {
        (
            self.id,
            DocumentRecordDraft {
                created_at: self.created_at,
                header: self.header,
                responses: self.responses,
                consent: self.consent,
                questionnaire_id: self.questionnaire_id,
                technicians: self.technicians,
            },
        )
    }
}
