use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DATA_URI_PREFIX: &str = "data:image";
const PNG_DATA_URI: &str = "data:image/png;base64,";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsentError {
    #[error("signature is required")]
    MissingSignature,
    #[error("CPF must contain 11 digits, got {0}")]
    InvalidCpf(usize),
    #[error("birth date must contain 8 digits (DDMMYYYY), got {0}")]
    BirthDateLength(usize),
    #[error("birth date '{0}' is not a calendar date")]
    InvalidBirthDate(String),
}

/// Identification and signature captured on the consent screen.
///
/// `signature_ref` is an opaque image-encoded payload from the capture widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    #[serde(alias = "signature")]
    pub signature_ref: String,
    pub cpf: String,
    pub rg: String,
    pub birth_date: String,
}

static NON_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^0-9]").expect("static digit pattern"));

fn digits(value: &str) -> String {
    NON_DIGITS.replace_all(value, "").into_owned()
}

impl Consent {
    /// Canonical form: CPF as `000.000.000-00`, birth date as `DD/MM/YYYY`, trimmed RG.
    pub fn normalized(&self) -> Result<Self, ConsentError> {
        if self.signature_ref.trim().is_empty() {
            return Err(ConsentError::MissingSignature);
        }

        let cpf = digits(&self.cpf);
        if cpf.len() != 11 {
            return Err(ConsentError::InvalidCpf(cpf.len()));
        }

        let birth = digits(&self.birth_date);
        if birth.len() != 8 {
            return Err(ConsentError::BirthDateLength(birth.len()));
        }
        let (day, month, year) = (&birth[0..2], &birth[2..4], &birth[4..8]);
        let valid_date = match (day.parse::<u32>(), month.parse::<u32>(), year.parse::<i32>()) {
            (Ok(d), Ok(m), Ok(y)) => NaiveDate::from_ymd_opt(y, m, d).is_some(),
            _ => false,
        };
        if !valid_date {
            return Err(ConsentError::InvalidBirthDate(self.birth_date.clone()));
        }

        Ok(Self {
            signature_ref: self.signature_ref.trim().to_string(),
            cpf: format!("{}.{}.{}-{}", &cpf[0..3], &cpf[3..6], &cpf[6..9], &cpf[9..11]),
            rg: self.rg.trim().to_string(),
            birth_date: format!("{}/{}/{}", day, month, year),
        })
    }

    /// Signature as an embeddable `data:` URI.
    pub fn signature_data_uri(&self) -> String {
        if self.signature_ref.starts_with(DATA_URI_PREFIX) {
            self.signature_ref.clone()
        } else {
            format!("{}{}", PNG_DATA_URI, self.signature_ref)
        }
    }
}
