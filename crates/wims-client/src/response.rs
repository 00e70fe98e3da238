//! Types which model the JSON payloads of the WIMS `adm/raw` responses.
//!
//! The server is loosely typed: numbers arrive as strings or numbers
//! depending on the job and the server version, and some property names are
//! known to carry stray whitespace. The deserializers here absorb that so
//! the rest of the crate only sees proper types.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Outcome of a class existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassCheck {
    Exists,
    /// The server answered coherently but refused the class; the message is
    /// its free-text explanation.
    Missing { message: String },
}

impl ClassCheck {
    pub fn exists(&self) -> bool {
        matches!(self, ClassCheck::Exists)
    }
}

/// One entry of a worksheet or exam index.
///
/// `state` is the raw server value (`"0"` in preparation, `"1"` active,
/// `"2"` expired); it is compared, never parsed, since servers have been
/// seen to grow new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSummary {
    pub title: String,
    pub state: String,
}

/// Properties of one worksheet, job `getsheet`.
#[derive(Debug, Clone, Deserialize)]
pub struct SheetProperties {
    #[serde(rename = "sheet_status", default, deserialize_with = "de::lenient_string")]
    pub status: String,
    #[serde(rename = "sheet_title", default, deserialize_with = "de::lenient_string")]
    pub title: String,
    #[serde(rename = "sheet_description", default, deserialize_with = "de::lenient_string")]
    pub description: String,
    #[serde(rename = "sheet_expiration", default, deserialize_with = "de::yyyymmdd")]
    pub expiration: Option<NaiveDate>,
}

/// Properties of one exam, job `getexam`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExamProperties {
    #[serde(rename = "exam_opening", default, deserialize_with = "de::lenient_string")]
    pub opening: String,
    #[serde(rename = "exam_status", default, deserialize_with = "de::lenient_string")]
    pub status: String,
    #[serde(rename = "exam_duration", default, deserialize_with = "de::lenient_u32")]
    pub duration: u32,
    #[serde(rename = "exam_attempts", default, deserialize_with = "de::lenient_u32")]
    pub attempts: u32,
    #[serde(rename = "exam_title", default, deserialize_with = "de::lenient_string")]
    pub title: String,
    #[serde(rename = "exam_description", default, deserialize_with = "de::lenient_string")]
    pub description: String,
    #[serde(rename = "exam_cut_hours", default, deserialize_with = "de::lenient_string")]
    pub cut_hours: String,
    // Older servers emit the field name with a trailing space.
    #[serde(
        rename = "exam_expiration",
        alias = "exam_expiration ",
        default,
        deserialize_with = "de::yyyymmdd"
    )]
    pub expiration: Option<NaiveDate>,
}

/// One row of a worksheet score snapshot, job `getsheetscores`. `id` is the
/// participant's remote login; `user_percent` their cumulated score in
/// percent.
#[derive(Debug, Clone, Deserialize)]
pub struct WorksheetScore {
    #[serde(deserialize_with = "de::lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub user_percent: f64,
}

/// One row of an exam score snapshot, job `getexamscores`. The score is
/// already on the 0..10 scale.
#[derive(Debug, Clone, Deserialize)]
pub struct ExamScore {
    #[serde(deserialize_with = "de::lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub score: f64,
}

/// Yearly class backups available on the server, job `listbackups`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupInventory {
    #[serde(default, deserialize_with = "de::lenient_string_vec")]
    pub restorable: Vec<String>,
    #[serde(default, deserialize_with = "de::lenient_u32")]
    pub total: u32,
}

/// Payload of job `addclass`.
#[derive(Debug, Deserialize)]
pub(crate) struct AddedClass {
    #[serde(deserialize_with = "de::lenient_string")]
    pub class_id: String,
}

/// Payload of job `authuser`.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthorizedSession {
    pub home_url: String,
}

/// Payload of job `listsheets`.
#[derive(Debug, Deserialize)]
pub(crate) struct WorksheetIndex {
    #[serde(default, deserialize_with = "de::lenient_u32")]
    pub nbsheet: u32,
    #[serde(default, deserialize_with = "de::lenient_u32_vec")]
    pub sheetlist: Vec<u32>,
    #[serde(default, deserialize_with = "de::lenient_string_vec")]
    pub sheettitlelist: Vec<String>,
}

/// Payload of job `listexams`.
#[derive(Debug, Deserialize)]
pub(crate) struct ExamIndex {
    #[serde(default, deserialize_with = "de::lenient_u32")]
    pub nbexam: u32,
    #[serde(default, deserialize_with = "de::lenient_u32_vec")]
    pub examlist: Vec<u32>,
    #[serde(default, deserialize_with = "de::lenient_string_vec")]
    pub examtitlelist: Vec<String>,
}

/// Payload wrapper for the two score jobs.
#[derive(Debug, Deserialize)]
pub(crate) struct ScoreRows<T> {
    #[serde(default = "Vec::new")]
    pub data_scores: Vec<T>,
}

/// Splits a raw `"<n> : <title> : <state>"` index entry into its title and
/// state parts. The leading part is positional noise and is discarded.
pub(crate) fn split_title_entry(raw: &str) -> SheetSummary {
    let mut parts = raw.split(':');
    let _ = parts.next();
    let title = parts.next().unwrap_or("").trim().to_string();
    let state = parts.next().unwrap_or("").trim().to_string();
    SheetSummary { title, state }
}

/// Zips an id list with its raw title list into an ordered index.
pub(crate) fn zip_index(ids: Vec<u32>, raw_titles: Vec<String>) -> BTreeMap<u32, SheetSummary> {
    ids.into_iter()
        .zip(raw_titles)
        .map(|(id, raw)| (id, split_title_entry(&raw)))
        .collect()
}

/// Removes protocol bookkeeping keys a config payload carries along.
pub(crate) fn strip_keys(mut payload: Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    for key in keys {
        payload.remove(*key);
    }
    payload
}

pub(crate) mod de {
    //! Lenient deserializers for the server's string-or-number fields.

    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Num(f64),
        Str(String),
    }

    impl Loose {
        fn into_string(self) -> String {
            match self {
                // Integral values print without a trailing ".0".
                Loose::Num(n) if n.fract() == 0.0 => (n as i64).to_string(),
                Loose::Num(n) => n.to_string(),
                Loose::Str(s) => s,
            }
        }

        fn as_f64<E: serde::de::Error>(&self) -> Result<f64, E> {
            match self {
                Loose::Num(n) => Ok(*n),
                Loose::Str(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| E::custom(format!("not a number: {s:?}"))),
            }
        }
    }

    pub fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Loose::deserialize(d)?.into_string())
    }

    pub fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(Loose::deserialize(d)?.as_f64::<D::Error>()? as u32)
    }

    pub fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Loose::deserialize(d)?.as_f64::<D::Error>()
    }

    pub fn lenient_u32_vec<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u32>, D::Error> {
        let items = Vec::<Loose>::deserialize(d)?;
        items
            .into_iter()
            .map(|item| Ok(item.as_f64::<D::Error>()? as u32))
            .collect()
    }

    pub fn lenient_string_vec<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let items = Vec::<Loose>::deserialize(d)?;
        Ok(items.into_iter().map(Loose::into_string).collect())
    }

    /// Parses the `yyyymmdd` dates WIMS uses for expirations. Absent, empty
    /// and malformed values all map to `None`; an unreadable date is not
    /// worth failing a whole response over.
    pub fn yyyymmdd<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<Loose>::deserialize(d)?;
        Ok(raw
            .map(Loose::into_string)
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()))
    }
}
