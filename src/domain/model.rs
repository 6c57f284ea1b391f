use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub type JsonObject = serde_json::Map<String, Value>;

/// One applicant's submission paired with the fields of the application
/// (form) it was submitted against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub application: JsonObject,
    pub data: JsonObject,
}

/// Everything pulled from the API in one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionBatch {
    pub form_name: Option<String>,
    pub submissions: Vec<Submission>,
}

/// Ids arrive as strings or bare numbers depending on the form.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|id| match id {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(default, deserialize_with = "id_as_string")]
    pub section_id: Option<String>,
    pub section_title: Option<String>,
    pub questions: Option<Vec<Question>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default, deserialize_with = "id_as_string")]
    pub question_id: Option<String>,
    pub question_title: Option<String>,
    #[serde(default)]
    pub question_response: Value,
}

/// Columns contributed by a single form section, in form order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionBlock {
    pub separator: Option<String>,
    pub columns: Vec<String>,
}

/// A flattened submission before it is aligned to the shared header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRow {
    pub meta: HashMap<String, String>,
    pub answers: HashMap<String, String>,
    pub blocks: Vec<SectionBlock>,
}

impl ExtractedRow {
    /// Answers shadow metadata when a question shares a metadata column name.
    pub fn value(&self, column: &str) -> Option<&str> {
        self.answers
            .get(column)
            .or_else(|| self.meta.get(column))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub table: CsvTable,
    pub dropped_columns: Vec<String>,
    pub form_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowOptions {
    pub include_question_id: bool,
    pub prefix_section: bool,
    pub section_separators: bool,
}

impl Default for RowOptions {
    fn default() -> Self {
        Self {
            include_question_id: false,
            prefix_section: false,
            section_separators: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Extra attempts after the first one, transient failures only.
    pub retries: u32,
    pub retry_backoff: Duration,
    pub retry_backoff_cap: Duration,
    pub page_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retries: 0,
            retry_backoff: Duration::from_millis(400),
            retry_backoff_cap: Duration::from_secs(4),
            page_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_path: String,
    pub rows: usize,
    pub dropped_columns: usize,
    pub elapsed: Duration,
}
