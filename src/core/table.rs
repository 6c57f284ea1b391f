use crate::core::flatten::{cell_value, flatten, sanitize_col};
use crate::domain::model::{
    CsvTable, ExtractedRow, JsonObject, RowOptions, Section, SectionBlock, Submission,
};
use crate::utils::error::{ConvertError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

/// Application-level fields, in output order.
pub const APPLICATION_META_FIELDS: [&str; 5] = [
    "applicationFormName",
    "applicationFormVersion",
    "applicationId",
    "ggisReferenceNumber",
    "grantAdminEmailAddress",
];

/// Submission-level fields, in output order after the application fields.
pub const SUBMISSION_META_FIELDS: [&str; 4] = [
    "submissionId",
    "grantApplicantEmailAddress",
    "submittedTimeStamp",
    "gapId",
];

static SECTION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Section:\s").expect("valid regex"));

pub fn meta_columns() -> Vec<String> {
    APPLICATION_META_FIELDS
        .iter()
        .chain(SUBMISSION_META_FIELDS.iter())
        .map(|field| sanitize_col(field))
        .collect()
}

pub fn section_separator_header(section_title: &str) -> String {
    let title = section_title.trim();
    if title.is_empty() {
        "Section: Untitled Section".to_string()
    } else {
        format!("Section: {}", title)
    }
}

pub fn is_section_separator(column: &str) -> bool {
    SECTION_SEPARATOR.is_match(column)
}

pub fn build_header_name(
    question_title: &str,
    question_id: Option<&str>,
    section_title: &str,
    options: RowOptions,
) -> String {
    let label = if !question_title.is_empty() {
        question_title
    } else {
        question_id.filter(|id| !id.is_empty()).unwrap_or("question")
    };
    let mut name = sanitize_col(label);
    if options.prefix_section && !section_title.is_empty() {
        name = format!("{}__{}", sanitize_col(section_title), name);
    }
    if options.include_question_id {
        if let Some(id) = question_id.filter(|id| !id.is_empty()) {
            name = format!("{}__{}", name, sanitize_col(id));
        }
    }
    name
}

fn without_submissions(object: &JsonObject) -> JsonObject {
    object
        .iter()
        .filter(|(key, _)| key.as_str() != "submissions")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn push_submissions(application: &JsonObject, submissions: Option<&Value>, out: &mut Vec<Submission>) {
    let Some(Value::Array(items)) = submissions else {
        return;
    };
    for item in items {
        match item {
            Value::Object(data) => out.push(Submission {
                application: application.clone(),
                data: data.clone(),
            }),
            other => tracing::warn!("Skipping non-object submission entry: {}", other),
        }
    }
}

/// Pair every submission in an API document with its application fields.
pub fn coerce_submissions(doc: &Value) -> Result<Vec<Submission>> {
    let mut out = Vec::new();
    match doc {
        Value::Object(root) => match root.get("applications") {
            Some(Value::Array(applications)) => {
                for application in applications {
                    if let Value::Object(application) = application {
                        push_submissions(
                            &without_submissions(application),
                            application.get("submissions"),
                            &mut out,
                        );
                    }
                }
            }
            Some(Value::Object(application)) => push_submissions(
                &without_submissions(application),
                application.get("submissions"),
                &mut out,
            ),
            _ if matches!(root.get("submissions"), Some(Value::Array(_))) => {
                push_submissions(&without_submissions(root), root.get("submissions"), &mut out)
            }
            _ if root.contains_key("submissionId") || root.contains_key("sections") => {
                out.push(Submission {
                    application: JsonObject::new(),
                    data: root.clone(),
                })
            }
            _ => return Err(ConvertError::UnrecognisedShapeError),
        },
        Value::Array(_) => push_submissions(&JsonObject::new(), Some(doc), &mut out),
        _ => return Err(ConvertError::UnrecognisedShapeError),
    }
    Ok(out)
}

/// Form name of the first application in the document, if any.
pub fn form_name(doc: &Value) -> Option<String> {
    let applications = doc.get("applications")?;
    let application = match applications {
        Value::Array(items) => items.first()?,
        Value::Object(_) => applications,
        _ => return None,
    };
    application
        .get("applicationFormName")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
}

fn parse_sections(data: &JsonObject) -> Result<Vec<Section>> {
    match data.get("sections") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(sections) => serde_json::from_value::<Option<Vec<Section>>>(sections.clone())
            .map(Option::unwrap_or_default)
            .map_err(|e| ConvertError::InvalidResponseError {
                message: format!("submission sections could not be read: {}", e),
            }),
    }
}

pub fn extract_row(submission: &Submission, options: RowOptions) -> Result<ExtractedRow> {
    let mut row = ExtractedRow::default();

    for field in APPLICATION_META_FIELDS {
        if let Some(value) = submission.application.get(field) {
            row.meta.insert(sanitize_col(field), cell_value(value));
        }
    }
    for field in SUBMISSION_META_FIELDS.iter().chain(APPLICATION_META_FIELDS.iter()) {
        if let Some(value) = submission.data.get(*field) {
            row.meta.insert(sanitize_col(field), cell_value(value));
        }
    }

    for section in parse_sections(&submission.data)? {
        let title = section
            .section_title
            .filter(|t| !t.is_empty())
            .or(section.section_id)
            .unwrap_or_default();
        let separator = options
            .section_separators
            .then(|| section_separator_header(&title));
        if let Some(separator) = &separator {
            row.answers.entry(separator.clone()).or_default();
        }

        let mut columns = Vec::new();
        for question in section.questions.unwrap_or_default() {
            let question_title = question.question_title.as_deref().unwrap_or("").trim();
            let question_id = question.question_id.as_deref();
            let col = build_header_name(question_title, question_id, &title, options);

            match &question.question_response {
                response @ (Value::Object(_) | Value::Array(_)) => {
                    for (flat_col, cell) in flatten(&col, response) {
                        row.answers.insert(flat_col.clone(), cell);
                        columns.push(flat_col);
                    }
                }
                response => {
                    let col = if row.answers.contains_key(&col) && !options.include_question_id {
                        let suffix = question_id
                            .filter(|id| !id.is_empty())
                            .map(sanitize_col)
                            .unwrap_or_else(|| "dup".to_string());
                        format!("{}__{}", col, suffix)
                    } else {
                        col
                    };
                    row.answers.insert(col.clone(), cell_value(response));
                    columns.push(col);
                }
            }
        }

        row.blocks.push(SectionBlock { separator, columns });
    }

    Ok(row)
}

/// Header order: meta columns, then section separators and question columns
/// in the order they are first met, then any stragglers sorted by name.
pub fn build_headers(rows: &[ExtractedRow]) -> Vec<String> {
    let mut headers = meta_columns();
    let mut seen: HashSet<String> = headers.iter().cloned().collect();

    for row in rows {
        for block in &row.blocks {
            for column in block.separator.iter().chain(block.columns.iter()) {
                if seen.insert(column.clone()) {
                    headers.push(column.clone());
                }
            }
        }
    }

    let stragglers: BTreeSet<&String> = rows
        .iter()
        .flat_map(|row| row.meta.keys().chain(row.answers.keys()))
        .filter(|column| !seen.contains(*column))
        .collect();
    headers.extend(stragglers.into_iter().cloned());
    headers
}

pub fn build_table(submissions: &[Submission], options: RowOptions) -> Result<CsvTable> {
    let extracted = submissions
        .iter()
        .map(|submission| extract_row(submission, options))
        .collect::<Result<Vec<_>>>()?;

    let headers = build_headers(&extracted);
    let rows = extracted
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| row.value(h).unwrap_or_default().to_string())
                .collect()
        })
        .collect();

    Ok(CsvTable { headers, rows })
}

/// Remove columns holding the same value in every row. Section separators
/// always survive. Tables with fewer than two rows are left untouched.
pub fn drop_constant_columns(table: CsvTable) -> (CsvTable, Vec<String>) {
    if table.rows.len() < 2 {
        return (table, Vec::new());
    }

    let keep: Vec<bool> = table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            is_section_separator(header) || {
                let first = &table.rows[0][idx];
                table.rows.iter().any(|row| &row[idx] != first)
            }
        })
        .collect();

    let dropped = table
        .headers
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| !**kept)
        .map(|(header, _)| header.clone())
        .collect();

    let retain = |cells: Vec<String>| -> Vec<String> {
        cells
            .into_iter()
            .zip(&keep)
            .filter_map(|(cell, kept)| kept.then_some(cell))
            .collect()
    };

    let table = CsvTable {
        headers: retain(table.headers),
        rows: table.rows.into_iter().map(retain).collect(),
    };
    (table, dropped)
}
