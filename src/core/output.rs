use crate::core::flatten::NON_ALPHANUMERIC;
use crate::domain::model::CsvTable;
use crate::utils::error::{ConvertError, Result};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

/// Output path meaning "write to standard output".
pub const STDOUT_TARGET: &str = "-";

const FALLBACK_STEM: &str = "applications";

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));

pub fn to_snake_case(name: &str) -> String {
    let underscored = NON_ALPHANUMERIC.replace_all(name, "_");
    let split = CAMEL_BOUNDARY.replace_all(&underscored, "${1}_${2}");
    split.trim_matches('_').to_lowercase()
}

/// `<snake_case form name>-YYYY-MM-DD.csv`
pub fn default_output_filename(form_name: Option<&str>, date: NaiveDate) -> String {
    let stem = form_name
        .map(to_snake_case)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());
    format!("{}-{}.csv", stem, date.format("%Y-%m-%d"))
}

pub fn encode_csv(table: &CsvTable) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b',')
        .from_writer(Vec::new());

    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| ConvertError::IoError(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Test Form"), "test_form");
        assert_eq!(to_snake_case("CommunityOwnershipFund"), "community_ownership_fund");
        assert_eq!(to_snake_case("  Levelling-Up (2025) "), "levelling_up_2025");
        assert_eq!(to_snake_case("***"), "");
    }

    #[test]
    fn test_default_output_filename() {
        assert_eq!(
            default_output_filename(Some("Test Form"), date()),
            "test_form-2025-03-07.csv"
        );
        assert_eq!(default_output_filename(None, date()), "applications-2025-03-07.csv");
        assert_eq!(default_output_filename(Some("!!"), date()), "applications-2025-03-07.csv");
    }

    #[test]
    fn test_encode_csv_quotes_and_round_trips() {
        let table = CsvTable {
            headers: vec!["submissionId".to_string(), "Project description".to_string()],
            rows: vec![
                vec!["S1".to_string(), "Parks, gardens and \"green\" spaces".to_string()],
                vec!["S2".to_string(), "line one\nline two".to_string()],
            ],
        };

        let bytes = encode_csv(&table).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("submissionId,Project description\n"));
        assert!(text.contains("\"Parks, gardens and \"\"green\"\" spaces\""));

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        assert_eq!(headers, table.headers);
        assert_eq!(rows, table.rows);
    }

    #[test]
    fn test_encode_csv_header_only() {
        let table = CsvTable {
            headers: vec!["a".to_string(), "b".to_string()],
            rows: vec![],
        };
        let text = String::from_utf8(encode_csv(&table).unwrap()).unwrap();
        assert_eq!(text, "a,b\n");
    }
}
