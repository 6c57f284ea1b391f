pub mod cli;

use crate::core::client::{DEFAULT_SUBMISSIONS_PATH, REFERENCE_PLACEHOLDER};
use crate::core::output::STDOUT_TARGET;
use crate::core::ConfigProvider;
use crate::domain::model::{FetchOptions, RowOptions};
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_contains_placeholder, validate_path, validate_positive_number,
    validate_required_string, validate_url, Validate,
};
use clap::Parser;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Parser)]
#[command(name = "find-a-grant-csv", version)]
#[command(about = "Fetch Find a Grant submissions for a GGIS reference number and write them to CSV")]
pub struct CliConfig {
    /// Output CSV path, `-` for stdout [default: <form_name>-YYYY-MM-DD.csv]
    pub output_csv: Option<String>,

    /// Base URL of the API, e.g. https://api.example.gov.uk
    #[arg(long)]
    pub api_base: String,

    /// Submissions endpoint path; must include {ggisReferenceNumber}
    #[arg(long, default_value = DEFAULT_SUBMISSIONS_PATH)]
    pub submissions_path: String,

    /// GGIS reference number of the grant scheme
    #[arg(long)]
    pub ggis_reference_number: String,

    /// API key sent in the x-api-key header
    #[arg(long, env = "FIND_A_GRANT_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, default_value = "60", help = "Per-request timeout in seconds")]
    pub timeout_seconds: u64,

    #[arg(long, default_value = "0", help = "Extra attempts for timeouts, 429 and 5xx responses")]
    pub retries: u32,

    #[arg(long, default_value = "500", help = "Pause between page requests in milliseconds")]
    pub page_delay_ms: u64,

    #[arg(long, help = "Keep columns whose value is the same in every row")]
    pub keep_constant_columns: bool,

    #[arg(long, help = "Suffix question columns with the question id")]
    pub include_question_id: bool,

    #[arg(long, help = "Prefix question columns with the section title")]
    pub prefix_section: bool,

    #[arg(long, help = "Omit the blank 'Section: <title>' separator columns")]
    pub no_section_separators: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit log lines as JSON")]
    pub log_json: bool,
}

impl CliConfig {
    pub fn writes_to_stdout(&self) -> bool {
        self.output_csv.as_deref() == Some(STDOUT_TARGET)
    }
}

// Hand-written so the API key never reaches the logs.
impl fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliConfig")
            .field("output_csv", &self.output_csv)
            .field("api_base", &self.api_base)
            .field("submissions_path", &self.submissions_path)
            .field("ggis_reference_number", &self.ggis_reference_number)
            .field("api_key", &"<redacted>")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retries", &self.retries)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("keep_constant_columns", &self.keep_constant_columns)
            .field("include_question_id", &self.include_question_id)
            .field("prefix_section", &self.prefix_section)
            .field("no_section_separators", &self.no_section_separators)
            .field("verbose", &self.verbose)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_url("api_base", &self.api_base)?;
        validate_required_string("ggis_reference_number", &self.ggis_reference_number)?;
        validate_required_string("api_key", &self.api_key)?;
        validate_contains_placeholder("submissions_path", &self.submissions_path, REFERENCE_PLACEHOLDER)?;
        validate_positive_number("timeout_seconds", self.timeout_seconds, 1)?;
        if let Some(path) = &self.output_csv {
            validate_path("output_csv", path)?;
        }
        Ok(())
    }
}

impl ConfigProvider for CliConfig {
    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn submissions_path(&self) -> &str {
        &self.submissions_path
    }

    fn ggis_reference_number(&self) -> &str {
        &self.ggis_reference_number
    }

    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn output_csv(&self) -> Option<&str> {
        self.output_csv.as_deref()
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.timeout_seconds),
            retries: self.retries,
            page_delay: Duration::from_millis(self.page_delay_ms),
            ..FetchOptions::default()
        }
    }

    fn row_options(&self) -> RowOptions {
        RowOptions {
            include_question_id: self.include_question_id,
            prefix_section: self.prefix_section,
            section_separators: !self.no_section_separators,
        }
    }

    fn drop_constant_columns(&self) -> bool {
        !self.keep_constant_columns
    }
}
