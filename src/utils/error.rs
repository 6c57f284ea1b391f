use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API returned HTTP {status} for {url}: {body}")]
    HttpStatusError {
        status: u16,
        url: String,
        body: String,
    },

    #[error("API rejected the request as not authorized: {detail}")]
    UnauthorizedError { detail: String },

    #[error("Malformed API response: {message}")]
    InvalidResponseError { message: String },

    #[error("Unrecognised JSON shape for submissions")]
    UnrecognisedShapeError,

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Api,
    Data,
    Output,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Transient, a later run may succeed
    Medium,
    High,
    /// Local system failure
    Critical,
}

impl ErrorSeverity {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl ConvertError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConvertError::ApiError(_) => ErrorCategory::Network,
            ConvertError::HttpStatusError { .. } | ConvertError::UnauthorizedError { .. } => {
                ErrorCategory::Api
            }
            ConvertError::InvalidResponseError { .. }
            | ConvertError::UnrecognisedShapeError => ErrorCategory::Data,
            ConvertError::CsvError(_) | ConvertError::IoError(_) => ErrorCategory::Output,
            ConvertError::UrlError(_)
            | ConvertError::InvalidConfigValueError { .. }
            | ConvertError::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        if self.is_retryable() {
            return ErrorSeverity::Medium;
        }
        match self.category() {
            ErrorCategory::Output => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Transport failures, timeouts, throttling and server-side errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConvertError::ApiError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ConvertError::HttpStatusError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ConvertError::ApiError(_) => {
                "Check network connectivity and --api-base, or raise --timeout-seconds / --retries"
            }
            ConvertError::HttpStatusError { status, .. } if *status >= 500 || *status == 429 => {
                "The API is unavailable or throttling requests; try again later or pass --retries"
            }
            ConvertError::HttpStatusError { .. } => {
                "Check --api-base, --submissions-path and --ggis-reference-number"
            }
            ConvertError::UnauthorizedError { .. } => {
                "Check that --api-key is valid for this GGIS reference number"
            }
            ConvertError::InvalidResponseError { .. }
            | ConvertError::UnrecognisedShapeError => {
                "The endpoint did not return submissions JSON; check --api-base and --submissions-path"
            }
            ConvertError::CsvError(_) | ConvertError::IoError(_) => {
                "Check that the output path is writable"
            }
            ConvertError::UrlError(_)
            | ConvertError::InvalidConfigValueError { .. }
            | ConvertError::MissingConfigError { .. } => "Run with --help to see the expected arguments",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach the API: {}", self),
            ErrorCategory::Api => format!("The API refused the request: {}", self),
            ErrorCategory::Data => format!("Could not read the API response: {}", self),
            ErrorCategory::Output => format!("Could not write the CSV output: {}", self),
            ErrorCategory::Configuration => format!("Invalid arguments: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
