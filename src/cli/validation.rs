use thiserror::Error;

use crate::cli::args::CliArgs;
use crate::output::OutputFormat;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("expected a row count, got '{raw}'")]
    NotANumber { raw: String },

    #[error("row count must be positive, got {value}")]
    NotPositive { value: i64 },

    #[error("row count {value} is too large")]
    TooLarge { value: i64 },
}

/// Parses a user-entered bulk selection quantity. Anything that is not a
/// positive integer is rejected.
pub fn parse_row_count(raw: &str) -> Result<u32, InputError> {
    let trimmed = raw.trim();
    let value = trimmed.parse::<i64>().map_err(|_| InputError::NotANumber {
        raw: trimmed.to_string(),
    })?;
    if value <= 0 {
        return Err(InputError::NotPositive { value });
    }
    u32::try_from(value).map_err(|_| InputError::TooLarge { value })
}

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.select.as_deref() {
        parse_row_count(raw).map_err(|e| format!("invalid --select '{raw}': {e}"))?;
    }
    if let Some(page) = args.page {
        if page == 0 {
            return Err("invalid page, expected positive integer".to_string());
        }
    }
    if let Some(total) = args.total_pages {
        if total == 0 {
            return Err("invalid total-pages, expected positive integer".to_string());
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid timeout, expected positive integer".to_string());
        }
    }
    if let Some(raw) = args.output_format.as_deref() {
        if OutputFormat::parse(raw).is_none() {
            return Err(format!("invalid --output-format '{raw}', expected text or json"));
        }
    }
    Ok(())
}
