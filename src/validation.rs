use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "jpg", "jpeg", "png"];

static ROL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]-\d{1,4}-\d{4}$").expect("valid rol pattern"));
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern")
});

/// Field-level input error, reported back to the caller before anything is
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trims and upper-cases a docket number and checks the `X-123-2024` shape.
pub fn normalize_rol(raw: &str) -> ValidationResult<String> {
    let rol = raw.trim().to_uppercase();
    if rol.is_empty() {
        return Err(ValidationError::new("rol", "rol is required"));
    }
    if !ROL_PATTERN.is_match(&rol) {
        return Err(ValidationError::new(
            "rol",
            format!("'{rol}' does not match the format LETTER-NUMBER-YEAR (e.g. C-123-2024)"),
        ));
    }
    Ok(rol)
}

pub fn required_text(field: &'static str, raw: &str, max_len: usize) -> ValidationResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("{field} must be at most {max_len} characters"),
        ));
    }
    Ok(value.to_string())
}

pub fn optional_text(
    field: &'static str,
    raw: Option<&str>,
    max_len: Option<usize>,
) -> ValidationResult<Option<String>> {
    let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if let Some(max_len) = max_len {
        if value.chars().count() > max_len {
            return Err(ValidationError::new(
                field,
                format!("{field} must be at most {max_len} characters"),
            ));
        }
    }
    Ok(Some(value.to_string()))
}

pub fn optional_email(field: &'static str, raw: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if value.len() > 254 || !EMAIL_PATTERN.is_match(value) {
        return Err(ValidationError::new(
            field,
            format!("'{value}' is not a valid email address"),
        ));
    }
    Ok(Some(value.to_string()))
}

/// Parses a coded value (case type, status, ...) reported against `field`.
pub fn parse_code<T>(field: &'static str, raw: &str) -> ValidationResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|err| ValidationError::new(field, err.to_string()))
}

#[derive(Debug, Clone, Copy)]
pub struct CaseDates {
    pub filed_on: NaiveDate,
    pub due_on: NaiveDate,
    pub notified_on: Option<NaiveDate>,
}

/// Date rules for a case. `check_due_not_past` is false on edits that leave
/// the due date untouched, so an overdue case can still be edited.
pub fn validate_case_dates(
    dates: CaseDates,
    today: NaiveDate,
    check_due_not_past: bool,
) -> ValidationResult<()> {
    if dates.filed_on > today {
        return Err(ValidationError::new(
            "filed_on",
            "filing date cannot be in the future",
        ));
    }
    if check_due_not_past && dates.due_on < today {
        return Err(ValidationError::new(
            "due_on",
            "due date cannot be in the past",
        ));
    }
    if dates.due_on <= dates.filed_on {
        return Err(ValidationError::new(
            "due_on",
            "due date must be after the filing date",
        ));
    }
    if let Some(notified_on) = dates.notified_on {
        if notified_on < dates.filed_on {
            return Err(ValidationError::new(
                "notified_on",
                "notification date cannot be before the filing date",
            ));
        }
    }
    Ok(())
}

pub fn validate_fire_at(fire_at: NaiveDateTime, now: NaiveDateTime) -> ValidationResult<()> {
    if fire_at < now {
        return Err(ValidationError::new(
            "fire_at",
            "alert time cannot be in the past",
        ));
    }
    Ok(())
}

pub fn validate_date_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ValidationResult<()> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(ValidationError::new(
                "due_from",
                "'from' date cannot be after the 'to' date",
            ));
        }
    }
    Ok(())
}

/// Checks size and extension of an uploaded document and returns the
/// lower-cased extension.
pub fn validate_document_upload(filename: &str, size: usize) -> ValidationResult<String> {
    if size == 0 {
        return Err(ValidationError::new("file", "file must not be empty"));
    }
    if size > MAX_DOCUMENT_BYTES {
        return Err(ValidationError::new("file", "file cannot be larger than 10MB"));
    }
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::new(
            "file",
            format!(
                "extension '{extension}' is not allowed; allowed: {}",
                ALLOWED_DOCUMENT_EXTENSIONS.join(", ")
            ),
        ));
    }
    Ok(extension)
}
