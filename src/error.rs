use std::fmt;
use thiserror::Error;

/// What a name/id hint was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Spreadsheet,
    Worksheet,
    Column,
    HeaderRow,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Spreadsheet => write!(f, "spreadsheet"),
            ResourceKind::Worksheet => write!(f, "worksheet"),
            ResourceKind::Column => write!(f, "column"),
            ResourceKind::HeaderRow => write!(f, "header row"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("OAuth authorization error: {0}")]
    Auth(String),

    #[error("Token store error: {0}")]
    Store(String),

    #[error("No {kind} matches '{hint}'")]
    NotFound { kind: ResourceKind, hint: String },

    #[error("{count} {kind}s match '{hint}', use an id to pick one")]
    AmbiguousMatch {
        kind: ResourceKind,
        hint: String,
        count: usize,
    },

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Header row names column '{0}' more than once")]
    DuplicateColumn(String),

    #[error("Spreadsheets feed error: {0}")]
    Feed(String),

    #[error("Malformed feed XML: {0}")]
    Xml(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<quick_xml::Error> for AppError {
    fn from(e: quick_xml::Error) -> Self {
        AppError::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for AppError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        AppError::Xml(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_errors_carry_hint() {
        let err = AppError::AmbiguousMatch {
            kind: ResourceKind::Spreadsheet,
            hint: "Budget".to_string(),
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "2 spreadsheets match 'Budget', use an id to pick one"
        );

        let err = AppError::NotFound {
            kind: ResourceKind::Worksheet,
            hint: "Q3".to_string(),
        };
        assert_eq!(err.to_string(), "No worksheet matches 'Q3'");
    }
}
