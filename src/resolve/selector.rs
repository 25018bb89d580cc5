use crate::error::{AppError, Result};
use crate::feeds::NameId;
use std::fmt;

/// A user-supplied hint naming a spreadsheet or worksheet either by title or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Name(String),
    Id(String),
}

impl Selector {
    pub fn new(hint: impl Into<String>, is_id: bool) -> Self {
        match is_id {
            true => Selector::Id(hint.into()),
            false => Selector::Name(hint.into()),
        }
    }

    /// Build a selector from a pair of mutually exclusive name/id flags.
    pub fn from_flags(
        name: Option<&str>,
        id: Option<&str>,
        name_flag: &str,
        id_flag: &str,
    ) -> Result<Option<Self>> {
        match (name, id) {
            (Some(_), Some(_)) => Err(AppError::Validation(format!(
                "You must specify only one of {} or {}",
                name_flag, id_flag
            ))),
            (Some(name), None) => Ok(Some(Selector::new(name, false))),
            (None, Some(id)) => Ok(Some(Selector::new(id, true))),
            (None, None) => Ok(None),
        }
    }

    pub fn hint(&self) -> &str {
        match self {
            Selector::Name(hint) | Selector::Id(hint) => hint,
        }
    }

    pub fn matches(&self, entry: &NameId) -> bool {
        match self {
            Selector::Name(name) => &entry.name == name,
            Selector::Id(id) => &entry.id == id,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Name(name) => write!(f, "name '{}'", name),
            Selector::Id(id) => write!(f, "id '{}'", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_kind() {
        let entry = NameId::new("Budget", "key1");

        assert!(Selector::new("Budget", false).matches(&entry));
        assert!(!Selector::new("Budget", true).matches(&entry));
        assert!(Selector::new("key1", true).matches(&entry));
        assert!(!Selector::new("key1", false).matches(&entry));
    }

    #[test]
    fn test_from_flags() {
        assert_eq!(
            Selector::from_flags(Some("Budget"), None, "--name", "--key").unwrap(),
            Some(Selector::Name("Budget".to_string()))
        );
        assert_eq!(
            Selector::from_flags(None, Some("key1"), "--name", "--key").unwrap(),
            Some(Selector::Id("key1".to_string()))
        );
        assert_eq!(
            Selector::from_flags(None, None, "--name", "--key").unwrap(),
            None
        );

        let err = Selector::from_flags(Some("Budget"), Some("key1"), "--name", "--key").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("--name or --key"));
    }
}
