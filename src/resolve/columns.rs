use crate::error::{AppError, ResourceKind, Result};
use crate::feeds::Row;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Human column name to list feed column tag, for one worksheet.
///
/// Built once per invocation and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: BTreeMap<String, String>,
}

impl ColumnMapping {
    /// Tags that double as their own names.
    pub fn identity<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = tags
            .into_iter()
            .map(|tag| {
                let tag: String = tag.into();
                (tag.clone(), tag)
            })
            .collect();
        Self { columns }
    }

    /// Build from (name, tag) pairs. Blank names are skipped; a name that
    /// appears twice is an error rather than silently shadowing a column.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut columns = BTreeMap::new();
        for (name, tag) in pairs {
            if name.trim().is_empty() {
                continue;
            }
            match columns.entry(name) {
                Entry::Occupied(entry) => {
                    return Err(AppError::DuplicateColumn(entry.key().clone()));
                }
                Entry::Vacant(entry) => {
                    entry.insert(tag);
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.columns.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// (name, tag) pairs sorted by name.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.columns
            .iter()
            .map(|(name, tag)| (name.clone(), tag.clone()))
            .collect()
    }

    /// Translate (column name, value) pairs into a tag-keyed row.
    pub fn to_row<I, N, V>(&self, values: I) -> Result<Row>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<String>,
    {
        values
            .into_iter()
            .map(|(name, value)| -> Result<(String, String)> {
                let name = name.as_ref();
                let tag = self.tag(name).ok_or_else(|| AppError::NotFound {
                    kind: ResourceKind::Column,
                    hint: name.to_string(),
                })?;
                Ok((tag.to_string(), value.into()))
            })
            .collect()
    }
}

/// Tag the list feed derives from header text: lower-cased, with everything
/// but ASCII letters, digits, `-` and `.` removed.
pub fn derive_tag(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
        .flat_map(char::to_lowercase)
        .collect()
}
