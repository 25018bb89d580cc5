mod client;
pub mod xml;

pub use client::FeedClient;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Column tag to value, the unit submitted to a list feed.
pub type Row = BTreeMap<String, String>;

/// Human-readable title and opaque id of a spreadsheet or worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameId {
    pub name: String,
    pub id: String,
}

impl NameId {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// One page of an enumeration feed, with the URL of the next page if any.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// A list feed row as (tag, value) pairs in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListEntry {
    pub values: Vec<(String, String)>,
}

impl ListEntry {
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(tag, _)| tag.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub text: String,
}

/// Row window of a list feed query. Indexes are 1-based over data rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListRange {
    pub start_index: Option<u32>,
    pub max_results: Option<u32>,
}

impl ListRange {
    pub fn single(start_index: u32) -> Self {
        Self {
            start_index: Some(start_index),
            max_results: Some(1),
        }
    }
}

#[async_trait]
pub trait FeedOperations {
    /// A page of the spreadsheets feed; `page_url` continues from a previous page.
    async fn spreadsheets_page(&self, page_url: Option<&str>) -> Result<FeedPage<NameId>>;

    async fn worksheets_page(
        &self,
        spreadsheet_id: &str,
        page_url: Option<&str>,
    ) -> Result<FeedPage<NameId>>;

    async fn list_entries(
        &self,
        spreadsheet_id: &str,
        worksheet_id: &str,
        range: ListRange,
    ) -> Result<Vec<ListEntry>>;

    /// Non-empty cells of one grid row, ordered by column.
    async fn row_cells(&self, spreadsheet_id: &str, worksheet_id: &str, row: u32)
    -> Result<Vec<Cell>>;

    async fn insert_row(&self, spreadsheet_id: &str, worksheet_id: &str, row: &Row) -> Result<()>;
}
