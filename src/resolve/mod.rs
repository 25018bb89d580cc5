mod columns;
mod selector;

pub use columns::{ColumnMapping, derive_tag};
pub use selector::Selector;

use crate::error::{AppError, ResourceKind, Result};
use crate::feeds::{Cell, FeedOperations, FeedPage, ListRange, NameId};
use futures::stream::{self, Stream, TryStreamExt};
use futures::future;
use std::pin::pin;
use tracing::{debug, instrument, warn};

/// Grid row holding the headers the list feed derives its tags from.
const IMPLICIT_HEADER_ROW: u32 = 1;

#[derive(Debug, Clone, Copy)]
enum Collection<'a> {
    Spreadsheets,
    Worksheets { spreadsheet_id: &'a str },
}

/// Turns user-supplied names and ids into the identifiers the feeds need.
pub struct Resolver<'a, F> {
    feeds: &'a F,
}

impl<'a, F> Resolver<'a, F>
where
    F: FeedOperations + Sync,
{
    pub fn new(feeds: &'a F) -> Self {
        Self { feeds }
    }

    /// Lazily enumerate the spreadsheets visible to the credential, keeping
    /// those matched by `selector`. Pages are fetched only as the stream is
    /// consumed.
    pub fn list_spreadsheets<'s>(
        &'s self,
        selector: Option<&'s Selector>,
    ) -> impl Stream<Item = Result<NameId>> + 's {
        filtered(self.enumerate(Collection::Spreadsheets), selector)
    }

    /// Lazily enumerate the worksheets of one spreadsheet.
    pub fn list_worksheets<'s>(
        &'s self,
        spreadsheet_id: &'s str,
        selector: Option<&'s Selector>,
    ) -> impl Stream<Item = Result<NameId>> + 's {
        filtered(
            self.enumerate(Collection::Worksheets { spreadsheet_id }),
            selector,
        )
    }

    /// Resolve a spreadsheet selector to exactly one spreadsheet.
    ///
    /// An id is trusted as-is unless `lookup_names` asks for its title.
    #[instrument(name = "Resolving spreadsheet", skip(self))]
    pub async fn resolve_spreadsheet(
        &self,
        selector: &Selector,
        lookup_names: bool,
    ) -> Result<NameId> {
        if let Selector::Id(id) = selector {
            if !lookup_names {
                return Ok(NameId::new(id.as_str(), id.as_str()));
            }
        }

        exactly_one(
            self.list_spreadsheets(Some(selector)),
            ResourceKind::Spreadsheet,
            selector.hint(),
        )
        .await
    }

    /// Resolve a worksheet selector within a spreadsheet. Without a selector
    /// the first worksheet is used.
    #[instrument(name = "Resolving worksheet", skip(self))]
    pub async fn resolve_worksheet(
        &self,
        spreadsheet_id: &str,
        selector: Option<&Selector>,
        lookup_names: bool,
    ) -> Result<NameId> {
        match selector {
            Some(Selector::Id(id)) if !lookup_names => Ok(NameId::new(id.as_str(), id.as_str())),
            Some(selector) => {
                exactly_one(
                    self.list_worksheets(spreadsheet_id, Some(selector)),
                    ResourceKind::Worksheet,
                    selector.hint(),
                )
                .await
            }
            None => {
                let mut worksheets = pin!(self.list_worksheets(spreadsheet_id, None));
                let first = worksheets.try_next().await?;
                first.ok_or_else(|| AppError::NotFound {
                    kind: ResourceKind::Worksheet,
                    hint: format!("first worksheet of {}", spreadsheet_id),
                })
            }
        }
    }

    /// Build the column name to tag mapping for a worksheet.
    ///
    /// Without `header_row` the tags name themselves. Row 1 pairs each of the
    /// grid's header cells with the tag of its column. Any later row is read as a
    /// list feed row whose values name the column of their own tag.
    #[instrument(name = "Building column mapping", skip(self))]
    pub async fn build_column_mapping(
        &self,
        spreadsheet_id: &str,
        worksheet_id: &str,
        header_row: Option<u32>,
    ) -> Result<ColumnMapping> {
        let mapping = match header_row {
            None => {
                let tags = self.native_tags(spreadsheet_id, worksheet_id).await?;
                ColumnMapping::identity(tags)
            }
            Some(0) => {
                return Err(AppError::Validation(
                    "Header row numbers start at 1".to_string(),
                ));
            }
            Some(IMPLICIT_HEADER_ROW) => {
                let cells = self
                    .feeds
                    .row_cells(spreadsheet_id, worksheet_id, IMPLICIT_HEADER_ROW)
                    .await?;
                let tags = self.first_entry_tags(spreadsheet_id, worksheet_id).await?;
                ColumnMapping::from_pairs(header_pairs(cells, &tags))?
            }
            Some(row) => {
                // Data row n of the grid is entry n - 1 of the list feed
                let entry = self
                    .feeds
                    .list_entries(spreadsheet_id, worksheet_id, ListRange::single(row - 1))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| AppError::NotFound {
                        kind: ResourceKind::HeaderRow,
                        hint: row.to_string(),
                    })?;
                ColumnMapping::from_pairs(entry.values.into_iter().map(|(tag, name)| (name, tag)))?
            }
        };

        if mapping.is_empty() {
            warn!("Worksheet has no named columns");
        }
        Ok(mapping)
    }

    /// Column (name, tag) pairs sorted by name, from `mapping` when one was
    /// built, otherwise from the worksheet's own tags.
    pub async fn list_columns(
        &self,
        spreadsheet_id: &str,
        worksheet_id: &str,
        mapping: Option<&ColumnMapping>,
    ) -> Result<Vec<(String, String)>> {
        if let Some(mapping) = mapping {
            return Ok(mapping.entries());
        }

        let mut columns: Vec<(String, String)> = self
            .first_entry_tags(spreadsheet_id, worksheet_id)
            .await?
            .into_iter()
            .map(|tag| (tag.clone(), tag))
            .collect();
        columns.sort();
        Ok(columns)
    }

    async fn first_entry_tags(&self, spreadsheet_id: &str, worksheet_id: &str) -> Result<Vec<String>> {
        let entries = self
            .feeds
            .list_entries(spreadsheet_id, worksheet_id, ListRange::single(1))
            .await?;

        Ok(entries
            .first()
            .map(|entry| entry.tags().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Tags of the worksheet's columns. A worksheet without data rows has no
    /// list entry to read them from, so they are derived from the header cells.
    async fn native_tags(&self, spreadsheet_id: &str, worksheet_id: &str) -> Result<Vec<String>> {
        let tags = self.first_entry_tags(spreadsheet_id, worksheet_id).await?;
        if !tags.is_empty() {
            return Ok(tags);
        }

        debug!("Worksheet has no data rows, deriving tags from header cells");
        let cells = self
            .feeds
            .row_cells(spreadsheet_id, worksheet_id, IMPLICIT_HEADER_ROW)
            .await?;
        Ok(cells
            .iter()
            .map(|cell| derive_tag(&cell.text))
            .filter(|tag| !tag.is_empty())
            .collect())
    }

    fn enumerate<'s>(&'s self, collection: Collection<'s>) -> impl Stream<Item = Result<NameId>> + 's {
        let feeds = self.feeds;
        // None once the last page has been fetched
        let start: Option<Option<String>> = Some(None);

        stream::try_unfold(start, move |cursor| async move {
            match cursor {
                None => Ok(None),
                Some(page_url) => fetch_page(feeds, collection, page_url).await.map(|page| {
                    let items = stream::iter(page.items.into_iter().map(Ok::<NameId, AppError>));
                    Some((items, page.next.map(Some)))
                }),
            }
        })
        .try_flatten()
    }
}

/// (name, tag) pairs for the header cells of grid row 1.
///
/// The cells feed leaves out blank cells, so each cell is matched to the tag
/// at its own column. Without data rows there are no tags to match, and the
/// tag is derived from the header text instead.
fn header_pairs(cells: Vec<Cell>, tags: &[String]) -> Vec<(String, String)> {
    if tags.is_empty() {
        return cells
            .into_iter()
            .map(|cell| {
                let tag = derive_tag(&cell.text);
                (cell.text, tag)
            })
            .filter(|(_, tag)| !tag.is_empty())
            .collect();
    }

    cells
        .into_iter()
        .filter_map(|cell| {
            let tag = (cell.col as usize)
                .checked_sub(1)
                .and_then(|index| tags.get(index));
            match tag {
                Some(tag) => Some((cell.text, tag.clone())),
                None => {
                    warn!(col = cell.col, header = %cell.text, "Header cell has no column tag, skipping");
                    None
                }
            }
        })
        .collect()
}

async fn fetch_page<F>(
    feeds: &F,
    collection: Collection<'_>,
    page_url: Option<String>,
) -> Result<FeedPage<NameId>>
where
    F: FeedOperations + Sync,
{
    match collection {
        Collection::Spreadsheets => feeds.spreadsheets_page(page_url.as_deref()).await,
        Collection::Worksheets { spreadsheet_id } => {
            feeds
                .worksheets_page(spreadsheet_id, page_url.as_deref())
                .await
        }
    }
}

fn filtered<'s, S>(
    entries: S,
    selector: Option<&'s Selector>,
) -> impl Stream<Item = Result<NameId>> + 's
where
    S: Stream<Item = Result<NameId>> + 's,
{
    entries.try_filter(move |entry| future::ready(selector.is_none_or(|s| s.matches(entry))))
}

/// The single entry of `entries`; none is `NotFound`, several `AmbiguousMatch`.
async fn exactly_one<S>(entries: S, kind: ResourceKind, hint: &str) -> Result<NameId>
where
    S: Stream<Item = Result<NameId>>,
{
    let mut entries = pin!(entries);

    let Some(first) = entries.try_next().await? else {
        return Err(AppError::NotFound {
            kind,
            hint: hint.to_string(),
        });
    };

    let mut count = 1;
    while entries.try_next().await?.is_some() {
        count += 1;
    }
    if count > 1 {
        return Err(AppError::AmbiguousMatch {
            kind,
            hint: hint.to_string(),
            count,
        });
    }

    debug!(name = %first.name, id = %first.id, "Resolved {}", kind);
    Ok(first)
}


#[cfg(test)]
mod tests {
    use super::mocks::{MockFeeds, entry, header};
    use super::*;
    use futures::StreamExt;

    fn budgets() -> MockFeeds {
        MockFeeds::with_spreadsheets(vec![
            vec![NameId::new("Budget", "key1"), NameId::new("Weight", "key2")],
            vec![NameId::new("Budget", "key3")],
        ])
    }

    fn worksheet_with_rows() -> MockFeeds {
        MockFeeds {
            list_rows: vec![
                entry(&[("amountspent", "12.50"), ("date", "2025-01-01")]),
                entry(&[("amountspent", "Spent"), ("date", "When")]),
            ],
            header_cells: header(&["Amount Spent", "Date"]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_all_spreadsheets_across_pages() {
        let feeds = budgets();
        let resolver = Resolver::new(&feeds);

        let all: Vec<NameId> = resolver.list_spreadsheets(None).try_collect().await.unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(feeds.pages_fetched(), 2);
    }

    #[tokio::test]
    async fn test_listing_is_lazy() {
        let feeds = budgets();
        let resolver = Resolver::new(&feeds);

        let mut spreadsheets = pin!(resolver.list_spreadsheets(None));
        let first = spreadsheets.next().await.unwrap().unwrap();

        assert_eq!(first, NameId::new("Budget", "key1"));
        assert_eq!(feeds.pages_fetched(), 1, "second page should not be fetched");
    }

    #[tokio::test]
    async fn test_ambiguous_name() {
        let feeds = budgets();
        let resolver = Resolver::new(&feeds);

        let err = resolver
            .resolve_spreadsheet(&Selector::new("Budget", false), false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::AmbiguousMatch { kind: ResourceKind::Spreadsheet, ref hint, count: 2 } if hint == "Budget"
        ));
    }

    #[tokio::test]
    async fn test_resolve_by_id_disambiguates() {
        let feeds = budgets();
        let resolver = Resolver::new(&feeds);

        for id in ["key1", "key3"] {
            let found = resolver
                .resolve_spreadsheet(&Selector::new(id, true), true)
                .await
                .unwrap();
            assert_eq!(found, NameId::new("Budget", id));
        }
    }

    #[tokio::test]
    async fn test_id_without_lookup_skips_network() {
        let feeds = budgets();
        let resolver = Resolver::new(&feeds);

        let found = resolver
            .resolve_spreadsheet(&Selector::new("key9", true), false)
            .await
            .unwrap();

        assert_eq!(found, NameId::new("key9", "key9"));
        assert_eq!(feeds.pages_fetched(), 0);
    }

    #[tokio::test]
    async fn test_unknown_name_not_found() {
        let feeds = budgets();
        let resolver = Resolver::new(&feeds);

        let err = resolver
            .resolve_spreadsheet(&Selector::new("Groceries", false), false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::NotFound { kind: ResourceKind::Spreadsheet, ref hint } if hint == "Groceries"
        ));
    }

    #[tokio::test]
    async fn test_filtered_listing_is_empty_when_nothing_matches() {
        let feeds = budgets();
        let resolver = Resolver::new(&feeds);
        let selector = Selector::new("Groceries", false);

        let matches: Vec<NameId> = resolver
            .list_spreadsheets(Some(&selector))
            .try_collect()
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_worksheet_defaults_to_first() {
        let mut feeds = MockFeeds::default();
        feeds.worksheets.insert(
            "key1".to_string(),
            vec![NameId::new("Sheet1", "od6"), NameId::new("Sheet2", "od7")],
        );
        let resolver = Resolver::new(&feeds);

        let first = resolver.resolve_worksheet("key1", None, false).await.unwrap();
        assert_eq!(first, NameId::new("Sheet1", "od6"));

        let by_name = resolver
            .resolve_worksheet("key1", Some(&Selector::new("Sheet2", false)), false)
            .await
            .unwrap();
        assert_eq!(by_name, NameId::new("Sheet2", "od7"));

        let err = resolver.resolve_worksheet("key2", None, false).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { kind: ResourceKind::Worksheet, .. }));
    }

    #[tokio::test]
    async fn test_identity_mapping_uses_native_tags() {
        let feeds = worksheet_with_rows();
        let resolver = Resolver::new(&feeds);

        let mapping = resolver.build_column_mapping("key1", "od6", None).await.unwrap();

        assert_eq!(mapping, ColumnMapping::identity(["amountspent", "date"]));
    }

    #[tokio::test]
    async fn test_identity_mapping_of_empty_worksheet_derives_tags() {
        let feeds = MockFeeds {
            header_cells: header(&["Amount Spent", "Date"]),
            ..Default::default()
        };
        let resolver = Resolver::new(&feeds);

        let mapping = resolver.build_column_mapping("key1", "od6", None).await.unwrap();

        assert_eq!(mapping, ColumnMapping::identity(["amountspent", "date"]));
    }

    #[tokio::test]
    async fn test_header_row_one_zips_cells_with_tags() {
        let feeds = worksheet_with_rows();
        let resolver = Resolver::new(&feeds);

        let mapping = resolver.build_column_mapping("key1", "od6", Some(1)).await.unwrap();

        assert_eq!(
            mapping.entries(),
            vec![
                ("Amount Spent".to_string(), "amountspent".to_string()),
                ("Date".to_string(), "date".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_header_row_one_pairs_by_column_across_blank_header() {
        let feeds = MockFeeds {
            list_rows: vec![entry(&[("amountspent", "1"), ("_cn6ca", "x"), ("date", "2")])],
            header_cells: vec![
                Cell {
                    row: 1,
                    col: 1,
                    text: "Amount Spent".to_string(),
                },
                Cell {
                    row: 1,
                    col: 3,
                    text: "Date".to_string(),
                },
                Cell {
                    row: 1,
                    col: 7,
                    text: "Stray".to_string(),
                },
            ],
            ..Default::default()
        };
        let resolver = Resolver::new(&feeds);

        let mapping = resolver.build_column_mapping("key1", "od6", Some(1)).await.unwrap();

        assert_eq!(mapping.tag("Amount Spent"), Some("amountspent"));
        assert_eq!(mapping.tag("Date"), Some("date"));
        assert_eq!(mapping.tag("Stray"), None);
        assert_eq!(mapping.len(), 2);
    }

    #[tokio::test]
    async fn test_header_row_one_without_data_rows_derives_tags() {
        let feeds = MockFeeds {
            header_cells: header(&["Amount Spent", "???", "Date"]),
            ..Default::default()
        };
        let resolver = Resolver::new(&feeds);

        let mapping = resolver.build_column_mapping("key1", "od6", Some(1)).await.unwrap();

        assert_eq!(
            mapping.entries(),
            vec![
                ("Amount Spent".to_string(), "amountspent".to_string()),
                ("Date".to_string(), "date".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_header_row_one_with_duplicate_names() {
        let feeds = MockFeeds {
            header_cells: header(&["Date", "Date"]),
            list_rows: vec![entry(&[("date", "1"), ("date_2", "2")])],
            ..Default::default()
        };
        let resolver = Resolver::new(&feeds);

        let err = resolver
            .build_column_mapping("key1", "od6", Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateColumn(ref name) if name == "Date"));
    }

    #[tokio::test]
    async fn test_later_header_row_reads_list_row() {
        let feeds = worksheet_with_rows();
        let resolver = Resolver::new(&feeds);

        // Grid row 3 is the second list entry
        let mapping = resolver.build_column_mapping("key1", "od6", Some(3)).await.unwrap();

        assert_eq!(mapping.tag("Spent"), Some("amountspent"));
        assert_eq!(mapping.tag("When"), Some("date"));
        assert_eq!(mapping.len(), 2);
    }

    #[tokio::test]
    async fn test_header_row_bounds() {
        let feeds = worksheet_with_rows();
        let resolver = Resolver::new(&feeds);

        let err = resolver
            .build_column_mapping("key1", "od6", Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = resolver
            .build_column_mapping("key1", "od6", Some(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { kind: ResourceKind::HeaderRow, .. }));
    }

    #[tokio::test]
    async fn test_list_columns_sorted() {
        let feeds = MockFeeds {
            list_rows: vec![entry(&[("zeta", "1"), ("alpha", "2")])],
            ..Default::default()
        };
        let resolver = Resolver::new(&feeds);

        let columns = resolver.list_columns("key1", "od6", None).await.unwrap();
        assert_eq!(
            columns,
            vec![
                ("alpha".to_string(), "alpha".to_string()),
                ("zeta".to_string(), "zeta".to_string()),
            ]
        );

        let mapping = ColumnMapping::from_pairs(vec![
            ("Zeta".to_string(), "zeta".to_string()),
            ("Alpha".to_string(), "alpha".to_string()),
        ])
        .unwrap();
        let columns = resolver
            .list_columns("key1", "od6", Some(&mapping))
            .await
            .unwrap();
        assert_eq!(columns[0].0, "Alpha");
    }
}
