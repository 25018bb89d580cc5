use super::auth::authorized_client;
use crate::config::Config;
use crate::error::{AppError, ResourceKind, Result};
use crate::feeds::{FeedOperations, NameId};
use crate::resolve::{ColumnMapping, Resolver, Selector};
use clap::Args;
use futures::TryStreamExt;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct LogArgs {
    /// The key of the spreadsheet to update
    #[arg(long = "key", value_name = "ID")]
    pub spreadsheet_id: Option<String>,

    /// The name of the spreadsheet to update or list
    #[arg(long = "name", value_name = "NAME")]
    pub spreadsheet_name: Option<String>,

    /// The key of the worksheet to update
    #[arg(long = "sheetid", value_name = "ID")]
    pub worksheet_id: Option<String>,

    /// The name of the worksheet to update, defaults to the first worksheet
    #[arg(long = "sheet", value_name = "NAME")]
    pub worksheet_name: Option<String>,

    /// Grid row holding the column names, when they differ from the column tags
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub header_row: Option<u32>,

    /// List matching spreadsheets and their worksheets
    #[arg(long)]
    pub list: bool,

    /// `column:value` pairs forming one row, or bare column names to read rows from stdin.
    /// Put `--` before a bare column named like a subcommand (`auth`, `paths`)
    #[arg(value_name = "COLUMN[:VALUE]")]
    pub columns: Vec<String>,
}

/// Validated invocation, decided before any network activity.
#[derive(Debug, PartialEq)]
enum Plan {
    List {
        spreadsheet: Option<Selector>,
        worksheet: Option<Selector>,
    },
    Log {
        spreadsheet: Selector,
        worksheet: Option<Selector>,
        action: ColumnAction,
    },
}

#[derive(Debug, PartialEq)]
enum ColumnAction {
    ListColumns,
    InsertOne(Vec<(String, String)>),
    InsertFromStdin(Vec<String>),
}

impl LogArgs {
    pub async fn execute(&self, config: &Config, token_file: &Path) -> Result<()> {
        let plan = self.plan()?;
        let client = authorized_client(config, token_file).await?;
        let mut out = io::stdout().lock();

        match plan {
            Plan::List {
                spreadsheet,
                worksheet,
            } => list(&client, spreadsheet.as_ref(), worksheet.as_ref(), &mut out).await,
            Plan::Log {
                spreadsheet,
                worksheet,
                action,
            } => {
                let resolver = Resolver::new(&client);
                let spreadsheet = resolver.resolve_spreadsheet(&spreadsheet, false).await?;
                let worksheet = resolver
                    .resolve_worksheet(&spreadsheet.id, worksheet.as_ref(), false)
                    .await?;
                self.apply(&client, &spreadsheet, &worksheet, action, &mut out)
                    .await
            }
        }
    }

    fn plan(&self) -> Result<Plan> {
        let has_spreadsheet = self.spreadsheet_name.is_some() || self.spreadsheet_id.is_some();
        let has_worksheet = self.worksheet_name.is_some() || self.worksheet_id.is_some();
        if has_worksheet && !has_spreadsheet {
            return Err(AppError::Validation(
                "You must first specify either --name or --key with the --sheet or --sheetid options"
                    .to_string(),
            ));
        }

        let spreadsheet = Selector::from_flags(
            self.spreadsheet_name.as_deref(),
            self.spreadsheet_id.as_deref(),
            "--name",
            "--key",
        )?;
        let worksheet = Selector::from_flags(
            self.worksheet_name.as_deref(),
            self.worksheet_id.as_deref(),
            "--sheet",
            "--sheetid",
        )?;

        if self.list {
            if !self.columns.is_empty() {
                return Err(AppError::Validation(
                    "Column arguments cannot be combined with --list".to_string(),
                ));
            }
            return Ok(Plan::List {
                spreadsheet,
                worksheet,
            });
        }

        let spreadsheet = spreadsheet.ok_or_else(|| {
            AppError::Validation("You must specify either --name or --key options".to_string())
        })?;

        Ok(Plan::Log {
            spreadsheet,
            worksheet,
            action: parse_columns(&self.columns)?,
        })
    }

    async fn apply<F, W>(
        &self,
        feeds: &F,
        spreadsheet: &NameId,
        worksheet: &NameId,
        action: ColumnAction,
        out: &mut W,
    ) -> Result<()>
    where
        F: FeedOperations + Sync,
        W: Write,
    {
        let resolver = Resolver::new(feeds);

        match action {
            ColumnAction::ListColumns => {
                let mapping = match self.header_row {
                    Some(row) => Some(
                        resolver
                            .build_column_mapping(&spreadsheet.id, &worksheet.id, Some(row))
                            .await?,
                    ),
                    None => None,
                };
                let columns = resolver
                    .list_columns(&spreadsheet.id, &worksheet.id, mapping.as_ref())
                    .await?;
                for (name, _) in columns {
                    writeln!(out, "{}", name)?;
                }
            }
            ColumnAction::InsertOne(values) => {
                let mapping = resolver
                    .build_column_mapping(&spreadsheet.id, &worksheet.id, self.header_row)
                    .await?;
                let row = mapping.to_row(values)?;
                feeds.insert_row(&spreadsheet.id, &worksheet.id, &row).await?;
                info!(spreadsheet = %spreadsheet.name, worksheet = %worksheet.name, "Inserted 1 row");
            }
            ColumnAction::InsertFromStdin(names) => {
                let mapping = resolver
                    .build_column_mapping(&spreadsheet.id, &worksheet.id, self.header_row)
                    .await?;
                let inserted = insert_lines(
                    feeds,
                    &spreadsheet.id,
                    &worksheet.id,
                    &mapping,
                    &names,
                    io::stdin().lock(),
                )
                .await?;
                info!(spreadsheet = %spreadsheet.name, worksheet = %worksheet.name, "Inserted {} rows", inserted);
            }
        }

        Ok(())
    }
}

/// Print `name: id` for each matching spreadsheet followed by its matching
/// worksheets, indented.
async fn list<F, W>(
    feeds: &F,
    spreadsheet: Option<&Selector>,
    worksheet: Option<&Selector>,
    out: &mut W,
) -> Result<()>
where
    F: FeedOperations + Sync,
    W: Write,
{
    let resolver = Resolver::new(feeds);
    let spreadsheets: Vec<NameId> = resolver.list_spreadsheets(spreadsheet).try_collect().await?;

    if spreadsheets.is_empty() {
        if let Some(selector) = spreadsheet {
            warn!("No spreadsheet with {}", selector);
        }
    }

    for ss in &spreadsheets {
        writeln!(out, "{}: {}", ss.name, ss.id)?;
        let worksheets: Vec<NameId> = resolver
            .list_worksheets(&ss.id, worksheet)
            .try_collect()
            .await?;
        for ws in worksheets {
            writeln!(out, "\t{}: {}", ws.name, ws.id)?;
        }
    }

    Ok(())
}

/// Bare names read rows from stdin, `name:value` pairs form a single row.
fn parse_columns(args: &[String]) -> Result<ColumnAction> {
    if args.is_empty() {
        return Ok(ColumnAction::ListColumns);
    }
    if !args.iter().any(|arg| arg.contains(':')) {
        return Ok(ColumnAction::InsertFromStdin(args.to_vec()));
    }

    args.iter()
        .map(|arg| {
            arg.split_once(':')
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "Column '{}' has no value, give every column a value or none",
                        arg
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()
        .map(ColumnAction::InsertOne)
}

/// Split a line on whitespace into at most `max_fields` fields. The last
/// field keeps any whitespace inside it.
fn split_fields(line: &str, max_fields: usize) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        if fields.len() + 1 >= max_fields {
            fields.push(rest);
            break;
        }
        match rest.split_once(char::is_whitespace) {
            Some((field, tail)) => {
                fields.push(field);
                rest = tail.trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }

    fields
}

/// Insert one row per non-blank input line, mapping fields to `names` in order.
async fn insert_lines<F, R>(
    feeds: &F,
    spreadsheet_id: &str,
    worksheet_id: &str,
    mapping: &ColumnMapping,
    names: &[String],
    input: R,
) -> Result<usize>
where
    F: FeedOperations + Sync,
    R: BufRead,
{
    if let Some(unknown) = names.iter().find(|name| mapping.tag(name).is_none()) {
        return Err(AppError::NotFound {
            kind: ResourceKind::Column,
            hint: unknown.clone(),
        });
    }
    debug!(columns = mapping.len(), "Reading rows from input");

    let mut inserted = 0;
    for line in input.lines() {
        let line = line?;
        let fields = split_fields(&line, names.len());
        if fields.is_empty() {
            continue;
        }
        if fields.len() < names.len() {
            warn!(line = %line, "Fewer fields than columns, leaving the rest empty");
        }

        let row = mapping.to_row(names.iter().zip(fields))?;
        feeds.insert_row(spreadsheet_id, worksheet_id, &row).await?;
        inserted += 1;
    }

    Ok(inserted)
}
