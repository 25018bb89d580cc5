mod auth;
mod log;
mod paths;

use crate::config::{self, Config};
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use log::LogArgs;

const LONG_ABOUT: &str = "Log data into a Google Spreadsheet.

With no column arguments, the column names of the worksheet are printed.

Otherwise the arguments should be of the form `columnname:value`, and one row
is added for each invocation.

If only column names are given (without values), rows are read from stdin as
whitespace delimited fields and mapped to the columns in order.";

#[derive(Parser, Debug)]
#[command(name = "logss")]
#[command(about = "Log data into a Google Spreadsheet", long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Token file to use instead of ~/.<program>.tok
    #[arg(long, global = true, value_name = "PATH")]
    pub token_file: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        let config = Config::load()?;
        let token_file = match &self.token_file {
            Some(path) => path.clone(),
            None => config.token_file(&config::program_name())?,
        };

        match &self.command {
            Some(Commands::Auth { reset }) => auth::execute(&config, &token_file, *reset).await,
            Some(Commands::Paths) => paths::execute(&token_file),
            None => self.log.execute(&config, &token_file).await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize access to your spreadsheets
    Auth {
        /// Forget the stored credential and authorize again
        #[arg(long)]
        reset: bool,
    },
    /// Show configuration and token paths
    Paths,
}
