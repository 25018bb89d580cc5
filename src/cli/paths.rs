use crate::config::Config;
use crate::error::Result;
use std::path::Path;
use tracing::info;

pub fn execute(token_file: &Path) -> Result<()> {
    let config_path = Config::config_file()?;

    info!(path = ?config_path, "Config path");
    info!(path = ?token_file, "Token path");

    Ok(())
}
