use crate::config::{self, Config};
use crate::error::Result;
use crate::feeds::FeedClient;
use crate::oauth::{Authorizer, CredentialStore, GoogleOAuth};
use std::path::Path;
use tracing::info;

pub async fn execute(config: &Config, token_file: &Path, reset: bool) -> Result<()> {
    let store = CredentialStore::new(token_file);
    if reset {
        store.clear()?;
    }

    authorized_client(config, token_file).await?;

    info!(path = ?store.path(), "Credential available");

    Ok(())
}

/// Feed client holding a credential, running the browser authorization
/// first when none is stored at `token_file`.
pub async fn authorized_client(config: &Config, token_file: &Path) -> Result<FeedClient> {
    let program = config::program_name();
    let mut client = FeedClient::new(&config.oauth, &program)?;

    let authorizer = Authorizer::new(
        GoogleOAuth::new(&config.oauth, &program)?,
        CredentialStore::new(token_file),
        config.oauth.callback_timeout(),
    );
    authorizer.ensure_credential(&mut client).await?;

    Ok(client)
}
