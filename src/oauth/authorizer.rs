use super::callback::{CallbackReceiver, CallbackResult};
use super::credential::{Credential, CredentialStore};
use super::endpoints::{RequestToken, TokenEndpoints};
use crate::error::{AppError, Result};
use indicatif::ProgressStyle;
use std::time::Duration;
use tracing::{Span, debug, info, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

/// Anything that issues requests on behalf of a credential.
pub trait CredentialHolder {
    fn install_credential(&mut self, credential: Credential);
}

/// Makes sure a client holds a credential, running the browser handshake if
/// none has been stored yet.
pub struct Authorizer<E> {
    endpoints: E,
    store: CredentialStore,
    callback_timeout: Duration,
}

impl<E> Authorizer<E>
where
    E: TokenEndpoints + Sync,
{
    pub fn new(endpoints: E, store: CredentialStore, callback_timeout: Duration) -> Self {
        Self {
            endpoints,
            store,
            callback_timeout,
        }
    }

    #[instrument(name = "Authorizing", skip_all)]
    pub async fn ensure_credential<C: CredentialHolder>(&self, client: &mut C) -> Result<()> {
        let credential = match self.store.read() {
            Some(credential) => {
                debug!("Using stored credential");
                credential
            }
            None => {
                debug!("No stored credential, starting authorization");
                let credential = self.fetch_credential().await?;
                self.store.write(&credential)?;
                credential
            }
        };

        client.install_credential(credential);
        Ok(())
    }

    async fn fetch_credential(&self) -> Result<Credential> {
        let receiver = CallbackReceiver::start()?;
        let request_token = self
            .endpoints
            .request_token(receiver.callback_url())
            .await?;

        let auth_url = self.endpoints.authorization_url(&request_token)?;
        info!("Please visit this URL to authorize: {}", auth_url);

        let params = self.wait_for_callback(receiver).await?;
        let verifier = approve(&request_token, &params)?;

        self.endpoints.exchange(&request_token, &verifier).await
    }

    #[instrument(name = "Waiting for authorization", skip_all)]
    async fn wait_for_callback(&self, mut receiver: CallbackReceiver) -> Result<CallbackResult> {
        let span = Span::current();
        span.pb_set_style(
            &ProgressStyle::with_template("{spinner} [{elapsed}] {msg}")
                .map_err(|e| AppError::Other(e.into()))?,
        );
        span.pb_set_message("Waiting for the browser to hand back approval");

        let timeout = self.callback_timeout;
        tokio::task::spawn_blocking(move || receiver.await_result(timeout))
            .await
            .map_err(|e| AppError::Auth(format!("Callback listener failed: {}", e)))?
    }
}

/// Pull the verifier out of the callback, checking it belongs to our request token.
fn approve(request_token: &RequestToken, params: &CallbackResult) -> Result<String> {
    if let Some(token) = params.get("oauth_token") {
        if token != &request_token.token {
            return Err(AppError::Auth(
                "Callback is for a different request token".to_string(),
            ));
        }
    }

    match params.get("oauth_verifier") {
        Some(verifier) if !verifier.is_empty() => Ok(verifier.clone()),
        _ => Err(AppError::Auth("No oauth_verifier in callback".to_string())),
    }
}
