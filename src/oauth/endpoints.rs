use super::Signer;
use super::credential::Credential;
use crate::config::OAuthConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use tracing::{debug, instrument};
use url::Url;

const REQUEST_TOKEN_URL: &str = "https://www.google.com/accounts/OAuthGetRequestToken";
const AUTHORIZE_URL: &str = "https://www.google.com/accounts/OAuthAuthorizeToken";
const ACCESS_TOKEN_URL: &str = "https://www.google.com/accounts/OAuthGetAccessToken";

/// Short-lived token used only to walk the user through the authorization page.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

impl fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestToken")
            .field("token", &self.token)
            .field("secret", &"<secret>")
            .finish()
    }
}

/// The three endpoints of the delegated authorization dance.
#[async_trait]
pub trait TokenEndpoints {
    async fn request_token(&self, callback_url: &Url) -> Result<RequestToken>;

    fn authorization_url(&self, request_token: &RequestToken) -> Result<Url>;

    async fn exchange(&self, request_token: &RequestToken, verifier: &str) -> Result<Credential>;
}

/// Google Accounts OAuth 1.0a endpoints.
pub struct GoogleOAuth {
    http_client: reqwest::Client,
    consumer_key: String,
    consumer_secret: String,
    scopes: Vec<String>,
    display_name: String,
}

impl GoogleOAuth {
    pub fn new(config: &OAuthConfig, display_name: &str) -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .build()
            .map_err(|e| AppError::Auth(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self {
            http_client,
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            scopes: config.scopes.clone(),
            display_name: display_name.to_string(),
        })
    }

    async fn fetch_token(&self, url: Url, authorization: String, what: &str) -> Result<RequestToken> {
        let response = self
            .http_client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("Failed to fetch {}: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "Failed to fetch {}: {} - {}",
                what, status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Auth(format!("Failed to read {}: {}", what, e)))?;
        parse_token_response(&body)
    }
}

#[async_trait]
impl TokenEndpoints for GoogleOAuth {
    #[instrument(name = "Requesting OAuth request token", skip_all)]
    async fn request_token(&self, callback_url: &Url) -> Result<RequestToken> {
        let mut url = Url::parse(REQUEST_TOKEN_URL)
            .map_err(|e| AppError::Auth(format!("Invalid request token URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("xoauth_displayname", &self.display_name);

        let authorization = Signer::new(&self.consumer_key, &self.consumer_secret)
            .authorization_header("GET", &url, &[("oauth_callback", callback_url.as_str())])?;

        let token = self.fetch_token(url, authorization, "request token").await?;
        debug!(token = %token.token, "Got request token");
        Ok(token)
    }

    fn authorization_url(&self, request_token: &RequestToken) -> Result<Url> {
        let mut url = Url::parse(AUTHORIZE_URL)
            .map_err(|e| AppError::Auth(format!("Invalid authorization URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.token)
            .append_pair("hd", "default");
        Ok(url)
    }

    #[instrument(name = "Exchanging OAuth request token", skip_all)]
    async fn exchange(&self, request_token: &RequestToken, verifier: &str) -> Result<Credential> {
        let url = Url::parse(ACCESS_TOKEN_URL)
            .map_err(|e| AppError::Auth(format!("Invalid access token URL: {}", e)))?;

        let authorization = Signer::new(&self.consumer_key, &self.consumer_secret)
            .with_token(&request_token.token, &request_token.secret)
            .authorization_header("GET", &url, &[("oauth_verifier", verifier)])?;

        let access = self.fetch_token(url, authorization, "access token").await?;

        Ok(Credential {
            token: access.token,
            token_secret: access.secret,
            obtained_at: Utc::now(),
        })
    }
}

/// Parse a form-encoded `oauth_token=…&oauth_token_secret=…` body.
fn parse_token_response(body: &str) -> Result<RequestToken> {
    let mut token = None;
    let mut secret = None;
    for (key, value) in url::form_urlencoded::parse(body.trim().as_bytes()) {
        match key.as_ref() {
            "oauth_token" => token = Some(value.into_owned()),
            "oauth_token_secret" => secret = Some(value.into_owned()),
            _ => {}
        }
    }

    match (token, secret) {
        (Some(token), Some(secret)) if !token.is_empty() => Ok(RequestToken { token, secret }),
        _ => Err(AppError::Auth(format!(
            "Token response is missing oauth_token or oauth_token_secret: {}",
            body
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        let token = parse_token_response(
            "oauth_token=4%2FabcDEF&oauth_token_secret=s3cr%2Bt&oauth_callback_confirmed=true\n",
        )
        .unwrap();
        assert_eq!(
            token,
            RequestToken {
                token: "4/abcDEF".to_string(),
                secret: "s3cr+t".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_token_response_missing_secret() {
        let err = parse_token_response("oauth_token=abc").unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));

        assert!(parse_token_response("").is_err());
    }

    #[test]
    fn test_authorization_url() {
        let oauth = GoogleOAuth::new(&OAuthConfig::default(), "logss").unwrap();
        let url = oauth
            .authorization_url(&RequestToken {
                token: "4/abc".to_string(),
                secret: "secret".to_string(),
            })
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://www.google.com/accounts/OAuthAuthorizeToken?oauth_token=4%2Fabc&hd=default"
        );
        assert!(!url.as_str().contains("secret"));
    }
}
