use crate::error::{AppError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha1::Sha1;
use url::Url;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

// Everything but the unreserved characters gets escaped.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<Sha1>;

/// Percent-encode a value the way the OAuth 1.0 signature base string requires.
pub fn oauth_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Signs requests on behalf of a consumer, optionally with a token.
///
/// See <https://oauth.net/core/1.0a/#signing_process>
#[derive(Debug, Clone)]
pub struct Signer<'a> {
    consumer_key: &'a str,
    consumer_secret: &'a str,
    token: Option<&'a str>,
    token_secret: &'a str,
}

impl<'a> Signer<'a> {
    pub fn new(consumer_key: &'a str, consumer_secret: &'a str) -> Self {
        Self {
            consumer_key,
            consumer_secret,
            token: None,
            token_secret: "",
        }
    }

    pub fn with_token(mut self, token: &'a str, token_secret: &'a str) -> Self {
        self.token = Some(token);
        self.token_secret = token_secret;
        self
    }

    /// Value for the `Authorization` header of a request to `url`.
    ///
    /// `protocol_params` are extra `oauth_*` parameters for this request such
    /// as `oauth_callback` or `oauth_verifier`. Query parameters of `url` are
    /// covered by the signature.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &Url,
        protocol_params: &[(&str, &str)],
    ) -> Result<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let timestamp = Utc::now().timestamp();

        self.header_with(method, url, protocol_params, &nonce, timestamp)
    }

    fn header_with(
        &self,
        method: &str,
        url: &Url,
        protocol_params: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> Result<String> {
        let timestamp = timestamp.to_string();
        let mut oauth_params: Vec<(&str, &str)> = vec![
            ("oauth_consumer_key", self.consumer_key),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_version", OAUTH_VERSION),
        ];
        if let Some(token) = self.token {
            oauth_params.push(("oauth_token", token));
        }
        oauth_params.extend_from_slice(protocol_params);
        oauth_params.sort();

        let base = base_string(method, url, &oauth_params);
        let signature = self.sign(&base)?;

        let mut fields: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", oauth_encode(k), oauth_encode(v)))
            .collect();
        fields.push(format!("oauth_signature=\"{}\"", oauth_encode(&signature)));

        Ok(format!("OAuth {}", fields.join(", ")))
    }

    fn sign(&self, base: &str) -> Result<String> {
        let key = format!(
            "{}&{}",
            oauth_encode(self.consumer_secret),
            oauth_encode(self.token_secret)
        );
        let mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| AppError::Auth(format!("Invalid signing key: {}", e)))?
            .chain_update(base.as_bytes())
            .finalize();

        Ok(STANDARD.encode(mac.into_bytes()))
    }
}

/// Signature base string: method, base URL and the normalized parameters.
fn base_string(method: &str, url: &Url, oauth_params: &[(&str, &str)]) -> String {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (oauth_encode(&k), oauth_encode(&v)))
        .chain(
            oauth_params
                .iter()
                .map(|(k, v)| (oauth_encode(k), oauth_encode(v))),
        )
        .collect();
    params.sort();

    let normalized = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        oauth_encode(&base_url(url)),
        oauth_encode(&normalized)
    )
}

fn base_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}
