use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tiny_http::{Header, Response, Server, StatusCode};
use tracing::debug;
use url::Url;

const CALLBACK_HOST: &str = "127.0.0.1";
const CALLBACK_PATH: &str = "/callback";

const ACK_PAGE: &str = "<!DOCTYPE html>\n<html><head><title>logss</title></head>\
<body><p>Authorization received. You can close this window.</p></body></html>\n";

/// Query parameters of the redirect the browser made back to us.
pub type CallbackResult = BTreeMap<String, String>;

enum ReceiverState {
    Listening(Server),
    Closed,
}

/// One-shot loopback listener for the authorization redirect.
pub struct CallbackReceiver {
    state: ReceiverState,
    url: Url,
}

impl CallbackReceiver {
    /// Bind an ephemeral port on the loopback interface.
    pub fn start() -> Result<Self> {
        let bind_addr = format!("{}:0", CALLBACK_HOST);
        let server = Server::http(&bind_addr)
            .map_err(|e| AppError::Auth(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| AppError::Auth("Callback listener has no IP address".to_string()))?;

        let url = Url::parse(&format!("http://{}:{}{}", CALLBACK_HOST, port, CALLBACK_PATH))
            .map_err(|e| AppError::Auth(format!("Invalid callback URL: {}", e)))?;
        debug!(%url, "Listening for authorization callback");

        Ok(Self {
            state: ReceiverState::Listening(server),
            url,
        })
    }

    /// URL to register as the redirect target.
    pub fn callback_url(&self) -> &Url {
        &self.url
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        matches!(self.state, ReceiverState::Closed)
    }

    /// Block until the first request to the callback path arrives, acknowledge
    /// it and stop listening. Requests for other paths get a 404.
    ///
    /// The receiver is closed afterwards whatever the outcome, including when
    /// `timeout` elapses without a request.
    pub fn await_result(&mut self, timeout: Duration) -> Result<CallbackResult> {
        let server = match std::mem::replace(&mut self.state, ReceiverState::Closed) {
            ReceiverState::Listening(server) => server,
            ReceiverState::Closed => {
                return Err(AppError::Auth(
                    "Callback receiver already closed".to_string(),
                ));
            }
        };

        let deadline = Instant::now() + timeout;
        let request = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let request = server
                .recv_timeout(remaining)
                .map_err(|e| AppError::Auth(format!("Failed to receive callback: {}", e)))?
                .ok_or_else(|| {
                    AppError::Auth(format!(
                        "No authorization callback within {}s",
                        timeout.as_secs()
                    ))
                })?;

            if request_path(request.url()) == CALLBACK_PATH {
                break request;
            }

            debug!(path = %request.url(), "Ignoring request outside the callback path");
            let _ = request.respond(Response::empty(StatusCode(404)));
        };

        let result = parse_query(request.url());
        debug!(params = ?result.keys().collect::<Vec<_>>(), "Received callback");

        let content_type = Header::from_bytes("Content-Type", "text/html; charset=utf-8")
            .map_err(|_| AppError::Auth("Invalid response header".to_string()))?;
        let response = Response::from_string(ACK_PAGE).with_header(content_type);
        request
            .respond(response)
            .map_err(|e| AppError::Auth(format!("Failed to send response: {}", e)))?;

        drop(server);
        Ok(result)
    }
}

fn request_path(target: &str) -> &str {
    target.split_once('?').map_or(target, |(path, _)| path)
}

/// Decode the query part of a request target such as `/callback?a=1&b=2`.
fn parse_query(target: &str) -> CallbackResult {
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}
