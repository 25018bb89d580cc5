use super::xml::{self, Element, ATOM_NS, GSX_NS};
use super::{Cell, FeedOperations, FeedPage, ListEntry, ListRange, NameId, Row};
use crate::config::OAuthConfig;
use crate::error::{AppError, Result};
use crate::oauth::{Credential, CredentialHolder, Signer};
use async_trait::async_trait;
use quick_xml::escape::escape;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use tracing::{debug, instrument};
use url::Url;

const FEEDS_BASE_URL: &str = "https://spreadsheets.google.com/feeds";
const GDATA_VERSION: &str = "3.0";
const ATOM_CONTENT_TYPE: &str = "application/atom+xml";

/// Client for the spreadsheets GData feeds.
///
/// Starts out unauthenticated; every request fails until a credential has
/// been installed.
pub struct FeedClient {
    client: Client,
    consumer_key: String,
    consumer_secret: String,
    credential: Option<Credential>,
}

impl FeedClient {
    /// `source` identifies this application to the service.
    pub fn new(config: &OAuthConfig, source: &str) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(format!("{} logss/{}", source, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Feed(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self {
            client,
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            credential: None,
        })
    }

    fn credential(&self) -> Result<&Credential> {
        self.credential
            .as_ref()
            .ok_or_else(|| AppError::Auth("Feed client has no credential installed".to_string()))
    }

    fn feed_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(FEEDS_BASE_URL)
            .map_err(|e| AppError::Feed(format!("Invalid feeds URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Feed("Feeds URL cannot have a path".to_string()))?
            .extend(segments);
        Ok(url)
    }

    fn page_url(&self, page_url: Option<&str>, segments: &[&str]) -> Result<Url> {
        match page_url {
            Some(next) => Url::parse(next)
                .map_err(|e| AppError::Feed(format!("Invalid next page URL '{}': {}", next, e))),
            None => self.feed_url(segments),
        }
    }

    async fn send(&self, method: Method, url: Url, body: Option<String>) -> Result<String> {
        let credential = self.credential()?;
        let authorization = Signer::new(&self.consumer_key, &self.consumer_secret)
            .with_token(&credential.token, &credential.token_secret)
            .authorization_header(method.as_str(), &url, &[])?;

        debug!(%method, %url, "Feed request");
        let mut request = self
            .client
            .request(method, url.clone())
            .header(AUTHORIZATION, authorization)
            .header("GData-Version", GDATA_VERSION);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, ATOM_CONTENT_TYPE).body(body);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Feed(format!(
                "Request to {} failed: {} - {}",
                url.path(),
                status,
                body
            )));
        }

        Ok(response.text().await?)
    }

    async fn get_feed(&self, url: Url) -> Result<Element> {
        let body = self.send(Method::GET, url, None).await?;
        Element::parse(&body)
    }

    async fn name_id_page(&self, url: Url) -> Result<FeedPage<NameId>> {
        let feed = self.get_feed(url).await?;
        let items = xml::entries(&feed)
            .map(xml::name_id)
            .collect::<Result<Vec<_>>>()?;

        Ok(FeedPage {
            items,
            next: xml::next_link(&feed),
        })
    }
}

impl CredentialHolder for FeedClient {
    fn install_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }
}

#[async_trait]
impl FeedOperations for FeedClient {
    #[instrument(name = "Listing spreadsheets", skip(self))]
    async fn spreadsheets_page(&self, page_url: Option<&str>) -> Result<FeedPage<NameId>> {
        let url = self.page_url(page_url, &["spreadsheets", "private", "full"])?;
        self.name_id_page(url).await
    }

    #[instrument(name = "Listing worksheets", skip(self))]
    async fn worksheets_page(
        &self,
        spreadsheet_id: &str,
        page_url: Option<&str>,
    ) -> Result<FeedPage<NameId>> {
        let url = self.page_url(
            page_url,
            &["worksheets", spreadsheet_id, "private", "full"],
        )?;
        self.name_id_page(url).await
    }

    #[instrument(name = "Reading list feed", skip(self))]
    async fn list_entries(
        &self,
        spreadsheet_id: &str,
        worksheet_id: &str,
        range: ListRange,
    ) -> Result<Vec<ListEntry>> {
        let mut url = self.feed_url(&["list", spreadsheet_id, worksheet_id, "private", "full"])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(start) = range.start_index {
                query.append_pair("start-index", &start.to_string());
            }
            if let Some(max) = range.max_results {
                query.append_pair("max-results", &max.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let feed = self.get_feed(url).await?;
        Ok(xml::entries(&feed).map(xml::list_entry).collect())
    }

    #[instrument(name = "Reading cells feed", skip(self))]
    async fn row_cells(
        &self,
        spreadsheet_id: &str,
        worksheet_id: &str,
        row: u32,
    ) -> Result<Vec<Cell>> {
        let mut url = self.feed_url(&["cells", spreadsheet_id, worksheet_id, "private", "full"])?;
        url.query_pairs_mut()
            .append_pair("min-row", &row.to_string())
            .append_pair("max-row", &row.to_string());

        let feed = self.get_feed(url).await?;
        let mut cells = xml::cells(&feed)?;
        cells.retain(|cell| cell.row == row);
        cells.sort_by_key(|cell| cell.col);
        Ok(cells)
    }

    #[instrument(name = "Inserting row", skip(self, row))]
    async fn insert_row(&self, spreadsheet_id: &str, worksheet_id: &str, row: &Row) -> Result<()> {
        let url = self.feed_url(&["list", spreadsheet_id, worksheet_id, "private", "full"])?;
        self.send(Method::POST, url, Some(row_entry(row)))
            .await?;
        Ok(())
    }
}

/// Atom entry carrying one `gsx:` element per column tag.
fn row_entry(row: &Row) -> String {
    let mut entry = format!("<entry xmlns=\"{}\" xmlns:gsx=\"{}\">", ATOM_NS, GSX_NS);
    for (tag, value) in row {
        entry.push_str(&format!("<gsx:{tag}>{}</gsx:{tag}>", escape(value.as_str())));
    }
    entry.push_str("</entry>");
    entry
}
