use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::TaxId;
use crate::error::KiraError;

const PROTEINS_API_URL: &str = "https://www.ebi.ac.uk/proteins/api";

pub trait ProteinsApi: Send + Sync {
    fn download_variation(&self, taxid: &TaxId, destination: &Path) -> Result<(), KiraError>;
    fn download_epitopes(&self, destination: &Path) -> Result<(), KiraError>;
    fn scientific_name(&self, taxid: &TaxId) -> Result<Option<String>, KiraError>;
}

#[derive(Clone)]
pub struct ProteinsHttpClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaxonomyRecord {
    scientific_name: Option<String>,
}

impl ProteinsHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        Self::with_base_url(PROTEINS_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-pt/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::ProteinsHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        // Dumps stream for a long time; only connecting is bounded here.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Option::<Duration>::None)
            .build()
            .map_err(|err| KiraError::ProteinsHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, KiraError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        warn!(status, attempt, "Proteins API busy, retrying");
                        std::thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        warn!(%err, attempt, "Proteins API request failed, retrying");
                        std::thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::ProteinsHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, KiraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Proteins API request failed".to_string());
        Err(KiraError::ProteinsStatus { status, message })
    }

    fn download(&self, url: &str, destination: &Path) -> Result<(), KiraError> {
        info!(url, destination = %destination.display(), "downloading");
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;

        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".kira-pt-download")
            .tempfile_in(parent)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let bytes = std::io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| KiraError::ProteinsHttp(err.to_string()))?;
        temp.persist(destination)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        info!(bytes, destination = %destination.display(), "download complete");
        Ok(())
    }
}

impl ProteinsApi for ProteinsHttpClient {
    fn download_variation(&self, taxid: &TaxId, destination: &Path) -> Result<(), KiraError> {
        let url = format!("{}/variation?offset=0&size=-1&taxid={taxid}", self.base_url);
        self.download(&url, destination)
    }

    fn download_epitopes(&self, destination: &Path) -> Result<(), KiraError> {
        let url = format!("{}/epitope?offset=0&size=-1&match_score=1", self.base_url);
        self.download(&url, destination)
    }

    fn scientific_name(&self, taxid: &TaxId) -> Result<Option<String>, KiraError> {
        let url = format!("{}/taxonomy/id/{taxid}", self.base_url);
        let response = self.send_with_retries(|| {
            self.client.get(&url).timeout(Duration::from_secs(10))
        })?;
        let response = Self::handle_status(response)?;
        let record: TaxonomyRecord = response
            .json()
            .map_err(|err| KiraError::ProteinsHttp(err.to_string()))?;
        Ok(record.scientific_name)
    }
}

/// Memoised taxonomy id -> scientific name lookup. Build one per run and
/// pass it to whoever needs names; failures are logged and cached as `None`.
pub struct TaxonomyNames<'a, A: ProteinsApi + ?Sized> {
    api: &'a A,
    cache: HashMap<TaxId, Option<String>>,
}

impl<'a, A: ProteinsApi + ?Sized> TaxonomyNames<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, taxid: &TaxId) -> Option<&str> {
        let api = self.api;
        self.cache
            .entry(taxid.clone())
            .or_insert_with(|| match api.scientific_name(taxid) {
                Ok(name) => name,
                Err(err) => {
                    warn!(%taxid, %err, "could not resolve scientific name");
                    None
                }
            })
            .as_deref()
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
