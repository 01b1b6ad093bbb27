use std::time::Duration;

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use super::{FetchError, PageSource};
use crate::record::{Artwork, Page, ARTWORK_FIELDS, PAGE_SIZE};

pub const DEFAULT_BASE_URL: &str = "https://api.artic.edu/api/v1";

const USER_AGENT: &str = concat!("artable/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base URL: {url}")]
    InvalidBaseUrl { url: String },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub proxy: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 10,
            proxy: None,
        }
    }
}

#[derive(Deserialize)]
struct ArtworksResponse {
    #[serde(default)]
    pagination: Option<Pagination>,
    data: Vec<Artwork>,
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(default)]
    total_pages: Option<u32>,
}

/// Artworks listing of the Art Institute of Chicago public API.
#[derive(Clone, Debug)]
pub struct ArticClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ArticClient {
    pub fn new(options: &ClientOptions) -> Result<Self, ClientError> {
        let base = options.base_url.trim().trim_end_matches('/');
        if reqwest::Url::parse(base).is_err() {
            return Err(ClientError::InvalidBaseUrl {
                url: options.base_url.clone(),
            });
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(options.timeout_seconds.max(1)));

        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy_cfg = reqwest::Proxy::all(proxy).map_err(|e| ClientError::ProxySetup {
                proxy: proxy.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy_cfg);
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::HttpClientBuild { source: e })?;

        Ok(Self {
            client,
            endpoint: format!("{base}/artworks"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PageSource for ArticClient {
    async fn fetch_page(&self, page: u32) -> Result<Page, FetchError> {
        debug!("GET {} page={page}", self.endpoint);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("page", page.to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("fields", ARTWORK_FIELDS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Request { page, source: e })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                page,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request { page, source: e })?;
        parse_page(&body).map_err(|e| FetchError::Decode { page, source: e })
    }
}

pub(crate) fn parse_page(body: &str) -> Result<Page, serde_json::Error> {
    let parsed: ArtworksResponse = serde_json::from_str(body)?;
    Ok(Page {
        records: parsed.data,
        total_pages: parsed.pagination.and_then(|p| p.total_pages),
    })
}
