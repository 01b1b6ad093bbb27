pub mod artic;

use std::future::Future;

use thiserror::Error;

use crate::record::Page;

pub use artic::{ArticClient, ClientError, ClientOptions};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for page {page} failed: {source}")]
    Request {
        page: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("page {page} returned HTTP {status}")]
    Status { page: u32, status: u16 },

    #[error("page {page} returned a malformed payload: {source}")]
    Decode {
        page: u32,
        #[source]
        source: serde_json::Error,
    },
}

/// Produces one page of records for a 1-based page index.
pub trait PageSource {
    fn fetch_page(&self, page: u32) -> impl Future<Output = Result<Page, FetchError>> + Send;
}
