use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;

use super::MetadataService;
use crate::fetch::FetchError;
use crate::models::{Locator, Revision};

pub const DEFAULT_ENDPOINT: &str = "https://app.fossa.com";

const USER_AGENT: &str = concat!(
    "license-notice/",
    env!("CARGO_PKG_VERSION"),
    " (license notice generator)"
);

/// Client for the hosted revisions API.
pub struct FossaClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl FossaClient {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            bail!("endpoint `{}` is not a base URL", endpoint);
        }

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    fn api_url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `GET /api/revisions/{locator}`, with the locator as one encoded segment.
    fn revision_url(&self, locator: &Locator) -> Url {
        self.api_url(&["api", "revisions", &locator.to_string()])
    }

    /// `GET /api/revisions?locator=…&locator=…`
    fn revisions_url(&self, locators: &[Locator]) -> Url {
        let mut url = self.api_url(&["api", "revisions"]);
        {
            let mut query = url.query_pairs_mut();
            for locator in locators {
                query.append_pair("locator", &locator.to_string());
            }
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, target: &str) -> Result<T, FetchError> {
        let mut request = request
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("token {}", key));
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            target: target.to_string(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(target.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                target: target.to_string(),
                status,
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Transport {
            target: target.to_string(),
            source,
        })?;

        decode(&body, target)
    }
}

fn decode<T: DeserializeOwned>(body: &str, target: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|source| FetchError::Decode {
        target: target.to_string(),
        source,
    })
}

#[async_trait]
impl MetadataService for FossaClient {
    async fn get_revision(&self, locator: &Locator) -> Result<Revision, FetchError> {
        let target = locator.to_string();
        log::debug!("GET revision {}", target);
        self.send(self.client.get(self.revision_url(locator)), &target)
            .await
    }

    async fn get_revisions(&self, locators: &[Locator]) -> Result<Vec<Revision>, FetchError> {
        if locators.is_empty() {
            return Ok(Vec::new());
        }

        let target = format!("{} locators", locators.len());
        log::debug!("GET revisions for {}", target);
        self.send(self.client.get(self.revisions_url(locators)), &target)
            .await
    }
}
