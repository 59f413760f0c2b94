//! Revision retrieval strategies.
//!
//! [`FetchMode::Batch`] asks the service for a whole module in one round trip
//! and treats any failure as fatal. [`FetchMode::PerItem`] asks for one locator
//! at a time, in input order, and keeps going past failures so the caller can
//! see exactly which dependencies lack license data.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Locator, Revision};
use crate::progress::Progress;
use crate::service::MetadataService;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {target} failed: {source}")]
    Transport {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("metadata service answered {status} for {target}")]
    Status {
        target: String,
        status: reqwest::StatusCode,
    },

    #[error("no revision found for {0}")]
    NotFound(String),

    #[error("could not decode response for {target}: {source}")]
    Decode {
        target: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("fetching did not finish within {0:?}")]
    Deadline(Duration),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    #[default]
    Batch,
    PerItem,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub mode: FetchMode,
    /// Lookups in flight at once in per-item mode. `1` is strictly sequential.
    pub jobs: usize,
    /// Limit for the whole fetch phase.
    pub deadline: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            mode: FetchMode::Batch,
            jobs: 1,
            deadline: None,
        }
    }
}

/// Normalized locators belonging to one analyzed module.
#[derive(Debug, Clone)]
pub struct LocatorGroup {
    pub module: String,
    pub locators: Vec<Locator>,
}

#[derive(Debug, Default)]
pub struct Fetched {
    pub revisions: Vec<Revision>,
    /// Per-item lookups that failed. Always empty in batch mode.
    pub failures: Vec<FetchError>,
}

pub struct Fetcher<'a> {
    service: &'a dyn MetadataService,
    progress: &'a dyn Progress,
    options: FetchOptions,
}

impl<'a> Fetcher<'a> {
    pub fn new(service: &'a dyn MetadataService, progress: &'a dyn Progress, options: FetchOptions) -> Self {
        Self {
            service,
            progress,
            options,
        }
    }

    pub async fn fetch(&self, groups: &[LocatorGroup]) -> Result<Fetched, FetchError> {
        let work = async {
            match self.options.mode {
                FetchMode::Batch => self.fetch_batch(groups).await,
                FetchMode::PerItem => Ok(self.fetch_each(groups).await),
            }
        };

        let result = match self.options.deadline {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or(Err(FetchError::Deadline(limit))),
            None => work.await,
        };

        self.progress.finish();
        result
    }

    async fn fetch_batch(&self, groups: &[LocatorGroup]) -> Result<Fetched, FetchError> {
        let mut revisions = Vec::new();

        for group in groups {
            if group.locators.is_empty() {
                continue;
            }
            self.progress
                .start(&format!("Fetching License Info: {}", group.module));
            let mut fetched = self.service.get_revisions(&group.locators).await?;
            log::debug!(
                "{}: {} of {} locators returned",
                group.module,
                fetched.len(),
                group.locators.len()
            );
            revisions.append(&mut fetched);
        }

        Ok(Fetched {
            revisions,
            failures: Vec::new(),
        })
    }

    async fn fetch_each(&self, groups: &[LocatorGroup]) -> Fetched {
        let mut fetched = Fetched::default();
        let jobs = self.options.jobs.max(1);

        for group in groups {
            let total = group.locators.len();
            let results: Vec<Result<Revision, FetchError>> = stream::iter(group.locators.iter().enumerate())
                .map(|(i, locator)| async move {
                    self.progress.step(i + 1, total, &locator.package);
                    let result = self.service.get_revision(locator).await;
                    if let Err(err) = &result {
                        self.progress.warn(&err.to_string());
                    }
                    result
                })
                .buffered(jobs)
                .collect()
                .await;

            for result in results {
                match result {
                    Ok(rev) => fetched.revisions.push(rev),
                    Err(err) => fetched.failures.push(err),
                }
            }
        }

        fetched
    }
}
