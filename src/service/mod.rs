//! Boundary to the remote license metadata service.
//!
//! - [`fossa`]: HTTP client for the hosted revisions API.
//!
//! Lookups return [`FetchError`] rather than `Ok(None)`: deciding whether a
//! missing revision is fatal belongs to the fetch strategy, not the client.

pub mod fossa;

use async_trait::async_trait;

use crate::fetch::FetchError;
use crate::models::{Locator, Revision};

#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Look up a single locator.
    async fn get_revision(&self, locator: &Locator) -> Result<Revision, FetchError>;

    /// Look up many locators in one round trip. Fails as a unit.
    async fn get_revisions(&self, locators: &[Locator]) -> Result<Vec<Revision>, FetchError>;
}
