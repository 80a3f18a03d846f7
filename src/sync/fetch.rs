use reqwest::Url;

use crate::error::FetchError;
use crate::scene::working_copy::check_unique_ids;
use crate::scene::Scene;
use crate::util::endpoint_url;

/// One-shot retrieval of the authoritative scene for an organization.
///
/// The fetcher knows nothing about cancellation; callers that may have moved
/// on by the time a result arrives must discard it themselves.
#[derive(Clone, Debug)]
pub struct SnapshotFetcher {
    client: reqwest::Client,
    base: Url,
}

impl SnapshotFetcher {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    /// `GET {base}/scene/{org}`
    pub fn scene_url(&self, org: &str) -> Result<Url, FetchError> {
        endpoint_url(&self.base, "scene", org).map_err(FetchError::InvalidUrl)
    }

    /// Fetches and validates the full scene. Either the whole scene is
    /// returned or an error; never a partial scene.
    pub async fn fetch(&self, org: &str) -> Result<Scene, FetchError> {
        let url = self.scene_url(org)?;
        log::debug!("Fetching scene snapshot from {url}");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        let scene: Scene = serde_json::from_str(&body)?;

        check_unique_ids(&scene.items).map_err(FetchError::InvalidScene)?;

        log::info!(
            "Fetched scene \"{}\" for org {org} ({} items)",
            scene.name,
            scene.items.len()
        );
        Ok(scene)
    }
}
