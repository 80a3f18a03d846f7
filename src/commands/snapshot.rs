use crate::error::Result;
use crate::scene::Scene;
use crate::sync::{Endpoints, SnapshotFetcher};

/// One-shot fetch of an organization's scene.
pub async fn fetch_snapshot(server: &str, org: &str) -> Result<Scene> {
    let endpoints = Endpoints::from_server(server)?;
    let scene = SnapshotFetcher::new(endpoints.http).fetch(org).await?;
    Ok(scene)
}

pub fn to_pretty_json(scene: &Scene) -> Result<String> {
    Ok(serde_json::to_string_pretty(scene)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, SyncError};
    use crate::sync::fetch::tests::{scene_json, serve_http};

    #[tokio::test]
    async fn test_snapshot_prints_wire_format() {
        let (base, _requests) = serve_http("200 OK", scene_json()).await;

        let scene = fetch_snapshot(base.as_str(), "finn").await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&to_pretty_json(&scene).unwrap()).unwrap();

        assert_eq!(json["name"], "test scene");
        assert_eq!(json["items"][0]["meshType"], "Cube");
        assert_eq!(json["items"][0]["color"], "#af00f0");
        assert!(json["items"][1].get("color").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_surfaces_status() {
        let (base, _requests) = serve_http("503 Service Unavailable", String::new()).await;

        let err = fetch_snapshot(base.as_str(), "finn").await.unwrap_err();

        assert!(matches!(err, SyncError::Fetch(FetchError::Status(503))));
    }

    #[tokio::test]
    async fn test_snapshot_rejects_bad_server() {
        assert!(matches!(
            fetch_snapshot("::nope::", "finn").await,
            Err(SyncError::Custom(_))
        ));
    }
}
