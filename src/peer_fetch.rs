//! Fetches a peer data centre's routing document (or a local file standing
//! in for one) and atomically promotes it into place.
//!
//! The staged-write dance — write to a `.download` sibling, then rotate
//! `live -> .bck` and `.download -> live` — means a concurrent reader (the
//! ingest pass in `crate::cache`) never observes a half-written file, and a
//! single `.bck` generation is kept for rollback when the new file turns out
//! to be corrupt.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::RoutingCoreError;

fn download_sibling(save_as: &Path) -> PathBuf {
    let mut name = save_as.as_os_str().to_os_string();
    name.push(".download");
    PathBuf::from(name)
}

fn bck_sibling(save_as: &Path) -> PathBuf {
    let mut name = save_as.as_os_str().to_os_string();
    name.push(".bck");
    PathBuf::from(name)
}

/// Replace the last occurrence of `old` with `new` in `s`.
fn replace_last(s: &str, old: &str, new: &str) -> String {
    match s.rfind(old) {
        Some(idx) => format!("{}{}{}", &s[..idx], new, &s[idx + old.len()..]),
        None => s.to_string(),
    }
}

async fn fetch_http(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// Fetch `method` from `base_url` (HTTP(S) when it has that scheme,
/// otherwise a local file path read directly) and stage it at
/// `save_as.download`. On success, rotate the staged file into place. On
/// failure, `save_as` is left untouched and a [`RoutingCoreError::PeerUnavailable`]
/// is returned.
pub async fn fetch(client: &reqwest::Client, save_as: &Path, base_url: &str, method: &str) -> Result<(), RoutingCoreError> {
    let download_path = download_sibling(save_as);
    let _ = tokio::fs::remove_file(&download_path).await;

    let body = if base_url.starts_with("http://") || base_url.starts_with("https://") {
        let url = format!("{base_url}/{method}");
        match fetch_http(client, &url).await {
            Ok(body) => body,
            Err(primary_err) => {
                warn!(%url, error = %primary_err, "peer fetch failed, retrying with static fallback");
                if method != "dc" {
                    return Err(RoutingCoreError::PeerUnavailable {
                        peer: base_url.to_string(),
                        reason: primary_err.to_string(),
                    });
                }
                let fallback_url = replace_last(base_url, ".xml", ".json");
                fetch_http(client, &fallback_url).await.map_err(|err| {
                    RoutingCoreError::PeerUnavailable {
                        peer: fallback_url.clone(),
                        reason: err.to_string(),
                    }
                })?
            }
        }
    } else {
        tokio::fs::read(base_url)
            .await
            .map_err(|err| RoutingCoreError::PeerUnavailable {
                peer: base_url.to_string(),
                reason: err.to_string(),
            })?
    };

    tokio::fs::write(&download_path, &body)
        .await
        .map_err(RoutingCoreError::Io)?;

    rotate(save_as, &download_path).await
}

/// Promote `download_path` to `save_as`: drop the previous `.bck`, demote the
/// current live file to `.bck`, then rename the staged file into place.
///
/// `pub(crate)` so `crate::cache` can reuse the same rotation dance when it
/// persists a compiled snapshot.
pub(crate) async fn rotate(save_as: &Path, download_path: &Path) -> Result<(), RoutingCoreError> {
    let bck_path = bck_sibling(save_as);

    let _ = tokio::fs::remove_file(&bck_path).await;
    match tokio::fs::rename(save_as, &bck_path).await {
        Ok(()) => debug!(?save_as, ?bck_path, "rotated previous file to backup"),
        Err(err) => debug!(?save_as, %err, "no previous file to rotate to backup"),
    }

    tokio::fs::rename(download_path, save_as)
        .await
        .map_err(|_| {
            RoutingCoreError::RoutingError(format!(
                "could not create the final version of {}",
                save_as.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_last_rewrites_final_occurrence_only() {
        assert_eq!(replace_last("a.xml.xml", ".xml", ".json"), "a.xml.json");
        assert_eq!(replace_last("no-extension", ".xml", ".json"), "no-extension");
    }

    #[tokio::test]
    async fn fetch_from_local_file_rotates_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.xml");
        tokio::fs::write(&source, b"<routing></routing>").await.unwrap();

        let save_as = dir.path().join("routing.xml");
        tokio::fs::write(&save_as, b"<routing><!-- old --></routing>").await.unwrap();

        let client = reqwest::Client::new();
        fetch(&client, &save_as, source.to_str().unwrap(), "localconfig").await.unwrap();

        let contents = tokio::fs::read_to_string(&save_as).await.unwrap();
        assert_eq!(contents, "<routing></routing>");

        let bck = bck_sibling(&save_as);
        let bck_contents = tokio::fs::read_to_string(&bck).await.unwrap();
        assert_eq!(bck_contents, "<routing><!-- old --></routing>");

        assert!(!download_sibling(&save_as).exists());
    }

    #[tokio::test]
    async fn fetch_over_http_rotates_into_place() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<routing></routing>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let save_as = dir.path().join("routing-GFZ.xml");
        let client = reqwest::Client::new();
        fetch(&client, &save_as, &server.uri(), "dc").await.unwrap();

        let contents = tokio::fs::read_to_string(&save_as).await.unwrap();
        assert_eq!(contents, "<routing></routing>");
    }

    #[tokio::test]
    async fn fetch_over_http_falls_back_to_json_for_dc_method() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eidaws-routing.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let save_as = dir.path().join("routing-GFZ.xml");
        let client = reqwest::Client::new();
        let base_url = format!("{}/eidaws-routing.xml", server.uri());
        fetch(&client, &save_as, &base_url, "dc").await.unwrap();

        let contents = tokio::fs::read_to_string(&save_as).await.unwrap();
        assert_eq!(contents, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn fetch_from_missing_local_file_leaves_previous_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let save_as = dir.path().join("routing.xml");
        tokio::fs::write(&save_as, b"<routing><!-- keep --></routing>").await.unwrap();

        let client = reqwest::Client::new();
        let missing = dir.path().join("does-not-exist.xml");
        let result = fetch(&client, &save_as, missing.to_str().unwrap(), "localconfig").await;

        assert!(matches!(result, Err(RoutingCoreError::PeerUnavailable { .. })));
        let contents = tokio::fs::read_to_string(&save_as).await.unwrap();
        assert_eq!(contents, "<routing><!-- keep --></routing>");
    }
}
