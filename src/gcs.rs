//! Object storage access over the Cloud Storage JSON API.
//!
//! [`ObjectStore`] is the seam the pipeline and the metadata store talk
//! through; [`GcsClient`] implements it against one bucket.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::auth::TokenProvider;

const STORAGE_HOST: &str = "https://storage.googleapis.com";

/// One object as returned by a listing call.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Full object path within the bucket.
    pub name: String,
    pub size: u64,
}

/// Bucket operations the pipeline needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All objects under the prefix, across every listing page.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>>;

    /// Download one object to a local path, creating parent directories.
    async fn download_to_file(&self, object: &str, dest: &Path) -> Result<()>;

    /// Fetch a whole object as text, or `None` if it does not exist.
    async fn fetch_string(&self, object: &str) -> Result<Option<String>>;

    /// Create or overwrite an object with the given text body.
    async fn put_string(&self, object: &str, body: String, content_type: &str) -> Result<()>;
}

/// One candidate source file, produced fresh by discovery each run.
#[derive(Debug, Clone)]
pub struct AudioObject {
    /// Object basename, e.g. `meeting.m4a`.
    pub filename: String,
    /// Full object path within the bucket.
    pub remote_path: String,
    pub size_bytes: u64,
}

impl AudioObject {
    fn from_stored(object: StoredObject) -> Self {
        let filename = match object.name.rsplit_once('/') {
            Some((_, base)) => base.to_string(),
            None => object.name.clone(),
        };
        Self {
            filename,
            remote_path: object.name,
            size_bytes: object.size,
        }
    }

    /// Whole megabytes, for display.
    pub fn size_mb(&self) -> u64 {
        self.size_bytes / (1024 * 1024)
    }
}

/// List the audio area and keep only objects with the configured suffix.
pub async fn discover_audio(
    store: &dyn ObjectStore,
    prefix: &str,
    suffix: &str,
) -> Result<Vec<AudioObject>> {
    let objects = store.list_objects(prefix).await?;
    Ok(objects
        .into_iter()
        .filter(|object| object.name.ends_with(suffix))
        .map(AudioObject::from_stored)
        .collect())
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListedObject>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// The JSON API reports object sizes as decimal strings.
#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    size: Option<String>,
}

impl From<ListedObject> for StoredObject {
    fn from(entry: ListedObject) -> Self {
        let size = entry
            .size
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0);
        Self {
            name: entry.name,
            size,
        }
    }
}

/// Cloud Storage JSON API client, scoped to one bucket.
pub struct GcsClient {
    http: reqwest::Client,
    token: Arc<TokenProvider>,
    bucket: String,
    base_url: String,
}

impl GcsClient {
    pub fn new(http: reqwest::Client, token: Arc<TokenProvider>, bucket: impl Into<String>) -> Self {
        Self::with_base_url(http, token, bucket, STORAGE_HOST)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        token: Arc<TokenProvider>,
        bucket: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token,
            bucket: bucket.into(),
            base_url: base_url.into(),
        }
    }

    fn list_url(&self) -> String {
        format!("{}/storage/v1/b/{}/o", self.base_url, self.bucket)
    }

    fn object_url(&self, object: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            self.bucket,
            encode_object(object)
        )
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket)
    }

    async fn api_error(&self, action: &str, object: &str, response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow!(
            "Storage {} for '{}' failed with HTTP {}: {}",
            action,
            object,
            status,
            body
        )
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.list_url())
                .bearer_auth(self.token.bearer().await?)
                .query(&[("prefix", prefix)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .context("Object listing request failed")?;
            if !response.status().is_success() {
                return Err(self.api_error("listing", prefix, response).await);
            }

            let page: ListResponse = response
                .json()
                .await
                .context("Object listing returned invalid JSON")?;
            objects.extend(page.items.into_iter().map(StoredObject::from));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} objects under '{}'", objects.len(), prefix);
        Ok(objects)
    }

    async fn download_to_file(&self, object: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let response = self
            .http
            .get(self.object_url(object))
            .bearer_auth(self.token.bearer().await?)
            .query(&[("alt", "media")])
            .send()
            .await
            .with_context(|| format!("Download request for '{}' failed", object))?;
        if !response.status().is_success() {
            return Err(self.api_error("download", object, response).await);
        }

        let mut file = fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download stream interrupted")?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
        }
        file.flush().await?;

        debug!("Downloaded '{}' to {}", object, dest.display());
        Ok(())
    }

    async fn fetch_string(&self, object: &str) -> Result<Option<String>> {
        let response = self
            .http
            .get(self.object_url(object))
            .bearer_auth(self.token.bearer().await?)
            .query(&[("alt", "media")])
            .send()
            .await
            .with_context(|| format!("Fetch request for '{}' failed", object))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.api_error("fetch", object, response).await);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of '{}'", object))?;
        Ok(Some(body))
    }

    async fn put_string(&self, object: &str, body: String, content_type: &str) -> Result<()> {
        let response = self
            .http
            .post(self.upload_url())
            .bearer_auth(self.token.bearer().await?)
            .query(&[("uploadType", "media"), ("name", object)])
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Upload request for '{}' failed", object))?;
        if !response.status().is_success() {
            return Err(self.api_error("upload", object, response).await);
        }

        debug!("Uploaded '{}'", object);
        Ok(())
    }
}

/// Object paths go into URL segments, so everything outside `[0-9A-Za-z]`
/// (notably `/`) must be escaped.
fn encode_object(object: &str) -> String {
    utf8_percent_encode(object, NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenProvider;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GcsClient {
        let http = reqwest::Client::new();
        let token = Arc::new(TokenProvider::with_access_token(http.clone(), "test-token"));
        GcsClient::with_base_url(http, token, "test-bucket", server.uri())
    }

    #[test]
    fn object_paths_are_percent_encoded() {
        assert_eq!(
            encode_object("audio_files/my talk.m4a"),
            "audio%5Ffiles%2Fmy%20talk%2Em4a"
        );
    }

    #[tokio::test]
    async fn discovery_paginates_and_filters_by_suffix() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/storage/v1/b/test-bucket/o"))
            .and(query_param("prefix", "audio_files/"))
            .and(query_param("pageToken", "page-2"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "audio_files/beta.m4a", "size": "1048576"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/storage/v1/b/test-bucket/o"))
            .and(query_param("prefix", "audio_files/"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"name": "audio_files/", "size": "0"},
                    {"name": "audio_files/alpha.m4a", "size": "3145728"},
                    {"name": "audio_files/notes.txt", "size": "64"}
                ],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = client(&server);
        let found = discover_audio(&store, "audio_files/", ".m4a").await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].filename, "alpha.m4a");
        assert_eq!(found[0].remote_path, "audio_files/alpha.m4a");
        assert_eq!(found[0].size_mb(), 3);
        assert_eq!(found[1].filename, "beta.m4a");
        assert_eq!(found[1].size_mb(), 1);
    }

    #[tokio::test]
    async fn download_streams_to_a_new_nested_path() {
        let server = MockServer::start().await;
        let object = "audio_files/meeting.m4a";

        Mock::given(method("GET"))
            .and(path(format!(
                "/storage/v1/b/test-bucket/o/{}",
                encode_object(object)
            )))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"audio-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("scratch").join("meeting.m4a");
        client(&server).download_to_file(object, &dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"audio-bytes");
    }

    #[tokio::test]
    async fn fetch_string_distinguishes_missing_from_present() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!(
                "/storage/v1/b/test-bucket/o/{}",
                encode_object("metadata/present.json")
            )))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"pending"}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/storage/v1/b/test-bucket/o/{}",
                encode_object("metadata/absent.json")
            )))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = client(&server);
        assert_eq!(
            store.fetch_string("metadata/present.json").await.unwrap(),
            Some(r#"{"status":"pending"}"#.to_string())
        );
        assert_eq!(store.fetch_string("metadata/absent.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_string_uploads_media_with_object_name() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/test-bucket/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "metadata/meeting.json"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"status":"completed"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .put_string(
                "metadata/meeting.json",
                r#"{"status":"completed"}"#.to_string(),
                "application/json",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn listing_failure_reports_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/test-bucket/o"))
            .respond_with(ResponseTemplate::new(403).set_body_string("access denied"))
            .mount(&server)
            .await;

        let err = client(&server).list_objects("audio_files/").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("403"));
        assert!(message.contains("access denied"));
    }
}
