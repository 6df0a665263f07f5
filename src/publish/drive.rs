//! Thin Drive v3 client: folder lookup, folder creation, and file moves.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::auth::TokenProvider;

const DRIVE_HOST: &str = "https://www.googleapis.com/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

pub struct DriveClient {
    http: reqwest::Client,
    token: Arc<TokenProvider>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct FileParents {
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, token: Arc<TokenProvider>) -> Self {
        Self::with_base_url(http, token, DRIVE_HOST)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        token: Arc<TokenProvider>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token,
            base_url: base_url.into(),
        }
    }

    /// Id of a folder with this name under the parent, if one exists.
    pub async fn find_folder(&self, name: &str, parent: &str) -> Result<Option<String>> {
        let query = format!(
            "name='{}' and '{}' in parents and mimeType='{}' and trashed=false",
            escape_query_value(name),
            escape_query_value(parent),
            FOLDER_MIME_TYPE
        );
        let response = self
            .http
            .get(format!("{}/files", self.base_url))
            .bearer_auth(self.token.bearer().await?)
            .query(&[
                ("q", query.as_str()),
                ("spaces", "drive"),
                ("fields", "files(id,name)"),
            ])
            .send()
            .await
            .context("Folder lookup request failed")?;
        if !response.status().is_success() {
            return Err(api_error("folder lookup", response).await);
        }

        let list: FileList = response
            .json()
            .await
            .context("Folder lookup returned invalid JSON")?;
        Ok(list.files.into_iter().next().map(|file| {
            debug!("Found folder '{}' ({})", file.name, file.id);
            file.id
        }))
    }

    /// Create a folder under the parent and return its id.
    pub async fn create_folder(&self, name: &str, parent: &str) -> Result<String> {
        let body = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent],
        });
        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .bearer_auth(self.token.bearer().await?)
            .json(&body)
            .send()
            .await
            .context("Folder creation request failed")?;
        if !response.status().is_success() {
            return Err(api_error("folder creation", response).await);
        }

        let created: CreatedFile = response
            .json()
            .await
            .context("Folder creation returned invalid JSON")?;
        Ok(created.id)
    }

    pub async fn find_or_create_folder(&self, name: &str, parent: &str) -> Result<String> {
        if let Some(id) = self.find_folder(name, parent).await? {
            return Ok(id);
        }
        let id = self.create_folder(name, parent).await?;
        info!("Created folder '{}' ({})", name, id);
        Ok(id)
    }

    /// Move a file into a new parent, detaching it from all current ones.
    pub async fn move_file(&self, file_id: &str, new_parent: &str) -> Result<()> {
        let current = self.file_parents(file_id).await?;

        let mut request = self
            .http
            .patch(format!("{}/files/{}", self.base_url, file_id))
            .bearer_auth(self.token.bearer().await?)
            .query(&[("addParents", new_parent), ("fields", "id,parents")])
            .json(&json!({}));
        if !current.is_empty() {
            request = request.query(&[("removeParents", current.join(",").as_str())]);
        }

        let response = request.send().await.context("File move request failed")?;
        if !response.status().is_success() {
            return Err(api_error("file move", response).await);
        }

        debug!("Moved file {} into {}", file_id, new_parent);
        Ok(())
    }

    async fn file_parents(&self, file_id: &str) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/files/{}", self.base_url, file_id))
            .bearer_auth(self.token.bearer().await?)
            .query(&[("fields", "parents")])
            .send()
            .await
            .context("Parent lookup request failed")?;
        if !response.status().is_success() {
            return Err(api_error("parent lookup", response).await);
        }

        let parents: FileParents = response
            .json()
            .await
            .context("Parent lookup returned invalid JSON")?;
        Ok(parents.parents)
    }
}

async fn api_error(action: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow!("Drive {} failed with HTTP {}: {}", action, status, body)
}

/// Values embedded in a Drive query string need their quotes escaped.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
