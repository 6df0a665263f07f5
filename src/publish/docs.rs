//! Thin Docs v1 client: document creation and text insertion.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::auth::TokenProvider;

const DOCS_HOST: &str = "https://docs.googleapis.com/v1";

/// Viewer URL for a document id.
pub fn document_url(document_id: &str) -> String {
    format!("https://docs.google.com/document/d/{}", document_id)
}

pub struct DocsClient {
    http: reqwest::Client,
    token: Arc<TokenProvider>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    #[serde(rename = "documentId")]
    document_id: String,
}

impl DocsClient {
    pub fn new(http: reqwest::Client, token: Arc<TokenProvider>) -> Self {
        Self::with_base_url(http, token, DOCS_HOST)
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

    /// Create an empty document and return its id.
    pub async fn create_document(&self, title: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/documents", self.base_url))
            .bearer_auth(self.token.bearer().await?)
            .json(&json!({ "title": title }))
            .send()
            .await
            .context("Document creation request failed")?;
        if !response.status().is_success() {
            return Err(api_error("document creation", response).await);
        }

        let created: CreatedDocument = response
            .json()
            .await
            .context("Document creation returned invalid JSON")?;
        debug!("Created document '{}' ({})", title, created.document_id);
        Ok(created.document_id)
    }

    /// Insert one text block at a body offset; offset 1 is the very start.
    pub async fn insert_text(&self, document_id: &str, index: i64, text: &str) -> Result<()> {
        let body = json!({
            "requests": [{
                "insertText": {
                    "location": { "index": index },
                    "text": text,
                }
            }]
        });
        let response = self
            .http
            .post(format!("{}/documents/{}:batchUpdate", self.base_url, document_id))
            .bearer_auth(self.token.bearer().await?)
            .json(&body)
            .send()
            .await
            .context("Text insert request failed")?;
        if !response.status().is_success() {
            return Err(api_error("text insert", response).await);
        }
        Ok(())
    }
}

async fn api_error(action: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow!("Docs {} failed with HTTP {}: {}", action, status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DocsClient {
        let http = reqwest::Client::new();
        let token = Arc::new(TokenProvider::with_access_token(http.clone(), "test-token"));
        DocsClient::with_base_url(http, token, server.uri())
    }

    #[test]
    fn viewer_url_follows_the_fixed_template() {
        assert_eq!(
            document_url("abc123"),
            "https://docs.google.com/document/d/abc123"
        );
    }

    #[tokio::test]
    async fn create_document_sends_title_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(json!({"title": "standup - Transcript"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"documentId": "doc-42"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .create_document("standup - Transcript")
            .await
            .unwrap();
        assert_eq!(id, "doc-42");
    }

    #[tokio::test]
    async fn insert_text_targets_the_document_start() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/doc-42:batchUpdate"))
            .and(body_json(json!({
                "requests": [{
                    "insertText": {
                        "location": { "index": 1 },
                        "text": "TRANSCRIPT: standup\nbody",
                    }
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .insert_text("doc-42", 1, "TRANSCRIPT: standup\nbody")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn creation_failure_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficient scope"))
            .mount(&server)
            .await;

        let err = client(&server).create_document("t").await.unwrap_err();
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("insufficient scope"));
    }
}
