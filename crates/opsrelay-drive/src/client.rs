//! Google Drive v3 client — refresh-token auth + folder listing.
//!
//! Each listing re-exchanges the refresh token for a short-lived access
//! token; cycles are minutes apart, so caching buys nothing and a stale
//! token can never wedge a cycle.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;

use opsrelay_core::config::DriveConfig;
use opsrelay_core::error::{RelayError, Result};
use opsrelay_core::traits::FileSource;
use opsrelay_core::types::FileRecord;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const FIELDS: &str = "nextPageToken, files(id, name, createdTime, webViewLink, size, mimeType)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Drive API client.
pub struct DriveClient {
    config: DriveConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileRecord>,
    next_page_token: Option<String>,
}

impl DriveClient {
    pub fn new(config: DriveConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Exchange the refresh token for an access token.
    pub async fn authenticate(&self) -> Result<String> {
        if self.config.client_id.is_empty() || self.config.refresh_token.is_empty() {
            return Err(RelayError::Config(
                "Drive credentials not configured (client_id / refresh_token)".into(),
            ));
        }

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| RelayError::Auth(format!("Drive token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Auth(format!("Drive token error {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Auth(format!("Invalid Drive token response: {e}")))?;
        Ok(token.access_token)
    }

    async fn list_page(
        &self,
        token: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<FileListResponse> {
        let mut request = self
            .client
            .get(FILES_URL)
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("orderBy", "createdTime desc"),
                ("fields", FIELDS),
                ("pageSize", "100"),
            ])
            .timeout(REQUEST_TIMEOUT);
        if let Some(t) = page_token {
            request = request.query(&[("pageToken", t)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Source(format!("Drive list request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Source(format!("Drive API error {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| RelayError::Source(format!("Invalid Drive list response: {e}")))
    }
}

/// Build the Drive query string for a folder listing.
fn list_query(folder_id: &str, since: Option<DateTime<Utc>>) -> String {
    let mut q = format!(
        "'{}' in parents and mimeType = 'application/pdf' and trashed = false",
        folder_id.replace('\'', "\\'")
    );
    if let Some(ts) = since {
        q.push_str(&format!(
            " and createdTime > '{}'",
            ts.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    q
}

#[async_trait]
impl FileSource for DriveClient {
    async fn list_pdfs(
        &self,
        folder_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FileRecord>> {
        let token = self.authenticate().await?;
        let query = list_query(folder_id, since);

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_page(&token, &query, page_token.as_deref())
                .await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        tracing::debug!("Drive listing: {} PDF(s) in folder {folder_id}", files.len());
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_list_query_basic() {
        let q = list_query("folder123", None);
        assert_eq!(
            q,
            "'folder123' in parents and mimeType = 'application/pdf' and trashed = false"
        );
    }

    #[test]
    fn test_list_query_with_since() {
        let since = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        let q = list_query("folder123", Some(since));
        assert!(q.ends_with("and createdTime > '2026-05-01T10:00:00Z'"));
    }

    #[test]
    fn test_list_query_escapes_quotes() {
        let q = list_query("fo'lder", None);
        assert!(q.starts_with("'fo\\'lder' in parents"));
    }

    #[test]
    fn test_file_list_response_parse() {
        let json = r#"{
            "nextPageToken": "tok2",
            "files": [
                {"id": "a", "name": "daily_counts.pdf", "createdTime": "2026-05-01T10:00:00.000Z",
                 "webViewLink": "https://drive.example/a", "size": "100", "mimeType": "application/pdf"},
                {"id": "b", "name": "menu.pdf", "createdTime": "2026-04-30T09:00:00.000Z"}
            ]
        }"#;
        let page: FileListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.files.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("tok2"));
        assert_eq!(page.files[0].id, "a");
        assert!(page.files[1].web_view_link.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_credentials_rejected() {
        let client = DriveClient::new(DriveConfig::default());
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }
}
