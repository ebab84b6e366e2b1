//! Google Drive implementation of the RemoteFileGateway trait.
//!
//! Note files live in a single Drive folder, `appDataFolder` by default,
//! which is private to the app and invisible in the user's Drive UI. Every
//! request carries a bearer token from the `AccessTokenProvider`.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AccessTokenProvider;
use crate::config::SyncConfig;
use crate::file_storage::{FileStorageError, RemoteFileGateway};
use crate::models::{Note, RemoteFile};

const APP_DATA_FOLDER: &str = "appDataFolder";
const FILE_FIELDS: &str = "id, name, modifiedTime";

/// Configuration for the Drive gateway.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Folder id holding the note files
    pub folder: String,
    /// Metadata endpoint, e.g. "https://www.googleapis.com/drive/v3"
    pub api_base_url: String,
    /// Upload endpoint, e.g. "https://www.googleapis.com/upload/drive/v3"
    pub upload_base_url: String,
    pub page_size: u32,
    pub request_timeout: Duration,
}

impl From<&SyncConfig> for DriveConfig {
    fn from(sync: &SyncConfig) -> Self {
        Self {
            folder: sync.drive_folder.clone(),
            api_base_url: sync.api_base_url.trim_end_matches('/').to_string(),
            upload_base_url: sync.upload_base_url.trim_end_matches('/').to_string(),
            page_size: sync.page_size,
            request_timeout: sync.request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListPage {
    #[serde(default)]
    files: Vec<RemoteFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<Vec<&'a str>>,
    #[serde(rename = "mimeType")]
    mime_type: &'static str,
}

/// Drive-based remote file gateway.
pub struct DriveStorageService<A> {
    client: Client,
    auth: A,
    config: DriveConfig,
}

impl<A: AccessTokenProvider> DriveStorageService<A> {
    /// Create a new Drive gateway.
    ///
    /// # Returns
    /// * `Ok(DriveStorageService)` - Ready to use gateway
    /// * `Err(FileStorageError)` - If configuration is invalid
    pub fn new(config: DriveConfig, auth: A) -> Result<Self, FileStorageError> {
        if config.folder.is_empty() {
            return Err(FileStorageError::Config("drive folder is required".to_string()));
        }
        if config.page_size == 0 {
            return Err(FileStorageError::Config("page size must be positive".to_string()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FileStorageError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            auth,
            config,
        })
    }

    fn spaces(&self) -> &'static str {
        if self.config.folder == APP_DATA_FOLDER {
            APP_DATA_FOLDER
        } else {
            "drive"
        }
    }

    fn folder_query(&self) -> String {
        format!(
            "'{}' in parents and trashed = false",
            escape_query_value(&self.config.folder)
        )
    }

    async fn list_with_query(&self, q: &str) -> Result<Vec<RemoteFile>, FileStorageError> {
        let url = format!("{}/files", self.config.api_base_url);
        let page_size = self.config.page_size.to_string();
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let token = self.auth.access_token().await?;
            let mut query: Vec<(&str, &str)> = vec![
                ("spaces", self.spaces()),
                ("q", q),
                ("fields", fields.as_str()),
                ("pageSize", page_size.as_str()),
            ];
            if let Some(page) = page_token.as_deref() {
                query.push(("pageToken", page));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .query(&query)
                .send()
                .await
                .map_err(transport_error)?;
            let page: FileListPage = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| FileStorageError::Decode(e.to_string()))?;

            pages += 1;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        tracing::debug!(
            files = files.len(),
            pages = pages,
            folder = %self.config.folder,
            "Listed Drive folder"
        );
        Ok(files)
    }
}

impl<A: AccessTokenProvider> RemoteFileGateway for DriveStorageService<A> {
    async fn list_files(&self) -> Result<Vec<RemoteFile>, FileStorageError> {
        let q = self.folder_query();
        self.list_with_query(&q).await
    }

    async fn find_file(&self, name: &str) -> Result<Option<RemoteFile>, FileStorageError> {
        let q = format!(
            "name = '{}' and {}",
            escape_query_value(name),
            self.folder_query()
        );
        let mut files = self.list_with_query(&q).await?;
        if files.len() > 1 {
            tracing::warn!(
                name = %name,
                count = files.len(),
                "Several Drive files share one note name, using the first"
            );
        }
        Ok(if files.is_empty() {
            None
        } else {
            Some(files.swap_remove(0))
        })
    }

    async fn download(&self, remote_id: &str) -> Result<Note, FileStorageError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(format!("{}/files/{}", self.config.api_base_url, remote_id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(transport_error)?;
        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn upload(
        &self,
        name: &str,
        note: &Note,
        existing_remote_id: Option<&str>,
    ) -> Result<RemoteFile, FileStorageError> {
        let content = serde_json::to_string(note)?;
        let metadata = FileMetadata {
            name,
            // Parents can only be set on create; a PATCH with parents is rejected.
            parents: match existing_remote_id {
                Some(_) => None,
                None => Some(vec![self.config.folder.as_str()]),
            },
            mime_type: "application/json",
        };
        let metadata = serde_json::to_string(&metadata)?;
        let boundary = format!("memorysync-{}", Uuid::now_v7().simple());
        let body = multipart_related_body(&boundary, &metadata, &content);

        let token = self.auth.access_token().await?;
        let request = match existing_remote_id {
            Some(remote_id) => self.client.patch(format!(
                "{}/files/{}",
                self.config.upload_base_url, remote_id
            )),
            None => self
                .client
                .post(format!("{}/files", self.config.upload_base_url)),
        };

        let response = request
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let file: RemoteFile = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| FileStorageError::Decode(e.to_string()))?;

        tracing::info!(
            name = %name,
            remote_id = %file.remote_id,
            replaced = existing_remote_id.is_some(),
            "Uploaded note file to Drive"
        );
        Ok(file)
    }

    async fn delete(&self, remote_id: &str) -> Result<(), FileStorageError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .delete(format!("{}/files/{}", self.config.api_base_url, remote_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;

        match check_status(response).await {
            Ok(_) => {
                tracing::info!(remote_id = %remote_id, "Deleted note file from Drive");
                Ok(())
            }
            Err(FileStorageError::NotFound(_)) => {
                tracing::debug!(remote_id = %remote_id, "Drive file already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn provider_name(&self) -> &'static str {
        "drive"
    }
}

async fn check_status(response: Response) -> Result<Response, FileStorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FileStorageError::from_status(status.as_u16(), truncate(&body, 300)))
}

fn transport_error(err: reqwest::Error) -> FileStorageError {
    if err.is_decode() {
        FileStorageError::Decode(err.to_string())
    } else {
        FileStorageError::Network(err.to_string())
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

/// Escape a value for use inside a single-quoted Drive query string
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build a `multipart/related` body: JSON metadata part, then the content.
pub fn multipart_related_body(boundary: &str, metadata: &str, content: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n\
         --{b}\r\nContent-Type: application/json\r\n\r\n{c}\r\n--{b}--\r\n",
        b = boundary,
        m = metadata,
        c = content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SharedToken;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_service(server: &MockServer, token: SharedToken) -> DriveStorageService<SharedToken> {
        let config = DriveConfig {
            folder: APP_DATA_FOLDER.to_string(),
            api_base_url: format!("{}/drive/v3", server.uri()),
            upload_base_url: format!("{}/upload/drive/v3", server.uri()),
            page_size: 2,
            request_timeout: Duration::from_secs(5),
        };
        DriveStorageService::new(config, token).unwrap()
    }

    #[test]
    fn test_escape_query_value() {
        assert_eq!(escape_query_value("abc.json"), "abc.json");
        assert_eq!(escape_query_value("it's.json"), "it\\'s.json");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_related_body("B", r#"{"name":"a.json"}"#, r#"{"id":"a"}"#);
        assert!(body.starts_with("--B\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n"));
        assert!(body.contains("{\"name\":\"a.json\"}\r\n--B\r\n"));
        assert!(body.ends_with("{\"id\":\"a\"}\r\n--B--\r\n"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DriveConfig {
            folder: String::new(),
            api_base_url: "http://localhost".to_string(),
            upload_base_url: "http://localhost".to_string(),
            page_size: 10,
            request_timeout: Duration::from_secs(5),
        };
        assert!(DriveStorageService::new(config, SharedToken::new("t")).is_err());
    }

    #[test]
    fn test_config_from_sync_settings() {
        let sync = SyncConfig {
            api_base_url: "http://localhost:1/drive/v3/".to_string(),
            ..SyncConfig::default()
        };
        let config = DriveConfig::from(&sync);
        assert_eq!(config.api_base_url, "http://localhost:1/drive/v3");
        assert_eq!(config.folder, APP_DATA_FOLDER);
    }

    #[tokio::test]
    async fn test_list_files_follows_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"files": [{"id": "r3", "name": "c.json", "modifiedTime": "2025-01-03T00:00:00.000Z"}]}"#,
            ))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("spaces", "appDataFolder"))
            .and(query_param("q", "'appDataFolder' in parents and trashed = false"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "nextPageToken": "page-2",
                    "files": [
                        {"id": "r1", "name": "a.json", "modifiedTime": "2025-01-01T00:00:00.000Z"},
                        {"id": "r2", "name": "b.json", "modifiedTime": "2025-01-02T00:00:00.000Z"}
                    ]
                }"#,
            ))
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::new("ya29.test"));
        let files = service.list_files().await.unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
        assert_eq!(files[2].remote_id, "r3");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::new("expired"));
        let err = service.list_files().await.unwrap_err();
        assert!(matches!(err, FileStorageError::Auth(_)));
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"files": []}"#))
            .expect(0)
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::signed_out());
        let err = service.list_files().await.unwrap_err();
        assert!(matches!(err, FileStorageError::Auth(_)));
    }

    #[tokio::test]
    async fn test_download_decodes_note() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/r1"))
            .and(query_param("alt", "media"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id": "def", "timestamp": 500, "content": "hi"}"#),
            )
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::new("t"));
        let note = service.download("r1").await.unwrap();
        assert_eq!(note.id, "def");
        assert_eq!(note.timestamp, 500);
        assert_eq!(note.content(), Some("hi"));
    }

    #[tokio::test]
    async fn test_download_rejects_garbage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::new("t"));
        let err = service.download("r1").await.unwrap_err();
        assert!(matches!(err, FileStorageError::Decode(_)));
    }

    #[tokio::test]
    async fn test_upload_create_posts_with_parent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(body_string_contains(r#""parents":["appDataFolder"]"#))
            .and(body_string_contains(r#""id":"abc""#))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id": "new-id", "name": "abc.json", "modifiedTime": "2025-01-01T00:00:00.000Z"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::new("t"));
        let file = service
            .upload("abc.json", &Note::with_id("abc", 1000), None)
            .await
            .unwrap();
        assert_eq!(file.remote_id, "new-id");
    }

    #[tokio::test]
    async fn test_upload_replace_patches_existing() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/upload/drive/v3/files/r9"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id": "r9", "name": "ghi.json", "modifiedTime": "2025-02-01T00:00:00.000Z"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::new("t"));
        let file = service
            .upload("ghi.json", &Note::with_id("ghi", 3000), Some("r9"))
            .await
            .unwrap();
        assert_eq!(file.remote_id, "r9");
        assert_eq!(file.modified_time, "2025-02-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_delete_treats_missing_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/drive/v3/files/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/drive/v3/files/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::new("t"));
        assert!(service.delete("gone").await.is_ok());
        assert!(matches!(
            service.delete("busy").await.unwrap_err(),
            FileStorageError::Network(_)
        ));
    }

    #[tokio::test]
    async fn test_find_file_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param(
                "q",
                "name = 'abc.json' and 'appDataFolder' in parents and trashed = false",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"files": [{"id": "r1", "name": "abc.json", "modifiedTime": "t1"}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"files": []}"#))
            .with_priority(10)
            .mount(&server)
            .await;

        let service = test_service(&server, SharedToken::new("t"));
        assert_eq!(
            service.find_file("abc.json").await.unwrap().map(|f| f.remote_id),
            Some("r1".to_string())
        );
        assert!(service.find_file("zzz.json").await.unwrap().is_none());
    }
}
