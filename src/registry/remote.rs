use super::extract::UploadFile;
use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// A file as the backend describes it. Listing, search and natural-language
/// search all return this shape with different subsets filled in.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteFileEntry {
    pub key: Option<String>,
    pub name: Option<String>,
    pub original_name: Option<String>,
    pub url: Option<String>,
    pub size: Option<u64>,
    /// Epoch milliseconds or an RFC 3339 string, depending on the backend.
    pub last_modified: Option<Value>,
    pub tags: Option<Vec<String>>,
    pub is_audio_or_video: Option<bool>,
}

/// The backend's file API.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list(&self) -> Result<Vec<RemoteFileEntry>>;

    /// Upload one file. Succeeds only on a 2xx JSON response.
    async fn add(&self, file: &UploadFile) -> Result<Value>;

    /// Succeeds only when the backend answers `{"success": true}`.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn search(&self, query: &str) -> Result<Vec<RemoteFileEntry>>;

    /// Natural-language search.
    async fn ask(&self, query: &str) -> Result<Vec<RemoteFileEntry>>;

    async fn transcript(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Bare(Vec<RemoteFileEntry>),
    Wrapped {
        #[serde(alias = "files")]
        results: Vec<RemoteFileEntry>,
    },
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    files: Vec<RemoteFileEntry>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Path used to list files; backends expose one or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListEndpoint {
    #[default]
    Files,
    ListDocs,
}

impl ListEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            ListEndpoint::Files => "/files",
            ListEndpoint::ListDocs => "/list_docs",
        }
    }
}

/// `RemoteStore` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    list_endpoint: ListEndpoint,
}

impl HttpRemoteStore {
    /// No timeout unless one is given; the transport default applies.
    pub fn new(base_url: &str, list_endpoint: ListEndpoint, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            list_endpoint,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        read_json(response).await
    }
}

/// Check status, then content type, then parse.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(RegistryError::Status {
            status: status.as_u16(),
            body,
        });
    }
    if !content_type.contains("application/json") {
        return Err(RegistryError::UnexpectedContentType { content_type, body });
    }
    serde_json::from_str(&body).map_err(|source| RegistryError::MalformedBody { source, body })
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[instrument(level = "debug", skip(self))]
    async fn list(&self) -> Result<Vec<RemoteFileEntry>> {
        let response = self
            .client
            .get(self.url(self.list_endpoint.path()))
            .send()
            .await?;
        let entries: Vec<RemoteFileEntry> = read_json(response).await?;
        debug!(count = entries.len(), "listed remote files");
        Ok(entries)
    }

    #[instrument(level = "debug", skip(self, file), fields(name = %file.name))]
    async fn add(&self, file: &UploadFile) -> Result<Value> {
        let part = Part::bytes(file.data.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new().part("file", part).text("type", file.file_type());
        let response = self
            .client
            .post(self.url("/add_doc"))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let response: StatusResponse = self.post_json("/delete_doc", &json!({ "key": key })).await?;
        if response.success {
            Ok(())
        } else {
            Err(RegistryError::rejected("delete", response.error))
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<RemoteFileEntry>> {
        let url = format!("{}?q={}", self.url("/search"), urlencoding::encode(query));
        let response = self.client.get(url).send().await?;
        Ok(match read_json(response).await? {
            SearchResponse::Bare(entries) => entries,
            SearchResponse::Wrapped { results } => results,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn ask(&self, query: &str) -> Result<Vec<RemoteFileEntry>> {
        let response: AskResponse = self.post_json("/qwen_search", &json!({ "query": query })).await?;
        if response.success {
            Ok(response.files)
        } else {
            Err(RegistryError::rejected("search", response.error))
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn transcript(&self, key: &str) -> Result<Option<String>> {
        let response: TranscriptResponse =
            self.post_json("/get_transcript", &json!({ "key": key })).await?;
        if response.success {
            Ok(response.transcript)
        } else {
            Err(RegistryError::rejected("transcript", response.error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn store(server: &Server) -> HttpRemoteStore {
        HttpRemoteStore::new(&server.url(), ListEndpoint::Files, Some(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn list_parses_backend_entries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"key":"a1","name":"report.pdf","size":2048,"tags":["budget"],
                    "last_modified":"2024-03-01T12:00:00Z","is_audio_or_video":false}]"#,
            )
            .create_async()
            .await;

        let entries = store(&server).list().await.unwrap();
        mock.assert_async().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.as_deref(), Some("a1"));
        assert_eq!(entries[0].size, Some(2048));
        assert_eq!(entries[0].tags.as_deref(), Some(&["budget".to_string()][..]));
    }

    #[tokio::test]
    async fn list_docs_endpoint_is_selectable() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/list_docs")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let store = HttpRemoteStore::new(&format!("{}/", server.url()), ListEndpoint::ListDocs, None).unwrap();
        assert!(store.list().await.unwrap().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .with_status(503)
            .with_body("down")
            .create_async()
            .await;

        let err = store(&server).list().await.unwrap_err();
        assert!(matches!(err, RegistryError::Status { status: 503, ref body } if body == "down"));
    }

    #[tokio::test]
    async fn html_response_is_rejected_before_parsing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;

        let err = store(&server).list().await.unwrap_err();
        assert!(matches!(err, RegistryError::UnexpectedContentType { .. }));
    }

    #[tokio::test]
    async fn malformed_json_is_reported_with_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[{")
            .create_async()
            .await;

        let err = store(&server).list().await.unwrap_err();
        assert!(matches!(err, RegistryError::MalformedBody { ref body, .. } if body == "[{"));
    }

    #[tokio::test]
    async fn add_posts_multipart_with_type_field() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/add_doc")
            .match_header("content-type", Matcher::Regex("multipart/form-data".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="type"\s+pdf"#.into()),
                Matcher::Regex(r#"name="file"; filename="Report.PDF""#.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"Document added successfully, type: pdf"}"#)
            .create_async()
            .await;

        let file = UploadFile::new("Report.PDF", b"%PDF".to_vec());
        let body = store(&server).add(&file).await.unwrap();
        mock.assert_async().await;
        assert_eq!(body["message"], "Document added successfully, type: pdf");
    }

    #[tokio::test]
    async fn delete_requires_explicit_success_flag() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/delete_doc")
            .match_body(Matcher::Json(json!({"key": "ok"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/delete_doc")
            .match_body(Matcher::Json(json!({"key": "denied"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"error":"locked"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/delete_doc")
            .match_body(Matcher::Json(json!({"key": "bare"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;

        let store = store(&server);
        store.delete("ok").await.unwrap();

        let err = store.delete("denied").await.unwrap_err();
        assert!(matches!(err, RegistryError::Rejected { ref message, .. } if message == "locked"));

        let err = store.delete("bare").await.unwrap_err();
        assert!(matches!(err, RegistryError::Rejected { .. }));
    }

    #[tokio::test]
    async fn search_encodes_query_and_accepts_wrapped_results() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".into(), "budget report".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"original_name":"q1.pdf","tags":["budget"],"url":"http://s3/q1"}]}"#)
            .create_async()
            .await;

        let entries = store(&server).search("budget report").await.unwrap();
        mock.assert_async().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_name.as_deref(), Some("q1.pdf"));
    }

    #[tokio::test]
    async fn ask_and_transcript_surface_backend_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/qwen_search")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"error":"model offline"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/get_transcript")
            .match_body(Matcher::Json(json!({"key": "talk.mp3"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"transcript":null,"error":null}"#)
            .create_async()
            .await;

        let store = store(&server);
        let err = store.ask("slides about budgets").await.unwrap_err();
        assert!(matches!(err, RegistryError::Rejected { ref message, .. } if message == "model offline"));
        assert_eq!(store.transcript("talk.mp3").await.unwrap(), None);
    }
}
