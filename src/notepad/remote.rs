//! Remote notepad backend on an ArangoDB-compatible document store.
//!
//! Notes live in one collection keyed by note id. Listing runs an AQL
//! cursor query so filtering and ordering happen server-side.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Note, NoteFilter, NotepadBackend, NotepadError};

#[derive(Clone)]
pub struct RemoteNotepadConfig {
    pub base_url: String,
    pub database: String,
    pub collection: String,
    pub username: String,
    pub password: String,
    /// Bound on every request, including the liveness probe.
    pub timeout: Duration,
}

impl Default for RemoteNotepadConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8529".to_string(),
            database: "_system".to_string(),
            collection: "shared_notes".to_string(),
            username: "root".to_string(),
            password: String::new(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for RemoteNotepadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteNotepadConfig")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Stored document: the note plus its key and a numeric sort field.
#[derive(Serialize)]
struct NoteDocument<'a> {
    #[serde(rename = "_key")]
    key: &'a str,
    #[serde(flatten)]
    note: &'a Note,
    created_ms: i64,
}

#[derive(Deserialize)]
struct CursorResponse {
    #[serde(default)]
    result: Vec<Note>,
}

const LIST_QUERY: &str = "FOR n IN @@collection \
    FILTER @author == null OR n.author == @author \
    FILTER LENGTH(@tags) == 0 OR LENGTH(INTERSECTION(n.tags, @tags)) > 0 \
    SORT n.created_ms DESC \
    LIMIT @limit \
    RETURN UNSET(n, '_key', '_id', '_rev', 'created_ms')";

pub struct RemoteNotepad {
    client: reqwest::Client,
    config: RemoteNotepadConfig,
}

impl RemoteNotepad {
    pub fn new(config: RemoteNotepadConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn db_url(&self, path: &str) -> String {
        self.url(&format!(
            "/_db/{}{}",
            urlencoding::encode(&self.config.database),
            path
        ))
    }

    fn document_url(&self, id: &str) -> String {
        self.db_url(&format!(
            "/_api/document/{}/{}",
            urlencoding::encode(&self.config.collection),
            urlencoding::encode(id)
        ))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .timeout(self.config.timeout)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, NotepadError> {
        request
            .send()
            .await
            .map_err(|e| NotepadError::Remote(e.to_string()))
    }

    async fn expect_success(response: Response) -> Result<Response, NotepadError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotepadError::Remote(format!("HTTP {}: {}", status.as_u16(), body)))
    }

    /// Liveness probe: `GET /_api/version` must answer 2xx.
    pub async fn probe(&self) -> Result<(), NotepadError> {
        let response = self
            .send(self.request(Method::GET, self.url("/_api/version")))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    /// Create the notes collection if it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), NotepadError> {
        let response = self
            .send(
                self.request(Method::POST, self.db_url("/_api/collection"))
                    .json(&json!({ "name": self.config.collection })),
            )
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Self::expect_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl NotepadBackend for RemoteNotepad {
    fn kind(&self) -> &'static str {
        "remote"
    }

    fn is_persistent(&self) -> bool {
        true
    }

    async fn put(&self, note: Note) -> Result<(), NotepadError> {
        let doc = NoteDocument {
            key: &note.id,
            note: &note,
            created_ms: note.created_at.timestamp_millis(),
        };
        let url = format!(
            "{}?overwriteMode=replace",
            self.db_url(&format!(
                "/_api/document/{}",
                urlencoding::encode(&self.config.collection)
            ))
        );
        let response = self.send(self.request(Method::POST, url).json(&doc)).await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, NotepadError> {
        let response = self
            .send(self.request(Method::GET, self.document_url(id)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response).await?;
        let note = response
            .json::<Note>()
            .await
            .map_err(|e| NotepadError::Remote(e.to_string()))?;
        Ok(Some(note))
    }

    async fn list(&self, filter: &NoteFilter) -> Result<Vec<Note>, NotepadError> {
        let body = json!({
            "query": LIST_QUERY,
            "bindVars": {
                "@collection": self.config.collection,
                "author": filter.author,
                "tags": filter.tags,
                "limit": filter.limit,
            },
            "batchSize": filter.limit.max(1),
        });
        let response = self
            .send(self.request(Method::POST, self.db_url("/_api/cursor")).json(&body))
            .await?;
        let response = Self::expect_success(response).await?;
        let cursor = response
            .json::<CursorResponse>()
            .await
            .map_err(|e| NotepadError::Remote(e.to_string()))?;
        Ok(cursor.result)
    }

    async fn remove(&self, id: &str) -> Result<bool, NotepadError> {
        let response = self
            .send(self.request(Method::DELETE, self.document_url(id)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::expect_success(response).await?;
        Ok(true)
    }

    async fn clear(&self) -> Result<(), NotepadError> {
        let url = self.db_url(&format!(
            "/_api/collection/{}/truncate",
            urlencoding::encode(&self.config.collection)
        ));
        let response = self.send(self.request(Method::PUT, url)).await?;
        Self::expect_success(response).await?;
        tracing::info!(collection = %self.config.collection, "Cleared remote notepad");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{http_response, serve};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn remote(base_url: String) -> RemoteNotepad {
        RemoteNotepad::new(RemoteNotepadConfig {
            base_url,
            password: "secret".to_string(),
            ..RemoteNotepadConfig::default()
        })
    }

    fn note(id: &str) -> Note {
        Note {
            id: id.to_string(),
            content: "remember this".to_string(),
            author: "claude".to_string(),
            created_at: Utc::now(),
            tags: BTreeSet::from(["plan".to_string()]),
        }
    }

    #[tokio::test]
    async fn probe_and_existing_collection_succeed() {
        let (base, requests) = serve(vec![
            http_response("200 OK", "application/json", r#"{"version":"3.11.0"}"#),
            http_response("409 Conflict", "application/json", r#"{"error":true}"#),
        ])
        .await;
        let store = remote(base);

        store.probe().await.unwrap();
        store.ensure_collection().await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].request_line, "GET /_api/version HTTP/1.1");
        assert!(requests[0]
            .authorization
            .as_deref()
            .is_some_and(|a| a.starts_with("Basic ")));
        assert_eq!(requests[1].request_line, "POST /_db/_system/_api/collection HTTP/1.1");
    }

    #[tokio::test]
    async fn put_replaces_by_key() {
        let (base, requests) =
            serve(vec![http_response("202 Accepted", "application/json", "{}")]).await;
        remote(base).put(note("a b")).await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(
            requests[0].request_line,
            "POST /_db/_system/_api/document/shared_notes?overwriteMode=replace HTTP/1.1"
        );
        let doc: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(doc["_key"], "a b");
        assert_eq!(doc["id"], "a b");
        assert_eq!(doc["tags"][0], "plan");
        assert!(doc["created_ms"].is_i64());
    }

    #[tokio::test]
    async fn get_and_remove_treat_404_as_absent() {
        let (base, requests) = serve(vec![
            http_response("404 Not Found", "application/json", r#"{"error":true}"#),
            http_response("404 Not Found", "application/json", r#"{"error":true}"#),
        ])
        .await;
        let store = remote(base);

        assert!(store.get("a b").await.unwrap().is_none());
        assert!(!store.remove("a b").await.unwrap());
        assert_eq!(
            requests.lock().unwrap()[0].request_line,
            "GET /_db/_system/_api/document/shared_notes/a%20b HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn list_runs_filtered_cursor_query() {
        let body = json!({
            "result": [{
                "id": "n1",
                "content": "remember this",
                "author": "claude",
                "created_at": "2024-05-01T09:30:00Z",
                "tags": ["plan"]
            }],
            "hasMore": false
        })
        .to_string();
        let (base, requests) =
            serve(vec![http_response("201 Created", "application/json", &body)]).await;

        let filter = NoteFilter {
            tags: vec!["plan".to_string()],
            author: Some("claude".to_string()),
            limit: 5,
        };
        let notes = remote(base).list(&filter).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, "n1");

        let sent: serde_json::Value =
            serde_json::from_str(&requests.lock().unwrap()[0].body).unwrap();
        assert_eq!(sent["bindVars"]["@collection"], "shared_notes");
        assert_eq!(sent["bindVars"]["author"], "claude");
        assert_eq!(sent["bindVars"]["limit"], 5);
    }

    #[tokio::test]
    async fn server_errors_surface_as_remote_errors() {
        let (base, _) = serve(vec![http_response(
            "500 Internal Server Error",
            "text/plain",
            "boom",
        )])
        .await;
        let err = remote(base).put(note("x")).await.unwrap_err();
        assert!(matches!(err, NotepadError::Remote(msg) if msg.contains("500")));
    }

    #[test]
    fn debug_output_hides_password() {
        let config = RemoteNotepadConfig {
            password: "hunter2".to_string(),
            ..RemoteNotepadConfig::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
