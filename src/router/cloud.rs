//! # Cloud Relay Queue
//!
//! Devices with no proximity link to a host can drop jobs into a shared
//! document store. The host processes the single oldest pending document
//! at a time and deletes it only after every chunk has been written.
//!
//! ## Document shape
//!
//! | Field | Type | Meaning |
//! |-------|------|---------|
//! | `data` | string | base64 image bytes |
//! | `timestamp` | timestamp | queue order |
//! | `status` | string | `"pending"` |
//! | `type` | string | `image_render` / `text_render` |
//!
//! [`FirestoreQueue`] talks to Cloud Firestore over its REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::debug;

use super::bridge::render_payload;
use super::job::RenderKind;
use crate::error::{RelayError, Result};
use crate::ir;
use crate::printer::PrinterConfig;
use crate::render::RasterOptions;

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "print_jobs";

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// One queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudDocument {
    pub id: String,
    /// base64 image bytes
    pub data: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: String,
    pub kind: RenderKind,
}

impl CloudDocument {
    /// Encode this document as a printer frame list.
    pub fn to_frames(&self, printer: &PrinterConfig) -> Result<Vec<Vec<u8>>> {
        let raster = render_payload(&self.data, self.kind, &RasterOptions::default(), printer)?;
        Ok(ir::encode(&raster.bitmap, None, printer)?.to_frames())
    }
}

/// Shared job queue.
#[async_trait]
pub trait CloudQueue: Send + Sync + 'static {
    /// The oldest pending document whose id is not in `skip`.
    async fn oldest_pending(&self, skip: &[String]) -> Result<Option<CloudDocument>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Firestore REST settings.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub collection: String,
    /// OAuth bearer token, if the rules require one
    pub token: Option<String>,
    pub base_url: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            collection: DEFAULT_COLLECTION.to_string(),
            token: None,
            base_url: FIRESTORE_URL.to_string(),
        }
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.base_url.trim_end_matches('/'),
            self.project_id
        )
    }
}

/// Cloud Firestore queue.
pub struct FirestoreQueue {
    client: reqwest::Client,
    config: FirestoreConfig,
}

impl FirestoreQueue {
    pub fn new(config: FirestoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl CloudQueue for FirestoreQueue {
    async fn oldest_pending(&self, skip: &[String]) -> Result<Option<CloudDocument>> {
        let url = format!("{}:runQuery", self.config.documents_url());
        let body = pending_query(&self.config.collection, skip.len() + 1);
        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| RelayError::Cloud(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RelayError::Cloud(format!(
                "runQuery returned {}",
                response.status()
            )));
        }
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| RelayError::Cloud(format!("runQuery response: {}", e)))?;
        debug!(rows = rows.len(), "Cloud queue polled");

        Ok(rows
            .iter()
            .filter_map(|row| row.get("document"))
            .filter_map(parse_document)
            .find(|doc| !skip.contains(&doc.id)))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = format!(
            "{}/{}/{}",
            self.config.documents_url(),
            self.config.collection,
            id
        );
        let response = self
            .authorize(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| RelayError::Cloud(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RelayError::Cloud(format!(
                "delete {} returned {}",
                id,
                response.status()
            )));
        }
        Ok(())
    }
}

/// `status == "pending"` ordered by `timestamp`, oldest first.
fn pending_query(collection: &str, limit: usize) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": "status" },
                    "op": "EQUAL",
                    "value": { "stringValue": "pending" }
                }
            },
            "orderBy": [{
                "field": { "fieldPath": "timestamp" },
                "direction": "ASCENDING"
            }],
            "limit": limit
        }
    })
}

/// Parse a Firestore REST document.
fn parse_document(doc: &Value) -> Option<CloudDocument> {
    let name = doc.get("name")?.as_str()?;
    let id = name.rsplit('/').next()?.to_string();
    let fields = doc.get("fields");
    let string_field = |key: &str| {
        fields
            .and_then(|f| f.get(key))
            .and_then(|v| v.get("stringValue"))
            .and_then(Value::as_str)
    };

    let timestamp = fields
        .and_then(|f| f.get("timestamp"))
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    let kind = match string_field("type") {
        Some("text_render") => RenderKind::TextRender,
        _ => RenderKind::ImageRender,
    };

    Some(CloudDocument {
        id,
        data: string_field("data").unwrap_or_default().to_string(),
        timestamp,
        status: string_field("status").unwrap_or("pending").to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_document() {
        let doc = json!({
            "name": "projects/demo/databases/(default)/documents/print_jobs/abc123",
            "fields": {
                "data": { "stringValue": "aGVsbG8=" },
                "timestamp": { "timestampValue": "2026-03-01T10:00:00.5Z" },
                "status": { "stringValue": "pending" },
                "type": { "stringValue": "text_render" }
            }
        });
        let parsed = parse_document(&doc).unwrap();
        assert_eq!(parsed.id, "abc123");
        assert_eq!(parsed.data, "aGVsbG8=");
        assert_eq!(parsed.kind, RenderKind::TextRender);
        assert_eq!(parsed.status, "pending");
        assert!(parsed.timestamp.is_some());
    }

    #[test]
    fn test_parse_document_defaults() {
        let doc = json!({ "name": "projects/demo/databases/(default)/documents/print_jobs/x" });
        let parsed = parse_document(&doc).unwrap();
        assert_eq!(parsed.data, "");
        assert_eq!(parsed.kind, RenderKind::ImageRender);
        assert_eq!(parsed.timestamp, None);

        assert_eq!(parse_document(&json!({ "readTime": "2026-03-01T10:00:00Z" })), None);
    }

    #[test]
    fn test_pending_query_shape() {
        let query = pending_query("print_jobs", 3);
        let q = &query["structuredQuery"];
        assert_eq!(q["from"][0]["collectionId"], "print_jobs");
        assert_eq!(q["where"]["fieldFilter"]["value"]["stringValue"], "pending");
        assert_eq!(q["orderBy"][0]["field"]["fieldPath"], "timestamp");
        assert_eq!(q["limit"], 3);
    }

    #[test]
    fn test_documents_url() {
        let mut config = FirestoreConfig::new("demo");
        config.base_url = "http://localhost:8080/v1/".to_string();
        assert_eq!(
            config.documents_url(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents"
        );
    }

    #[test]
    fn test_invalid_document_data() {
        let doc = CloudDocument {
            id: "x".to_string(),
            data: "not base64 at all!".to_string(),
            timestamp: None,
            status: "pending".to_string(),
            kind: RenderKind::ImageRender,
        };
        assert!(doc.to_frames(&PrinterConfig::T02).unwrap_err().is_content_error());
    }
}
