//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so different libraries
//! (reqwest, ureq, a platform webview bridge) can provide the transport.
//! Bodies are JSON; optimistic-lock rejections arrive as HTTP 409 and
//! vanished records as HTTP 404.

use crate::config::ContentMode;
use crate::error::{SyncError, SyncResult};
use crate::transport::{AssetTransport, ContentTransport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shelfsync_protocol::{
    AssetMetadata, AssetPayload, EntryPayload, PayloadError, ProcessingStatus, PullRequest,
    PullResponse, RecordId, RemoteAsset, RemoteEntry, UploadHandle, WriteAck,
};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

/// A request handed to the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
    /// Content type of the body.
    pub content_type: Option<&'static str>,
}

/// A response returned by the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only for transport-level failures
/// (unreachable host, timeout); an HTTP error status is a normal
/// response.
pub trait HttpClient: Send + Sync {
    /// Sends one request.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// HTTP-based transport for the remote content service.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    mode: ContentMode,
    client: C,
}

#[derive(Serialize)]
struct WriteEnvelope<'a, P: Serialize> {
    payload: &'a P,
    expected_version: Option<u32>,
}

#[derive(Serialize)]
struct LinkEnvelope<'a> {
    handle: &'a UploadHandle,
    metadata: &'a AssetMetadata,
}

#[derive(Deserialize)]
struct UploadCreated {
    handle: UploadHandle,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport rooted at `base_url` for the given mode.
    pub fn new(base_url: impl Into<String>, mode: ContentMode, client: C) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            mode,
            client,
        }
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The content mode this transport addresses.
    pub fn mode(&self) -> ContentMode {
        self.mode
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.mode.path_segment(), path)
    }

    fn dispatch(&self, request: HttpRequest, id: Option<&RecordId>) -> SyncResult<HttpResponse> {
        let response = self.client.send(request).map_err(SyncError::network)?;
        match response.status {
            200..=299 => Ok(response),
            404 => Err(match id {
                Some(id) => SyncError::RemoteMissing { id: id.clone() },
                None => SyncError::Remote("HTTP 404".into()),
            }),
            409 => Err(match id {
                Some(id) => SyncError::VersionConflict { id: id.clone() },
                None => SyncError::Remote("HTTP 409".into()),
            }),
            status => Err(SyncError::Remote(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&response.body)
            ))),
        }
    }

    fn json_body<B: Serialize>(body: &B) -> SyncResult<Vec<u8>> {
        serde_json::to_vec(body)
            .map_err(|e| SyncError::MalformedPayload(PayloadError::malformed(e.to_string())))
    }

    fn decode<R: DeserializeOwned>(response: &HttpResponse) -> SyncResult<R> {
        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::MalformedPayload(PayloadError::malformed(e.to_string())))
    }

    fn get_json<R: DeserializeOwned>(&self, path: &str, id: Option<&RecordId>) -> SyncResult<R> {
        let response = self.dispatch(
            HttpRequest {
                method: HttpMethod::Get,
                url: self.url(path),
                body: None,
                content_type: None,
            },
            id,
        )?;
        Self::decode(&response)
    }

    fn send_json<B: Serialize, R: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
        id: Option<&RecordId>,
    ) -> SyncResult<R> {
        let response = self.dispatch(
            HttpRequest {
                method,
                url: self.url(path),
                body: Some(Self::json_body(body)?),
                content_type: Some("application/json"),
            },
            id,
        )?;
        Self::decode(&response)
    }
}

impl<C: HttpClient> ContentTransport for HttpTransport<C> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.send_json(HttpMethod::Post, "/sync", request, None)
    }

    fn fetch_entry(&self, id: &RecordId) -> SyncResult<Option<RemoteEntry>> {
        match self.get_json(&format!("/entries/{id}"), Some(id)) {
            Ok(entry) => Ok(Some(entry)),
            Err(SyncError::RemoteMissing { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn fetch_asset(&self, id: &RecordId) -> SyncResult<Option<RemoteAsset>> {
        match self.get_json(&format!("/assets/{id}"), Some(id)) {
            Ok(asset) => Ok(Some(asset)),
            Err(SyncError::RemoteMissing { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_entry(
        &self,
        payload: &EntryPayload,
        expected_version: Option<u32>,
    ) -> SyncResult<WriteAck> {
        let envelope = WriteEnvelope {
            payload,
            expected_version,
        };
        self.send_json(
            HttpMethod::Put,
            &format!("/entries/{}", payload.id),
            &envelope,
            Some(&payload.id),
        )
    }

    fn write_asset(
        &self,
        payload: &AssetPayload,
        expected_version: Option<u32>,
    ) -> SyncResult<WriteAck> {
        let envelope = WriteEnvelope {
            payload,
            expected_version,
        };
        self.send_json(
            HttpMethod::Put,
            &format!("/assets/{}", payload.id),
            &envelope,
            Some(&payload.id),
        )
    }

    fn delete_entry(&self, id: &RecordId, expected_version: u32) -> SyncResult<()> {
        self.dispatch(
            HttpRequest {
                method: HttpMethod::Delete,
                url: self.url(&format!("/entries/{id}?version={expected_version}")),
                body: None,
                content_type: None,
            },
            Some(id),
        )?;
        Ok(())
    }

    fn delete_asset(&self, id: &RecordId, expected_version: u32) -> SyncResult<()> {
        self.dispatch(
            HttpRequest {
                method: HttpMethod::Delete,
                url: self.url(&format!("/assets/{id}?version={expected_version}")),
                body: None,
                content_type: None,
            },
            Some(id),
        )?;
        Ok(())
    }
}

impl<C: HttpClient> AssetTransport for HttpTransport<C> {
    fn create_upload(&self, bytes: &[u8]) -> SyncResult<UploadHandle> {
        let response = self.dispatch(
            HttpRequest {
                method: HttpMethod::Post,
                url: self.url("/uploads"),
                body: Some(bytes.to_vec()),
                content_type: Some("application/octet-stream"),
            },
            None,
        )?;
        let created: UploadCreated = Self::decode(&response)?;
        Ok(created.handle)
    }

    fn link_asset(
        &self,
        asset_id: &RecordId,
        handle: &UploadHandle,
        metadata: &AssetMetadata,
    ) -> SyncResult<()> {
        let envelope = LinkEnvelope { handle, metadata };
        self.dispatch(
            HttpRequest {
                method: HttpMethod::Post,
                url: self.url(&format!("/assets/{asset_id}/files")),
                body: Some(Self::json_body(&envelope)?),
                content_type: Some("application/json"),
            },
            Some(asset_id),
        )?;
        Ok(())
    }

    fn poll_processing(&self, asset_id: &RecordId) -> SyncResult<ProcessingStatus> {
        self.get_json(&format!("/assets/{asset_id}/processing"), Some(asset_id))
    }
}
