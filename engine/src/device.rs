// --- Device HTTP API -----------------------------------------------------
//
// The device runs a small async web server on its soft-AP. Its contract:
//
//   GET    /getFiles       -> {"files":[...]}
//   GET    /storage        -> {"used":N,"total":N}
//   POST   /upload         multipart "file"
//   DELETE /delete?name=   -> text
//   POST   /resetChannels  -> text
//   POST   /processFiles   multipart "channels" = JSON [{name,channel}]
//   POST   /play           -> text
//   GET    /getFrequency   -> {"frequency":N}
//   POST   /setFrequency   JSON {"frequency":N} -> text
//
// `DeviceApi` is the seam the panel is written against; `HttpDevice` is the
// reqwest implementation. Futures are `Send` so panel operations can run inside
// axum handlers and spawned tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeviceError;
use crate::registry::{Channel, ChannelAssignment};

/// Byte-level upload progress: `(bytes_sent, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

// Upload bodies are fed to the connection in slices this size so progress
// callbacks fire at a useful granularity.
const UPLOAD_CHUNK: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageStatus {
    pub used: u64,
    pub total: u64,
}

/// Outcome of processing one file. The device omits `numbers`/`numberCount`
/// when extraction failed and sets `error` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub filename: String,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numbers: Option<Vec<f64>>,
    #[serde(rename = "numberCount", default, skip_serializing_if = "Option::is_none")]
    pub number_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "selfCheck", default, skip_serializing_if = "Option::is_none")]
    pub self_check: Option<String>,
}

impl ProcessingResult {
    /// Extracted values as a comma-separated list for the results table.
    pub fn numbers_text(&self) -> String {
        self.numbers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A file handed to the panel for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

pub trait DeviceApi: Send + Sync + 'static {
    fn list_files(&self) -> impl Future<Output = Result<Vec<String>, DeviceError>> + Send;

    fn storage(&self) -> impl Future<Output = Result<StorageStatus, DeviceError>> + Send;

    fn upload(
        &self,
        file: UploadFile,
        progress: ProgressFn,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn delete_file(&self, name: &str) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn reset_channels(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn process_files(
        &self,
        selection: &[ChannelAssignment],
    ) -> impl Future<Output = Result<Vec<ProcessingResult>, DeviceError>> + Send;

    /// Returns the device's status text.
    fn play(&self) -> impl Future<Output = Result<String, DeviceError>> + Send;

    /// `None` when the device answered without a `frequency` field.
    fn get_frequency(&self) -> impl Future<Output = Result<Option<u32>, DeviceError>> + Send;

    /// Returns the device's confirmation text.
    fn set_frequency(&self, hz: u32) -> impl Future<Output = Result<String, DeviceError>> + Send;
}

#[derive(Deserialize)]
struct FileListing {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Deserialize)]
struct ProcessingResponse {
    #[serde(default)]
    results: Vec<ProcessingResult>,
}

#[derive(Deserialize)]
struct FrequencyReply {
    frequency: Option<u32>,
}

#[derive(Serialize)]
struct FrequencyRequest {
    frequency: u32,
}

// Endpoints whose duration grows with the data involved. They are bounded by
// the connect timeout only; everything else also gets the request timeout.
const BULK_ENDPOINTS: [&str; 2] = ["/upload", "/processFiles"];

#[derive(Clone)]
pub struct HttpDevice {
    http: reqwest::Client,
    base: String,
    timeout: Duration,
}

impl HttpDevice {
    /// `timeout` bounds connecting and, except for uploads and processing,
    /// the whole request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DeviceError::transport("client", e))?;
        Ok(Self::with_client(http, base_url, timeout))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, DeviceError> {
        let req = if BULK_ENDPOINTS.contains(&endpoint) {
            req
        } else {
            req.timeout(self.timeout)
        };
        let resp = req
            .send()
            .await
            .map_err(|e| DeviceError::transport(endpoint, e))?;
        let status = resp.status();
        debug!("{endpoint} -> {status}");
        if status.is_success() {
            return Ok(resp);
        }
        // The body usually carries the device's own explanation; keep it.
        let body = resp.text().await.unwrap_or_default();
        Err(DeviceError::status(endpoint, status.as_u16(), body))
    }

    async fn send_text(
        &self,
        endpoint: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<String, DeviceError> {
        self.send(endpoint, req)
            .await?
            .text()
            .await
            .map_err(|e| DeviceError::transport(endpoint, e))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<T, DeviceError> {
        self.send(endpoint, req)
            .await?
            .json::<T>()
            .await
            .map_err(|e| DeviceError::transport(endpoint, e))
    }
}

/// Split `data` into cheap slices and report cumulative progress as each one
/// is pulled by the connection.
fn progress_body(data: Bytes, progress: ProgressFn) -> reqwest::Body {
    let total = data.len() as u64;
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(UPLOAD_CHUNK)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK).min(data.len())))
        .collect();

    let mut sent = 0u64;
    let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        progress(sent, total);
        Ok::<Bytes, std::io::Error>(chunk)
    }));
    reqwest::Body::wrap_stream(stream)
}

impl DeviceApi for HttpDevice {
    async fn list_files(&self) -> Result<Vec<String>, DeviceError> {
        let listing: FileListing = self
            .send_json("/getFiles", self.http.get(self.url("/getFiles")))
            .await?;
        Ok(listing.files)
    }

    async fn storage(&self) -> Result<StorageStatus, DeviceError> {
        self.send_json("/storage", self.http.get(self.url("/storage")))
            .await
    }

    async fn upload(&self, file: UploadFile, progress: ProgressFn) -> Result<(), DeviceError> {
        let total = file.data.len() as u64;
        if total == 0 {
            progress(0, 0);
        }
        let part = Part::stream_with_length(progress_body(file.data, progress), total)
            .file_name(file.name);
        let form = Form::new().part("file", part);
        self.send("/upload", self.http.post(self.url("/upload")).multipart(form))
            .await?;
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> Result<(), DeviceError> {
        let req = self
            .http
            .delete(self.url("/delete"))
            .query(&[("name", name)]);
        self.send("/delete", req).await?;
        Ok(())
    }

    async fn reset_channels(&self) -> Result<(), DeviceError> {
        self.send("/resetChannels", self.http.post(self.url("/resetChannels")))
            .await?;
        Ok(())
    }

    async fn process_files(
        &self,
        selection: &[ChannelAssignment],
    ) -> Result<Vec<ProcessingResult>, DeviceError> {
        let channels = serde_json::to_string(selection)?;
        let form = Form::new().text("channels", channels);
        let reply: ProcessingResponse = self
            .send_json(
                "/processFiles",
                self.http.post(self.url("/processFiles")).multipart(form),
            )
            .await?;
        Ok(reply.results)
    }

    async fn play(&self) -> Result<String, DeviceError> {
        self.send_text("/play", self.http.post(self.url("/play")))
            .await
    }

    async fn get_frequency(&self) -> Result<Option<u32>, DeviceError> {
        let reply: FrequencyReply = self
            .send_json("/getFrequency", self.http.get(self.url("/getFrequency")))
            .await?;
        Ok(reply.frequency)
    }

    async fn set_frequency(&self, hz: u32) -> Result<String, DeviceError> {
        let req = self
            .http
            .post(self.url("/setFrequency"))
            .json(&FrequencyRequest { frequency: hz });
        self.send_text("/setFrequency", req).await
    }
}
