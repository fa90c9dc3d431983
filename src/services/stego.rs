use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::models::job::JobFile;
use crate::services::{DecodeOutcome, ProgressFn, StegoService};

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// HTTP client for the remote stega API.
pub struct HttpStegoClient {
    http: Client,
    config: RwLock<ApiConfig>,
}

#[derive(Deserialize)]
struct DecodeResponse {
    success: bool,
    data: Option<DecodeData>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct DecodeData {
    message: Option<String>,
    model_used: Option<String>,
}

#[derive(Deserialize)]
struct PingResponse {
    ok: bool,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<String>,
}

impl HttpStegoClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            http: Client::new(),
            config: RwLock::new(config),
        }
    }

    /// Swap the API address/timeout at runtime. Takes effect for the next
    /// request; a job already in flight finishes against the old address.
    pub fn set_config(&self, config: ApiConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
    }

    fn config(&self) -> ApiConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn endpoint(base_url: &str, path: &str) -> String {
        format!("{}/api/v1/{}", base_url.trim_end_matches('/'), path)
    }

    /// Connectivity probe used by status indicators; never consulted by
    /// the queue itself.
    pub async fn ping(&self, timeout: Duration) -> bool {
        let config = self.config();
        let url = Self::endpoint(&config.base_url, "ping");
        match self.http.get(&url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<PingResponse>()
                .await
                .map(|ping| ping.ok)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// List the stego models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, StegoError> {
        let config = self.config();
        let url = Self::endpoint(&config.base_url, "models");
        let response = self
            .http
            .get(&url)
            .timeout(config.timeout())
            .send()
            .await
            .map_err(StegoError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StegoError::Status {
                op: "models",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ModelsResponse = response
            .json()
            .await
            .map_err(|e| StegoError::Protocol(format!("models invalid json: {e}")))?;
        Ok(parsed.models)
    }

    /// Build the multipart image part. The bytes are streamed in chunks so
    /// upload progress can be reported as the body is consumed.
    fn image_part(
        file: &JobFile,
        bytes: Vec<u8>,
        on_progress: ProgressFn,
    ) -> Result<Part, StegoError> {
        let total = bytes.len().max(1) as f64;
        let length = bytes.len() as u64;
        let chunks: Vec<Vec<u8>> = bytes.chunks(UPLOAD_CHUNK_BYTES).map(<[u8]>::to_vec).collect();
        let mut sent = 0usize;
        let body = Body::wrap_stream(stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            on_progress(sent as f64 / total);
            Ok::<_, std::io::Error>(chunk)
        })));
        Part::stream_with_length(body, length)
            .file_name(file.upload_name())
            .mime_str("image/jpeg")
            .map_err(StegoError::Http)
    }
}

#[async_trait]
impl StegoService for HttpStegoClient {
    async fn encode(
        &self,
        file: &JobFile,
        short_id: &str,
        on_progress: ProgressFn,
    ) -> Result<PathBuf, StegoError> {
        let config = self.config();
        let url = Self::endpoint(&config.base_url, "encode");
        let bytes = tokio::fs::read(&file.path).await.map_err(StegoError::Io)?;
        let form = Form::new()
            .part("image", Self::image_part(file, bytes, on_progress)?)
            .text("message", short_id.to_string());

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "image/png")
            .timeout(config.timeout())
            .multipart(form)
            .send()
            .await
            .map_err(StegoError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StegoError::Status {
                op: "encode",
                status: status.as_u16(),
                body,
            });
        }

        let png = response.bytes().await.map_err(StegoError::Http)?;
        match image::guess_format(&png) {
            Ok(image::ImageFormat::Png) => {}
            _ => {
                return Err(StegoError::Protocol(
                    "encode response is not a PNG image".to_string(),
                ))
            }
        }

        let output = std::env::temp_dir().join(format!("imgproc_{}.png", Uuid::new_v4()));
        tokio::fs::write(&output, &png).await.map_err(StegoError::Io)?;
        Ok(output)
    }

    async fn decode(
        &self,
        file: &JobFile,
        on_progress: ProgressFn,
    ) -> Result<DecodeOutcome, StegoError> {
        let config = self.config();
        let url = Self::endpoint(&config.base_url, "decode");
        let bytes = tokio::fs::read(&file.path).await.map_err(StegoError::Io)?;
        let form = Form::new().part("image", Self::image_part(file, bytes, on_progress)?);

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .timeout(config.timeout())
            .multipart(form)
            .send()
            .await
            .map_err(StegoError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StegoError::Status {
                op: "decode",
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(StegoError::Http)?;
        let parsed: DecodeResponse = serde_json::from_slice(&body)
            .map_err(|e| StegoError::Protocol(format!("decode invalid json: {e}")))?;

        Ok(DecodeOutcome {
            success: parsed.success,
            message: parsed.data.as_ref().and_then(|data| data.message.clone()),
            model_used: parsed.data.and_then(|data| data.model_used),
            error: parsed.error,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StegoError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{op} http {status}: {body}")]
    Status {
        op: &'static str,
        status: u16,
        body: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
