// ABOUTME: HTTP client for communicating with the EEG processing backend
// ABOUTME: Handles uploads, job start, status queries and artifact downloads

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::Path;

use super::models::{ErrorBody, ProcessResponse, StatusResponse, UploadResponse};
use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::job::poller::StatusSource;
use crate::job::record::{JobPhase, JobStatusRecord};

/// Recording formats the backend can analyse.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = [".set", ".edf", ".bdf"];

pub struct RemoteClient {
    client: Client,
    api_base_url: String,
    api_base: Url,
}

/// Outcome of asking for a job's results.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultsOutcome {
    Ready(JobStatusRecord),
    NotReady(JobPhase),
}

impl RemoteClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        let api_base = Url::parse(&config.backend_url)
            .with_context(|| format!("Invalid backend URL '{}'", config.backend_url))?;

        Ok(Self {
            client,
            api_base_url: config.backend_url.clone(),
            api_base,
        })
    }

    /// Backend URL for `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn base_url(&self) -> &str {
        &self.api_base_url
    }

    pub async fn upload_file(&self, path: &Path) -> Result<UploadResponse> {
        let url = self.endpoint(&["api", "upload"]);
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .context("EEG file path has no file name")?
            .to_string();
        check_extension(&filename)?;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        tracing::info!("Uploading {} ({} bytes)", filename, data.len());
        let form = Form::new().part("file", Part::bytes(data).file_name(filename));

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .context("Failed to upload file to the backend. Is the server running?")?;

        if !response.status().is_success() {
            let message = error_detail(response, "Failed to upload file").await;
            anyhow::bail!(message);
        }

        let upload: UploadResponse = response
            .json()
            .await
            .context("Failed to parse upload response")?;

        Ok(upload)
    }

    pub async fn start_processing(&self, file_id: &str) -> Result<ProcessResponse> {
        if file_id.trim().is_empty() {
            anyhow::bail!("Missing file ID. Please upload a file first.");
        }
        let url = self.endpoint(&["api", "process", file_id]);

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to start processing on the backend")?;

        if !response.status().is_success() {
            let message = error_detail(response, "Failed to start processing").await;
            anyhow::bail!(message);
        }

        let process: ProcessResponse = response
            .json()
            .await
            .context("Failed to parse process response")?;

        if process.job_id.is_empty() || process.status.is_empty() {
            anyhow::bail!("Invalid response format from server");
        }
        tracing::info!("Processing started with job_id: {}", process.job_id);

        Ok(process)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<StatusResponse, FetchError> {
        let url = self.endpoint(&["api", "status", job_id]);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let code = response.status().as_u16();
            let message = error_detail(response, "Failed to fetch processing status").await;
            return Err(FetchError::Status { code, message });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Look up a job once and return its record if it has completed.
    pub async fn fetch_results(&self, job_id: &str) -> Result<ResultsOutcome> {
        let status = self
            .get_job_status(job_id)
            .await
            .context("An error occurred while fetching the results")?;

        let mut record = JobStatusRecord::pending(job_id);
        record.reconcile(&status)?;

        if record.phase != JobPhase::Completed {
            return Ok(ResultsOutcome::NotReady(record.phase));
        }
        Ok(ResultsOutcome::Ready(record))
    }

    /// Download one artifact to `dest`, returning the SHA-256 of its contents.
    pub async fn download_artifact(&self, location: &str, dest: &Path) -> Result<String> {
        let url = resolve_artifact_url(&self.api_base_url, location);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Download of {} failed with status {}", url, status);
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        tracing::debug!("Downloaded {} ({} bytes) to {}", url, bytes.len(), dest.display());
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

impl StatusSource for RemoteClient {
    fn fetch_status(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<StatusResponse, FetchError>> + Send {
        self.get_job_status(job_id)
    }
}

/// Resolve an artifact path returned by the backend against `base`.
///
/// Absolute `http(s)` URLs pass through unchanged.
pub fn resolve_artifact_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Reject recordings the backend cannot read, before anything is uploaded.
fn check_extension(filename: &str) -> Result<()> {
    let ext = match filename.rfind('.') {
        Some(dot) => filename[dot..].to_lowercase(),
        None => String::new(),
    };
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        anyhow::bail!(
            "Invalid file type: {}. Supported formats: {}",
            ext,
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }
    Ok(())
}

/// Pull the `detail` message out of a failed response, or use `fallback`.
async fn error_detail(response: Response, fallback: &str) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.detail)
        .filter(|detail| !detail.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
