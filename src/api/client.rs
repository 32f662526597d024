use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::types::{
    CreateJobResponse, FontFormat, FontWeight, JobSource, JobStatusResponse, RegenerateResponse,
};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Operations the orchestrator needs from the remote generation service.
///
/// Implemented by [`FontApiClient`] over HTTP and by in-memory fakes in tests.
#[allow(async_fn_in_trait)]
pub trait FontApi {
    /// Start a new generation job and return its identifier.
    async fn create_job(&self, source: JobSource) -> Result<String, ApiError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError>;

    /// Characters the generated font could not produce. Only meaningful once
    /// the status reports the `missing-glyphs` marker.
    async fn missing_glyphs(&self, job_id: &str) -> Result<Vec<String>, ApiError>;

    async fn submit_regeneration(
        &self,
        job_id: &str,
        chars: &[char],
    ) -> Result<RegenerateResponse, ApiError>;

    async fn download_font(
        &self,
        job_id: &str,
        weight: FontWeight,
        format: FontFormat,
        cache_token: &str,
    ) -> Result<Vec<u8>, ApiError>;
}

pub struct FontApiClient {
    client: Client,
    base_url: String,
}

impl FontApiClient {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_API_URL)
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeouts(base_url, Duration::from_secs(10), Duration::from_secs(120))
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Public URL of a font asset, with the cache-busting token appended.
    pub fn font_url(
        &self,
        job_id: &str,
        weight: FontWeight,
        format: FontFormat,
        cache_token: &str,
    ) -> String {
        format!(
            "{}/download-font/{job_id}/{}?t={cache_token}",
            self.base_url,
            format.asset_name(weight)
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

fn cache_buster() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// Maps non-success statuses to [`ApiError`]. With a job id, 404/400/422
/// mean the server does not accept that job.
async fn check_status(response: Response, job_id: Option<&str>) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());

    if let Some(job_id) = job_id
        && matches!(
            status,
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
        )
    {
        return Err(ApiError::InvalidJob {
            job_id: job_id.to_string(),
            message,
        });
    }

    Err(ApiError::Http {
        status: status.as_u16(),
        message,
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))
}

/// The backend answers some failures with HTTP 200 and `{"error": ...}`.
fn embedded_error(body: &serde_json::Value) -> Option<String> {
    body.get("error")
        .and_then(|e| e.as_str())
        .map(str::to_string)
}

impl FontApi for FontApiClient {
    async fn create_job(&self, source: JobSource) -> Result<String, ApiError> {
        let request = match source {
            JobSource::Prompt(prompt) => self
                .client
                .post(self.url("generate-from-prompt"))
                .form(&[("prompt", prompt)]),
            JobSource::Image { file_name, bytes } => {
                let part = Part::bytes(bytes).file_name(file_name);
                self.client
                    .post(self.url("generate-font"))
                    .multipart(Form::new().part("file", part))
            }
        };

        let response = check_status(request.send().await?, None).await?;
        let body: CreateJobResponse = parse_json(response).await?;
        if body.job_id.trim().is_empty() {
            return Err(ApiError::Parse("server returned an empty job_id".into()));
        }
        Ok(body.job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("job-status/{job_id}")))
            .query(&[("t", cache_buster())])
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .send()
            .await?;

        let response = check_status(response, Some(job_id)).await?;
        parse_json(response).await
    }

    async fn missing_glyphs(&self, job_id: &str) -> Result<Vec<String>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("download/{job_id}/missing-glyphs")))
            .query(&[("t", cache_buster())])
            .header("cache-control", "no-cache")
            .send()
            .await?;

        // A 404 here means the list was not written yet, not that the job is unknown.
        let response = check_status(response, None).await?;
        let body: serde_json::Value = parse_json(response).await?;
        if let Some(message) = embedded_error(&body) {
            return Err(ApiError::Http {
                status: 404,
                message,
            });
        }
        serde_json::from_value(body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn submit_regeneration(
        &self,
        job_id: &str,
        chars: &[char],
    ) -> Result<RegenerateResponse, ApiError> {
        let joined = chars
            .iter()
            .map(char::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .post(self.url(&format!("regenerate-missing-glyphs/{job_id}")))
            .form(&[("chars_to_regenerate", joined)])
            .send()
            .await?;

        let response = check_status(response, Some(job_id)).await?;
        let body: RegenerateResponse = parse_json(response).await?;
        if let Some(message) = body.error {
            return Err(ApiError::InvalidJob {
                job_id: job_id.to_string(),
                message,
            });
        }
        Ok(body)
    }

    async fn download_font(
        &self,
        job_id: &str,
        weight: FontWeight,
        format: FontFormat,
        cache_token: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("download-font/{job_id}/{}", format.asset_name(weight))))
            .query(&[("t", cache_token)])
            .send()
            .await?;

        let response = check_status(response, None).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
