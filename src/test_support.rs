//! Scripted in-memory implementation of [`FontApi`] for state-machine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::api::{
    ApiError, FontApi, FontFormat, FontWeight, JobSource, JobStatusResponse, RegenerateResponse,
};

/// Minimal WOFF2 payload: the signature is all the loader checks.
pub const WOFF2_BYTES: &[u8] = b"wOF2\x00\x01\x00\x00fake";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Transient,
    InvalidJob,
    /// HTTP 200 with a JSON body instead of font bytes.
    NotAFont,
}

impl Failure {
    fn to_error(self, job_id: &str) -> ApiError {
        match self {
            Failure::Transient | Failure::NotAFont => ApiError::Http {
                status: 503,
                message: "service unavailable".into(),
            },
            Failure::InvalidJob => ApiError::InvalidJob {
                job_id: job_id.to_string(),
                message: "Job not found".into(),
            },
        }
    }
}

/// Status answers are consumed in order; the last one repeats forever.
#[derive(Default)]
pub struct ScriptedApi {
    statuses: Mutex<VecDeque<Result<JobStatusResponse, Failure>>>,
    missing: Mutex<Option<Result<Vec<String>, Failure>>>,
    submit_failure: Mutex<Option<Failure>>,
    font_failures: Mutex<HashMap<u16, (Failure, u32)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processing(markers: &[&str]) -> JobStatusResponse {
        JobStatusResponse {
            status: "processing".into(),
            info_message: Some(format!("{} stages done", markers.len())),
            available_formats: Some(markers.iter().map(|m| m.to_string()).collect()),
        }
    }

    pub fn processing_without_markers() -> JobStatusResponse {
        JobStatusResponse {
            status: "processing".into(),
            info_message: None,
            available_formats: None,
        }
    }

    pub fn completed() -> JobStatusResponse {
        JobStatusResponse {
            status: "completed".into(),
            info_message: Some("Font ready".into()),
            available_formats: Some(vec![
                "base-image".into(),
                "grid-glyphs".into(),
                "missing-glyphs".into(),
                "500-woff2".into(),
            ]),
        }
    }

    pub fn failed() -> JobStatusResponse {
        JobStatusResponse {
            status: "failed".into(),
            info_message: Some("Pipeline crashed".into()),
            available_formats: None,
        }
    }

    pub fn with_status(self, status: JobStatusResponse) -> Self {
        self.statuses.lock().unwrap().push_back(Ok(status));
        self
    }

    pub fn with_status_failure(self, failure: Failure) -> Self {
        self.statuses.lock().unwrap().push_back(Err(failure));
        self
    }

    pub fn with_missing(self, chars: &[&str]) -> Self {
        *self.missing.lock().unwrap() = Some(Ok(chars.iter().map(|c| c.to_string()).collect()));
        self
    }

    pub fn with_missing_failure(self, failure: Failure) -> Self {
        *self.missing.lock().unwrap() = Some(Err(failure));
        self
    }

    pub fn with_submit_failure(self, failure: Failure) -> Self {
        *self.submit_failure.lock().unwrap() = Some(failure);
        self
    }

    /// The first `times` downloads of `weight` fail with `failure`.
    pub fn with_font_failures(self, weight: FontWeight, failure: Failure, times: u32) -> Self {
        self.font_failures
            .lock()
            .unwrap()
            .insert(weight.value(), (failure, times));
        self
    }

    /// Replace the remaining status script.
    pub fn set_statuses(&self, statuses: Vec<JobStatusResponse>) {
        let mut queue = self.statuses.lock().unwrap();
        queue.clear();
        queue.extend(statuses.into_iter().map(Ok));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FontApi for ScriptedApi {
    async fn create_job(&self, source: JobSource) -> Result<String, ApiError> {
        let kind = match source {
            JobSource::Prompt(_) => "prompt",
            JobSource::Image { .. } => "image",
        };
        self.record(format!("create:{kind}"));
        Ok("job-1".to_string())
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        self.record(format!("status:{job_id}"));
        let mut queue = self.statuses.lock().unwrap();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(failure)) => Err(failure.to_error(job_id)),
            None => Err(Failure::Transient.to_error(job_id)),
        }
    }

    async fn missing_glyphs(&self, job_id: &str) -> Result<Vec<String>, ApiError> {
        self.record(format!("missing:{job_id}"));
        match self.missing.lock().unwrap().clone() {
            Some(Ok(chars)) => Ok(chars),
            Some(Err(failure)) => Err(failure.to_error(job_id)),
            None => Ok(Vec::new()),
        }
    }

    async fn submit_regeneration(
        &self,
        job_id: &str,
        chars: &[char],
    ) -> Result<RegenerateResponse, ApiError> {
        let joined: String = chars.iter().collect();
        self.record(format!("submit:{job_id}:{joined}"));
        if let Some(failure) = *self.submit_failure.lock().unwrap() {
            return Err(failure.to_error(job_id));
        }
        Ok(RegenerateResponse {
            message: Some(format!("Regenerating {} characters", chars.len())),
            error: None,
        })
    }

    async fn download_font(
        &self,
        job_id: &str,
        weight: FontWeight,
        format: FontFormat,
        cache_token: &str,
    ) -> Result<Vec<u8>, ApiError> {
        self.record(format!("font:{weight}:{format}:{cache_token}"));
        let mut failures = self.font_failures.lock().unwrap();
        if let Some((failure, remaining)) = failures.get_mut(&weight.value())
            && *remaining > 0
        {
            *remaining -= 1;
            if *failure == Failure::NotAFont {
                return Ok(br#"{"error": "File not found"}"#.to_vec());
            }
            return Err(failure.to_error(job_id));
        }
        Ok(WOFF2_BYTES.to_vec())
    }
}
